//! In-memory preference storage.

use super::PreferenceStore;
use crate::error::StoreError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::instrument;

/// In-memory preference storage.
///
/// Clones share the same map. Useful for tests and for hosts that do not want
/// the active provider to survive a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferenceStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with one entry.
    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut map = HashMap::new();
        map.insert(key.into(), value.into());
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("lock poisoned").is_empty()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    #[instrument(skip(self))]
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let guard = self.inner.read().expect("lock poisoned");
        Ok(guard.get(key).cloned())
    }

    #[instrument(skip(self))]
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("lock poisoned");
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    #[instrument(skip(self))]
    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("lock poisoned");
        guard.remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
