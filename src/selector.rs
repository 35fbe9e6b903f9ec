//! Persisted choice of the active provider.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::ProviderKind;
use crate::store::PreferenceStore;

/// Preference key holding the active provider token.
pub const PREFERENCE_KEY: &str = "authService";

/// Maps the persisted preference to a [`ProviderKind`].
///
/// Reads never fail: a missing store, a missing key, an unreadable store or
/// an unrecognized value all fall back to [`ProviderKind::NextAuth`]. Writes
/// are best-effort.
#[derive(Clone, Default)]
pub struct ProviderSelector {
    store: Option<Arc<dyn PreferenceStore>>,
}

impl ProviderSelector {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A selector with no persistence; always reads the default.
    pub fn ephemeral() -> Self {
        Self { store: None }
    }

    pub fn read(&self) -> ProviderKind {
        let Some(store) = &self.store else {
            return ProviderKind::default();
        };

        match store.get(PREFERENCE_KEY) {
            Ok(Some(value)) if value == ProviderKind::Firebase.token() => ProviderKind::Firebase,
            Ok(value) => {
                debug!(stored = ?value, "Using default auth provider");
                ProviderKind::default()
            }
            Err(e) => {
                warn!(store = store.name(), error = %e, "Failed to read provider preference");
                ProviderKind::default()
            }
        }
    }

    pub fn write(&self, kind: ProviderKind) {
        let Some(store) = &self.store else {
            return;
        };

        if let Err(e) = store.set(PREFERENCE_KEY, kind.token()) {
            warn!(
                store = store.name(),
                provider = kind.token(),
                error = %e,
                "Failed to persist provider preference; default applies next launch"
            );
        }
    }
}

impl std::fmt::Debug for ProviderSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSelector")
            .field("store", &self.store.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryPreferenceStore;

    struct BrokenStore;

    impl PreferenceStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Keyring("no storage access".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Keyring("no storage access".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Ok(())
        }
        fn name(&self) -> &str {
            "broken"
        }
    }

    #[test]
    fn test_empty_store_defaults_to_nextauth() {
        let selector = ProviderSelector::new(Arc::new(MemoryPreferenceStore::new()));
        assert_eq!(selector.read(), ProviderKind::NextAuth);
    }

    #[test]
    fn test_firebase_token_selects_firebase() {
        let store = MemoryPreferenceStore::with_value(PREFERENCE_KEY, "firebase");
        assert_eq!(ProviderSelector::new(Arc::new(store)).read(), ProviderKind::Firebase);
    }

    #[test]
    fn test_unknown_token_defaults_to_nextauth() {
        let store = MemoryPreferenceStore::with_value(PREFERENCE_KEY, "auth0");
        assert_eq!(ProviderSelector::new(Arc::new(store)).read(), ProviderKind::NextAuth);
    }

    #[test]
    fn test_write_then_read() {
        let store = MemoryPreferenceStore::new();
        let selector = ProviderSelector::new(Arc::new(store.clone()));
        selector.write(ProviderKind::Firebase);
        assert_eq!(store.get(PREFERENCE_KEY).unwrap().as_deref(), Some("firebase"));
        assert_eq!(selector.read(), ProviderKind::Firebase);
        selector.write(ProviderKind::NextAuth);
        assert_eq!(selector.read(), ProviderKind::NextAuth);
    }

    #[test]
    fn test_broken_store_never_fails() {
        let selector = ProviderSelector::new(Arc::new(BrokenStore));
        selector.write(ProviderKind::Firebase);
        assert_eq!(selector.read(), ProviderKind::NextAuth);
    }

    #[test]
    fn test_ephemeral_selector() {
        let selector = ProviderSelector::ephemeral();
        selector.write(ProviderKind::Firebase);
        assert_eq!(selector.read(), ProviderKind::NextAuth);
    }
}
