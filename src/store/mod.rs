//! Preference storage implementations.

pub mod file;
pub mod keyring;
pub mod memory;
pub mod trait_def;

// Re-exports
pub use file::FilePreferenceStore;
pub use memory::MemoryPreferenceStore;
pub use trait_def::PreferenceStore;

#[cfg(feature = "system-keyring")]
pub use keyring::KeyringPreferenceStore;

use std::sync::Arc;

use crate::config::{PreferencesConfig, StorageBackend};

/// Open the preference store selected in configuration.
pub fn open(config: &PreferencesConfig) -> anyhow::Result<Arc<dyn PreferenceStore>> {
    let store: Arc<dyn PreferenceStore> = match config.backend {
        StorageBackend::File => Arc::new(FilePreferenceStore::new(config.path.clone())),
        StorageBackend::Memory => Arc::new(MemoryPreferenceStore::new()),
        #[cfg(feature = "system-keyring")]
        StorageBackend::Keyring => Arc::new(KeyringPreferenceStore::new()),
        #[cfg(not(feature = "system-keyring"))]
        StorageBackend::Keyring => {
            anyhow::bail!("Keyring preference storage requires the `system-keyring` feature")
        }
    };
    tracing::debug!(backend = %config.backend, store = store.name(), "Preference store opened");
    Ok(store)
}
