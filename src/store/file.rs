//! File-based preference storage.

use super::PreferenceStore;
use crate::error::StoreError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{instrument, warn};

/// File permissions for the preference file (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// File-based preference storage.
///
/// All keys live in one JSON object at `path`. Writes go to a temp file that
/// is renamed over the existing file, so a crash never leaves a half-written file.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, path: &Path, e: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.io_error(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            StoreError::Serialization(format!(
                "Failed to parse preference file '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Current map for a read-modify-write. An unreadable file is replaced
    /// rather than blocking every later write.
    fn read_for_update(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match self.read_all() {
            Err(StoreError::Serialization(message)) => {
                warn!(error = %message, "Discarding corrupt preference file");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    /// Ensure the parent directory exists with correct permissions.
    fn ensure_dir(&self) -> Result<(), StoreError> {
        let Some(dir) = self.path.parent() else {
            return Ok(());
        };
        if dir.as_os_str().is_empty() || dir.exists() {
            return Ok(());
        }

        std::fs::create_dir_all(dir).map_err(|e| self.io_error(dir, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(DIR_MODE);
            std::fs::set_permissions(dir, perms).map_err(|e| self.io_error(dir, e))?;
        }
        Ok(())
    }

    fn write_all(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        self.ensure_dir()?;

        let content = serde_json::to_string_pretty(map)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let temp_path = self.path.with_extension("tmp");

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(FILE_MODE)
                .open(&temp_path)
                .map_err(|e| self.io_error(&temp_path, e))?;
            file.write_all(content.as_bytes())
                .map_err(|e| self.io_error(&temp_path, e))?;
            file.sync_all().map_err(|e| self.io_error(&temp_path, e))?;
        }

        #[cfg(not(unix))]
        {
            std::fs::write(&temp_path, &content).map_err(|e| self.io_error(&temp_path, e))?;
        }

        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(self.io_error(&self.path, e));
        }
        Ok(())
    }
}

impl PreferenceStore for FilePreferenceStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let mut map = self.read_for_update()?;
        map.insert(key.to_string(), value.to_string());
        self.write_all(&map)
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let mut map = self.read_for_update()?;
        if map.remove(key).is_none() {
            return Ok(());
        }
        self.write_all(&map)
    }

    fn name(&self) -> &str {
        "file"
    }
}
