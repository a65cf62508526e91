//! Key-value persistence for relay settings.
//!
//! The host platform keeps per-app settings as string key-value pairs. The
//! relay only needs `get` and `set` on top of that, so any backend that can
//! store strings works.
use crate::config::StoreType;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Writes several values. Backends that persist override this so that
    /// either every entry is stored or none is.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Whether the backend can currently serve reads and writes.
    fn is_available(&self) -> bool {
        true
    }
}

pub fn get_store(store_type: &StoreType) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    match store_type {
        StoreType::Memory => Ok(Arc::new(MemoryStore::default())),
        StoreType::Filesystem { path } => Ok(Arc::new(FilesystemStore::open(path)?)),
    }
}

/// Process-local store. Settings are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Settings kept in memory and written through to a JSON file on every set.
pub struct FilesystemStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl FilesystemStore {
    /// Loads existing settings from `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let values = match File::open(&path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), keys = values.len(), "loaded settings file");

        Ok(FilesystemStore {
            path,
            values: RwLock::new(values),
        })
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<(), StoreError> {
        // Write to a sibling file first so a crash never leaves a truncated file behind
        let tmp_path = self.path.with_extension("tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, values)?;
        writer.flush()?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FilesystemStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(&[(key, value.to_string())])
    }

    /// Only visible once the file has been written.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut values = self.values.write();
        let mut updated = values.clone();
        for (key, value) in entries {
            updated.insert(key.to_string(), value.clone());
        }

        self.persist(&updated)?;
        *values = updated;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.path
            .parent()
            .map(|dir| dir.as_os_str().is_empty() || dir.is_dir())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::default();
        assert_eq!(store.get("enabled").unwrap(), None);
        store.set("enabled", "true").unwrap();
        assert_eq!(store.get("enabled").unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn test_filesystem_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FilesystemStore::open(&path).unwrap();
        assert!(store.is_available());
        assert_eq!(store.get("path_filter").unwrap(), None);
        store.set("path_filter", "/Data/").unwrap();
        store.set("enabled", "true").unwrap();

        // A fresh store sees the persisted values
        let reopened = FilesystemStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("path_filter").unwrap().as_deref(),
            Some("/Data/")
        );
        assert_eq!(reopened.get("enabled").unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn test_filesystem_store_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            FilesystemStore::open(&path),
            Err(StoreError::Json(_))
        ));
    }

    #[test]
    fn test_filesystem_store_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::open(dir.path().join("missing/settings.json")).unwrap();
        assert!(!store.is_available());
        assert!(store.set("enabled", "true").is_err());
        // A failed write is not visible to readers
        assert_eq!(store.get("enabled").unwrap(), None);
    }

    #[test]
    fn test_filesystem_store_set_many_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = FilesystemStore::open(&path).unwrap();
        store
            .set_many(&[("enabled", "true".into()), ("path_filter", "/Shared/".into())])
            .unwrap();
        let reopened = FilesystemStore::open(&path).unwrap();
        assert_eq!(reopened.get("enabled").unwrap().as_deref(), Some("true"));
        assert_eq!(
            reopened.get("path_filter").unwrap().as_deref(),
            Some("/Shared/")
        );

        // Block the rename target so that persisting fails
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), "").unwrap();

        assert!(
            store
                .set_many(&[("enabled", "false".into()), ("path_filter", "/Other/".into())])
                .is_err()
        );
        assert_eq!(store.get("enabled").unwrap().as_deref(), Some("true"));
        assert_eq!(store.get("path_filter").unwrap().as_deref(), Some("/Shared/"));
    }
}
