//! Key-value backends for the persistence cache.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::errors::PersistenceError;

/// String key-value storage, in the shape of browser local storage.
pub trait KvStorage: Send {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError>;
    fn remove(&mut self, key: &str) -> Result<(), PersistenceError>;
    fn keys(&self) -> Result<Vec<String>, PersistenceError>;
}

/// In-memory storage with an optional entry quota.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that refuses new keys beyond `limit` entries.
    pub fn with_quota(limit: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota: Some(limit),
        }
    }
}

impl KvStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        if let Some(limit) = self.quota {
            if !self.entries.contains_key(key) && self.entries.len() >= limit {
                return Err(PersistenceError::QuotaExceeded {
                    key: key.to_string(),
                    limit,
                });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistenceError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.entries.keys().cloned().collect())
    }
}

/// JSON-file storage. Writes go through a temp file and rename under an
/// exclusive lock so concurrent processes never see a torn file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, PersistenceError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn update<F>(&self, f: F) -> Result<(), PersistenceError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _lock = self.acquire_lock()?;
        let mut entries = self.load()?;
        f(&mut entries);

        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&entries)?;
        fs::write(&tmp, content).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    fn acquire_lock(&self) -> Result<File, PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let lock_path = self.path.with_extension("lock");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| self.io_error(e))?;
        fs2::FileExt::lock_exclusive(&file).map_err(|e| self.io_error(e))?;
        Ok(file)
    }
}

impl KvStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistenceError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn keys(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.load()?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_quota_rejects_new_keys_only() {
        let mut storage = MemoryStorage::with_quota(1);
        storage.set("a", "1").unwrap();
        storage.set("a", "2").unwrap();
        assert!(matches!(
            storage.set("b", "1"),
            Err(PersistenceError::QuotaExceeded { limit: 1, .. })
        ));
        assert_eq!(storage.get("a").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let mut first = FileStorage::new(&path);
        first.set("toonflow:script:s1", "{\"payload\":\"T2\"}").unwrap();
        first.set("other", "x").unwrap();
        first.remove("other").unwrap();

        let second = FileStorage::new(&path);
        assert_eq!(second.keys().unwrap(), vec!["toonflow:script:s1".to_string()]);
        assert!(second.get("toonflow:script:s1").unwrap().is_some());
    }

    #[test]
    fn test_file_storage_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("absent.json"));
        assert!(storage.keys().unwrap().is_empty());
        assert_eq!(storage.get("k").unwrap(), None);
    }

    #[test]
    fn test_file_storage_corrupt_file_reports_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "not json").unwrap();
        let storage = FileStorage::new(&path);
        assert!(matches!(storage.keys(), Err(PersistenceError::Corrupt(_))));
    }
}
