//! Capacity-bounded key-value media the persistence adapter writes to.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Persistent string key-value medium with a byte budget.
///
/// `set` must fail with [`StorageError::QuotaExceeded`] (and leave the
/// previous value intact) when the write would not fit.
pub trait KeyValueStorage: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// In-memory medium. Usage is counted as key bytes plus value bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
    capacity: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: Some(capacity),
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(capacity) = self.capacity {
            let existing = self.entries.get(key).map_or(0, |v| key.len() + v.len());
            let needed = self.used_bytes() - existing + key.len() + value.len();
            if needed > capacity {
                return Err(StorageError::QuotaExceeded { needed, capacity });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Directory-backed medium: one `<key>.json` file per key, optional quota
/// over the total size of all key files.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    quota: Option<usize>,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quota: None,
        }
    }

    pub fn with_quota(mut self, quota: Option<usize>) -> Self {
        self.quota = quota;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generate the file path for a key. Pure: path concatenation only.
    pub fn key_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    fn used_bytes_except(&self, skip: &Path) -> Result<usize, StorageError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_error(&self.dir, e)),
        };

        let mut used = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path == skip || path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                used += meta.len() as usize;
            }
        }
        Ok(used)
    }
}

fn io_error(path: &Path, source: io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.key_path(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.key_path(key);
        if let Some(capacity) = self.quota {
            let needed = self.used_bytes_except(&path)? + value.len();
            if needed > capacity {
                return Err(StorageError::QuotaExceeded { needed, capacity });
            }
        }

        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;

        // Atomic write: .tmp then rename
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, value).map_err(|e| io_error(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| io_error(&path, e))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let path = self.key_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_storage_round_trip() {
        let mut storage = MemoryStorage::new();
        storage.set("k", "value").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("value"));
        storage.remove("k").unwrap();
        assert!(storage.get("k").unwrap().is_none());
    }

    #[test]
    fn memory_storage_rejects_writes_over_capacity() {
        let mut storage = MemoryStorage::with_capacity(10);
        storage.set("k", "12345").unwrap();

        let err = storage.set("k", "123456789012").unwrap_err();
        assert!(err.is_quota_exceeded());
        // Previous value survives a rejected write
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("12345"));
    }

    #[test]
    fn memory_storage_overwrite_reuses_existing_bytes() {
        let mut storage = MemoryStorage::with_capacity(10);
        storage.set("k", "123456789").unwrap();
        storage.set("k", "987654321").unwrap();
        assert_eq!(storage.used_bytes(), 10);
    }

    #[test]
    fn file_storage_missing_key_is_none() {
        let tmpdir = TempDir::new().unwrap();
        let storage = FileStorage::new(tmpdir.path().join("data"));
        assert!(storage.get("desk-sync:sessions").unwrap().is_none());
    }

    #[test]
    fn file_storage_sanitizes_key_into_filename() {
        let storage = FileStorage::new("/data");
        assert_eq!(
            storage.key_path("desk-sync:sessions"),
            PathBuf::from("/data/desk-sync_sessions.json")
        );
    }

    #[test]
    fn file_storage_creates_dir_and_round_trips() {
        let tmpdir = TempDir::new().unwrap();
        let mut storage = FileStorage::new(tmpdir.path().join("nested"));

        storage.set("sessions", "[]").unwrap();

        assert!(tmpdir.path().join("nested").join("sessions.json").exists());
        assert_eq!(storage.get("sessions").unwrap().as_deref(), Some("[]"));

        storage.remove("sessions").unwrap();
        storage.remove("sessions").unwrap();
        assert!(storage.get("sessions").unwrap().is_none());
    }

    #[test]
    fn file_storage_enforces_quota() {
        let tmpdir = TempDir::new().unwrap();
        let mut storage = FileStorage::new(tmpdir.path()).with_quota(Some(16));

        storage.set("a", "0123456789").unwrap();
        let err = storage.set("b", "0123456789").unwrap_err();
        assert!(err.is_quota_exceeded());
        // Rewriting the same key only counts its new size
        storage.set("a", "0123456789abcde").unwrap();
    }
}
