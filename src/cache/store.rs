//! Key-value storage backends for the persistent tier
//!
//! The persistent tier only needs byte values under string keys, with no
//! transactions. `FileStore` keeps one JSON file per key in an XDG-compliant
//! cache directory (`~/.cache/bestsellers/` on Linux); `MemoryStore` keeps
//! values in process memory with an optional entry limit.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use directories::ProjectDirs;
use thiserror::Error;

/// `ENOSPC` on Linux and macOS
#[cfg(unix)]
const NO_SPACE_OS_ERROR: i32 = 28;

/// Extension used for value files
const VALUE_EXTENSION: &str = "json";

/// Errors reported by a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend has no room for the value
    #[error("Storage capacity exceeded")]
    CapacityExceeded,

    /// The key cannot be represented by this backend
    #[error("Invalid storage key: '{0}'")]
    InvalidKey(String),

    /// Any other I/O failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Namespaced byte storage that survives process restarts
pub trait KvStore: Send + Sync {
    /// Reads the value under `key`, `Ok(None)` if absent
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Removes `key`; removing an absent key succeeds
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Lists every key starting with `prefix`, in ascending order
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).list_keys(prefix)
    }
}

/// File-per-key store in a cache directory
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where value files are stored
    dir: PathBuf,
    /// Optional quota on the total size of value files
    max_bytes: Option<u64>,
}

impl FileStore {
    /// Creates a store in the XDG cache directory for `bestsellers`
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "bestsellers")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a store rooted at a custom directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            dir,
            max_bytes: None,
        }
    }

    /// Caps the total size of stored values
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn value_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.{}", key, VALUE_EXTENSION)))
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Total size of value files, not counting `skip`
    fn used_bytes(&self, skip: &Path) -> io::Result<u64> {
        let mut total = 0;
        for dir_entry in fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if path == skip || path.extension().and_then(|e| e.to_str()) != Some(VALUE_EXTENSION) {
                continue;
            }
            total += dir_entry.metadata()?.len();
        }
        Ok(total)
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.value_path(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.value_path(key)?;
        self.ensure_dir().map_err(classify_io)?;

        if let Some(max_bytes) = self.max_bytes {
            let used = self.used_bytes(&path)?;
            if used + value.len() as u64 > max_bytes {
                return Err(StoreError::CapacityExceeded);
            }
        }

        fs::write(&path, value).map_err(classify_io)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.value_path(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for dir_entry in read_dir {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(VALUE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if stem.starts_with(prefix) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Keys become file names, so only a conservative character set is allowed
fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

fn classify_io(err: io::Error) -> StoreError {
    #[cfg(unix)]
    if err.raw_os_error() == Some(NO_SPACE_OS_ERROR) {
        return StoreError::CapacityExceeded;
    }
    StoreError::Io(err)
}

/// In-process store with an optional limit on the number of keys
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, Vec<u8>>>,
    max_entries: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses new keys once it holds `max_entries`
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            values: Mutex::default(),
            max_entries: Some(max_entries),
        }
    }

    pub fn len(&self) -> usize {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(max_entries) = self.max_entries {
            if !values.contains_key(key) && values.len() >= max_entries {
                return Err(StoreError::CapacityExceeded);
            }
        }
        values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_set_creates_file_in_cache_directory() {
        let (store, temp_dir) = create_test_store();

        store.set("sheet_data_kr", b"{\"a\":1}").expect("Write should succeed");

        let expected_path = temp_dir.path().join("sheet_data_kr.json");
        assert!(expected_path.exists(), "Value file should exist");
        assert_eq!(fs::read(expected_path).unwrap(), b"{\"a\":1}");
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.get("sheet_data_kr").unwrap().is_none());
    }

    #[test]
    fn test_set_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache");
        let store = FileStore::with_dir(nested_path.clone());

        store.set("k", b"v").expect("Write should succeed");

        assert!(nested_path.join("k.json").exists(), "Value file should exist");
    }

    #[test]
    fn test_overwrite_existing_value() {
        let (store, _temp_dir) = create_test_store();
        store.set("k", b"first").unwrap();
        store.set("k", b"second").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap(), b"second");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (store, _temp_dir) = create_test_store();
        store.set("k", b"v").unwrap();
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_list_keys_filters_by_prefix() {
        let (store, temp_dir) = create_test_store();
        store.set("sheet_data_us", b"1").unwrap();
        store.set("sheet_data_kr", b"2").unwrap();
        store.set("appLanguage", b"3").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let keys = store.list_keys("sheet_data_").unwrap();
        assert_eq!(keys, ["sheet_data_kr", "sheet_data_us"]);
    }

    #[test]
    fn test_list_keys_on_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_dir(temp_dir.path().join("never-created"));
        assert!(store.list_keys("").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_keys_are_rejected() {
        let (store, _temp_dir) = create_test_store();
        assert!(matches!(store.set("../escape", b"x"), Err(StoreError::InvalidKey(_))));
        assert!(matches!(store.set("", b"x"), Err(StoreError::InvalidKey(_))));
        assert!(matches!(store.get("a/b"), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let (store, _temp_dir) = create_test_store();
        let store = store.with_max_bytes(10);

        store.set("a", b"12345").unwrap();
        assert!(matches!(
            store.set("b", b"123456"),
            Err(StoreError::CapacityExceeded)
        ));
        // Rewriting an existing key does not count its old size
        store.set("a", b"1234567890").unwrap();
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(store) = FileStore::new() {
            let path_str = store.dir().to_string_lossy();
            assert!(path_str.contains("bestsellers"), "Cache path should contain project name");
        }
        // Test passes if new() returns None (e.g., no home directory in CI)
    }

    #[test]
    fn test_memory_store_capacity() {
        let store = MemoryStore::with_capacity(2);
        store.set("a", b"1").unwrap();
        store.set("b", b"2").unwrap();
        assert!(matches!(store.set("c", b"3"), Err(StoreError::CapacityExceeded)));
        store.set("a", b"updated").unwrap();

        store.remove("b").unwrap();
        store.set("c", b"3").unwrap();
        assert_eq!(store.list_keys("").unwrap(), ["a", "c"]);
    }
}
