//! Persistent tier over a key-value store
//!
//! Entries are stored as JSON under `sheet_data_<market>`. The tier is only
//! an optimization: read failures and corrupt values are reported as absent,
//! and a full store triggers oldest-first eviction and a single retry.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use super::eviction::evict_oldest;
use super::store::{KvStore, StoreError};
use crate::data::{CacheEntry, MarketKey};
use crate::error::CacheError;

/// Namespace prefix of persisted market tables
pub const DEFAULT_NAMESPACE: &str = "sheet_data_";

/// Durable copy of market entries
pub struct PersistentTier {
    store: Box<dyn KvStore>,
    namespace: String,
    eviction_count: usize,
    /// Serializes eviction scans so two writers never evict concurrently
    eviction_lock: Mutex<()>,
}

impl PersistentTier {
    pub fn new(store: Box<dyn KvStore>, eviction_count: usize) -> Self {
        Self {
            store,
            namespace: DEFAULT_NAMESPACE.to_string(),
            eviction_count,
            eviction_lock: Mutex::new(()),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn storage_key(&self, key: &MarketKey) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Reads the entry for `key`
    ///
    /// Backend errors and undecodable values are logged and treated as absent.
    pub fn get(&self, key: &MarketKey) -> Option<CacheEntry> {
        let storage_key = self.storage_key(key);
        let bytes = match self.store.get(&storage_key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(market = %key, error = %e, "Persistent cache read failed");
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if entry.key == *key => Some(entry),
            Ok(entry) => {
                warn!(market = %key, stored = %entry.key, "Persistent entry belongs to another market");
                None
            }
            Err(e) => {
                let err = CacheError::StorageReadCorrupt(storage_key);
                warn!(market = %key, error = %err, cause = %e, "Ignoring corrupt cache entry");
                None
            }
        }
    }

    /// Writes `entry`, evicting the oldest entries once if storage is full
    ///
    /// # Arguments
    /// * `entry` - Entry to store under the namespaced market key
    ///
    /// # Returns
    /// * `Ok(())` if the first write or the retry after eviction succeeded
    /// * `Err(CacheError::StorageCapacityExceeded)` if storage is still full
    /// * `Err(CacheError::StorageFailure)` for any other backend error
    pub fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let storage_key = self.storage_key(&entry.key);
        let bytes =
            serde_json::to_vec(entry).map_err(|e| CacheError::StorageFailure(e.to_string()))?;

        match self.store.set(&storage_key, &bytes) {
            Ok(()) => Ok(()),
            Err(StoreError::CapacityExceeded) => {
                warn!(market = %entry.key, "Persistent cache full, evicting oldest entries");
                let _guard = self.eviction_lock.lock().unwrap_or_else(PoisonError::into_inner);
                let result = evict_oldest(self.store.as_ref(), &self.namespace, self.eviction_count);
                debug!(removed = ?result.removed, "Retrying cache write after eviction");
                self.store.set(&storage_key, &bytes).map_err(into_cache_error)
            }
            Err(e) => Err(into_cache_error(e)),
        }
    }

    /// Storage keys of every entry in this tier's namespace
    pub fn keys(&self) -> Vec<String> {
        self.store.list_keys(&self.namespace).unwrap_or_else(|e| {
            warn!(error = %e, "Could not list persistent cache keys");
            Vec::new()
        })
    }
}

fn into_cache_error(err: StoreError) -> CacheError {
    match err {
        StoreError::CapacityExceeded => CacheError::StorageCapacityExceeded,
        other => CacheError::StorageFailure(other.to_string()),
    }
}
