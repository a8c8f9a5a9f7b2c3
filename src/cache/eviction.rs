//! Oldest-first eviction for the persistent tier
//!
//! When storage refuses a write for lack of space, the oldest entries of the
//! namespace are dropped so the write can be retried.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::store::KvStore;
use crate::data::CacheEntry;

/// Result of an eviction run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionResult {
    /// Keys removed, oldest first
    pub removed: Vec<String>,
    /// Keys examined in the namespace
    pub scanned: usize,
}

/// Timestamp used to order a stored value; unreadable values sort first
pub fn stored_timestamp(bytes: Option<&[u8]>) -> DateTime<Utc> {
    bytes
        .and_then(|b| serde_json::from_slice::<CacheEntry>(b).ok())
        .map(|entry| entry.fetched_at)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Removes the `count` oldest entries whose keys start with `prefix`
///
/// Entries that cannot be read or decoded count as the oldest. Keys are
/// ordered by timestamp, then by name so ties are deterministic. Failures to
/// remove an individual key are logged and skipped.
///
/// # Arguments
/// * `store` - Backend to scan and remove from
/// * `prefix` - Namespace; keys outside it are never touched
/// * `count` - Maximum number of entries to remove
///
/// # Returns
/// The removed keys, oldest first, and how many keys were scanned. A store
/// that cannot be listed yields an empty result.
pub fn evict_oldest(store: &dyn KvStore, prefix: &str, count: usize) -> EvictionResult {
    let keys = match store.list_keys(prefix) {
        Ok(keys) => keys,
        Err(e) => {
            warn!(error = %e, prefix, "Could not enumerate cache entries for eviction");
            return EvictionResult::default();
        }
    };

    let mut stamped: Vec<(DateTime<Utc>, String)> = keys
        .into_iter()
        .map(|key| {
            let bytes = store.get(&key).ok().flatten();
            (stored_timestamp(bytes.as_deref()), key)
        })
        .collect();
    stamped.sort();

    let scanned = stamped.len();
    let mut removed = Vec::new();
    for (fetched_at, key) in stamped.into_iter().take(count) {
        match store.remove(&key) {
            Ok(()) => {
                debug!(key = %key, fetched_at = %fetched_at, "Evicted cache entry");
                removed.push(key);
            }
            Err(e) => warn!(key = %key, error = %e, "Failed to evict cache entry"),
        }
    }

    info!(removed = removed.len(), scanned, "Evicted oldest cache entries");
    EvictionResult { removed, scanned }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryStore;
    use crate::data::{MarketKey, Table};
    use chrono::Duration;

    fn put_entry(store: &MemoryStore, key: &str, fetched_at: DateTime<Utc>) {
        let entry = CacheEntry::new(
            MarketKey::new(key),
            Table::from_rows(vec![vec![], vec![]]),
            fetched_at,
        );
        store
            .set(&format!("sheet_data_{}", key), &serde_json::to_vec(&entry).unwrap())
            .unwrap();
    }

    #[test]
    fn test_evicts_oldest_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        put_entry(&store, "kr", now - Duration::hours(1));
        put_entry(&store, "us", now - Duration::hours(5));
        put_entry(&store, "jp", now - Duration::hours(3));
        put_entry(&store, "uk", now);

        let result = evict_oldest(&store, "sheet_data_", 2);

        assert_eq!(result.scanned, 4);
        assert_eq!(result.removed, ["sheet_data_us", "sheet_data_jp"]);
        assert_eq!(
            store.list_keys("").unwrap(),
            ["sheet_data_kr", "sheet_data_uk"]
        );
    }

    #[test]
    fn test_corrupt_entries_are_evicted_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        put_entry(&store, "kr", now - Duration::days(30));
        store.set("sheet_data_zz", b"not json").unwrap();

        let result = evict_oldest(&store, "sheet_data_", 1);

        assert_eq!(result.removed, ["sheet_data_zz"]);
    }

    #[test]
    fn test_other_namespaces_are_untouched() {
        let store = MemoryStore::new();
        store.set("appLanguage", b"garbage").unwrap();
        put_entry(&store, "kr", Utc::now());

        let result = evict_oldest(&store, "sheet_data_", 3);

        assert_eq!(result.removed, ["sheet_data_kr"]);
        assert!(store.get("appLanguage").unwrap().is_some());
    }

    #[test]
    fn test_stored_timestamp_of_missing_value_is_oldest() {
        assert_eq!(stored_timestamp(None), DateTime::<Utc>::MIN_UTC);
    }
}
