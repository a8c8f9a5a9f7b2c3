//! Process-lifetime memory tier

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::data::{CacheEntry, MarketKey};

/// In-memory map from market to its most recent entry
///
/// Reads run concurrently; writes are serialized by the lock. Entries are
/// cloned in and out so no other tier ever aliases them.
#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: RwLock<HashMap<MarketKey, CacheEntry>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &MarketKey) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Stores `entry` unless a newer entry for the same key is already held
    ///
    /// Returns whether the entry was stored.
    pub fn put(&self, entry: CacheEntry) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&entry.key) {
            Some(existing) if existing.fetched_at > entry.fetched_at => false,
            _ => {
                entries.insert(entry.key.clone(), entry);
                true
            }
        }
    }

    pub fn contains(&self, key: &MarketKey) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Drops every entry, as a process restart would
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
