//! Core data models for the bestseller cache
//!
//! Market identifiers, the normalized table format, and cache entry types
//! shared by every cache tier.

pub mod market;
pub mod table;

pub use market::{Market, MarketCatalog, MarketKey};
pub use table::{LocaleView, Table, TableSchema, HEADER_ROWS};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A fetched table together with the time it was fetched
///
/// Tiers hold their own copies; an entry is always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: MarketKey,
    pub table: Table,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: MarketKey, table: Table, fetched_at: DateTime<Utc>) -> Self {
        Self {
            key,
            table,
            fetched_at,
        }
    }

    /// Age of the entry at `now`; clock skew into the past counts as zero
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.fetched_at)
            .max(Duration::zero())
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// Per-key cache state as seen by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No entry and no fetch running
    Absent,
    /// No entry yet, a fetch is running
    Loading,
    /// Entry younger than the TTL
    Fresh,
    /// Entry older than the TTL, served as is
    StaleServing,
    /// Entry older than the TTL while a refresh is running
    StaleRefreshing,
    /// Fetch failed and nothing was cached
    Error,
}

impl CacheState {
    /// Derives the state from entry presence, freshness and the in-flight flag
    pub fn derive(entry_fresh: Option<bool>, in_flight: bool) -> Self {
        match (entry_fresh, in_flight) {
            (None, false) => CacheState::Absent,
            (None, true) => CacheState::Loading,
            (Some(true), _) => CacheState::Fresh,
            (Some(false), false) => CacheState::StaleServing,
            (Some(false), true) => CacheState::StaleRefreshing,
        }
    }

    /// Whether data accompanies this state
    pub fn has_data(self) -> bool {
        matches!(
            self,
            CacheState::Fresh | CacheState::StaleServing | CacheState::StaleRefreshing
        )
    }

    pub fn is_stale(self) -> bool {
        matches!(self, CacheState::StaleServing | CacheState::StaleRefreshing)
    }
}
