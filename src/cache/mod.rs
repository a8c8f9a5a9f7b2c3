//! Multi-tier cache for market tables
//!
//! Tables are served from a process-lifetime memory tier, backed by a
//! persistent tier that survives restarts, and fetched from the network only
//! when neither holds them. Stale entries are served immediately while a
//! background refresh runs; a full persistent store evicts its oldest
//! entries and retries once.

pub mod clock;
pub mod eviction;
mod inflight;
pub mod memory;
mod orchestrator;
pub mod persistent;
mod pool;
pub mod preload;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use eviction::{evict_oldest, EvictionResult};
pub use inflight::FetchOutcome;
pub use memory::MemoryTier;
pub use orchestrator::{Orchestrator, Resolution, TierSource};
pub use persistent::PersistentTier;
pub use preload::{preload_all, PreloadReport};
pub use store::{FileStore, KvStore, MemoryStore, StoreError};
