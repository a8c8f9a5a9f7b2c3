//! Cache orchestrator
//!
//! Resolves a market from the memory tier, then the persistent tier, then the
//! network. Fresh hits return without I/O. Stale hits are returned at once
//! and refreshed in the background. A miss on the active market waits for
//! the fetch; a miss during preload does not.
//!
//! ```text
//! resolve(key) ─► memory ──hit──► age < TTL ? Fresh : StaleServing (+ refresh)
//!                   │miss
//!                   ▼
//!                persistent ──hit──► promote to memory, same age check
//!                   │miss
//!                   ▼
//!                active ? fetch and wait : fetch in background (Loading)
//! ```
//!
//! At most one fetch per market runs at a time. A failed fetch never removes
//! cached data.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::inflight::{Claim, FetchOutcome, FetchWaiter, InFlightGuard, InFlightSet};
use super::memory::MemoryTier;
use super::persistent::PersistentTier;
use super::pool::BackgroundPool;
use super::preload::{PreloadReport, PreloadScheduler};
use crate::config::CacheConfig;
use crate::data::{CacheEntry, CacheState, MarketKey, Table};
use crate::error::CacheError;
use crate::events::{CacheEvent, EVENT_CHANNEL_CAPACITY};
use crate::fetch::Fetcher;

/// Where a resolved table came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierSource {
    Memory,
    Persistent,
    Network,
}

/// Outcome of resolving one market
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Table to show; `None` while loading or after an error
    pub table: Option<Table>,
    pub state: CacheState,
    /// Only set for `CacheState::Error`
    pub error: Option<CacheError>,
    pub source: Option<TierSource>,
}

impl Resolution {
    fn cached(table: Table, state: CacheState, source: TierSource) -> Self {
        Self {
            table: Some(table),
            state,
            error: None,
            source: Some(source),
        }
    }

    fn loading() -> Self {
        Self {
            table: None,
            state: CacheState::Loading,
            error: None,
            source: None,
        }
    }

    fn failed(error: CacheError) -> Self {
        Self {
            table: None,
            state: CacheState::Error,
            error: Some(error),
            source: None,
        }
    }

    /// Whether there is a table to show, fresh or not
    pub fn has_table(&self) -> bool {
        self.table.is_some()
    }
}

/// Handle on the cache; clones share the same tiers and background pool
pub struct Orchestrator<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for Orchestrator<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<F> {
    fetcher: F,
    memory: MemoryTier,
    persistent: Option<PersistentTier>,
    in_flight: InFlightSet,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    pool: BackgroundPool,
    preload: PreloadScheduler,
    events: broadcast::Sender<CacheEvent>,
    active: Mutex<Option<MarketKey>>,
    /// Set once the market that was active at the time has been served with data
    active_resolved: AtomicBool,
}

impl<F: Fetcher> Orchestrator<F> {
    /// Creates an orchestrator using the system clock
    ///
    /// Without a persistent tier, the cache lives only as long as the process.
    pub fn new(fetcher: F, persistent: Option<PersistentTier>, config: CacheConfig) -> Self {
        Self::with_clock(fetcher, persistent, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        fetcher: F,
        persistent: Option<PersistentTier>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                fetcher,
                memory: MemoryTier::new(),
                persistent,
                in_flight: InFlightSet::new(),
                clock,
                pool: BackgroundPool::new(config.background_workers),
                preload: PreloadScheduler::new(config.preload_batch_size, config.preload_delay),
                config,
                events,
                active: Mutex::new(None),
                active_resolved: AtomicBool::new(false),
            }),
        }
    }

    /// Resolves `key`, fetching when nothing is cached
    ///
    /// # Arguments
    /// * `key` - Market to resolve
    /// * `is_active` - Whether the market is the one on screen. Active misses
    ///   block on the fetch and report errors; inactive misses return at once.
    ///
    /// # Returns
    /// * `Fresh` or `StaleServing` with a table when any tier holds one
    /// * `Loading` without a table for an inactive miss
    /// * `Error` without a table when an active fetch fails and nothing is cached
    pub async fn resolve(&self, key: &MarketKey, is_active: bool) -> Resolution {
        self.resolve_tracked(key, is_active).await.0
    }

    /// Like [`resolve`](Self::resolve), also returning a waiter for any fetch it started
    pub(crate) async fn resolve_tracked(
        &self,
        key: &MarketKey,
        is_active: bool,
    ) -> (Resolution, Option<FetchWaiter>) {
        let now = self.inner.clock.now();

        if let Some(entry) = self.inner.memory.get(key) {
            return self.serve_cached(entry, now, is_active, TierSource::Memory);
        }

        if let Some(entry) = self.persistent_entry(key) {
            debug!(market = %key, "Promoting persistent entry to memory");
            self.inner.memory.put(entry.clone());
            return self.serve_cached(entry, now, is_active, TierSource::Persistent);
        }

        if is_active {
            let resolution = self.fetch_now(key).await;
            if resolution.has_table() {
                self.mark_resolved(key);
            }
            (resolution, None)
        } else {
            debug!(market = %key, "Cache miss, fetching in background");
            let waiter = self.schedule_fetch(key);
            (Resolution::loading(), waiter)
        }
    }

    fn serve_cached(
        &self,
        entry: CacheEntry,
        now: DateTime<Utc>,
        is_active: bool,
        source: TierSource,
    ) -> (Resolution, Option<FetchWaiter>) {
        if is_active {
            self.mark_resolved(&entry.key);
        }

        if entry.is_fresh(now, self.inner.config.ttl_delta()) {
            debug!(market = %entry.key, ?source, "Serving fresh cache entry");
            return (Resolution::cached(entry.table, CacheState::Fresh, source), None);
        }

        info!(
            market = %entry.key,
            ?source,
            age_secs = entry.age(now).num_seconds(),
            "Serving stale cache entry"
        );
        let waiter = if is_active || self.inner.config.revalidate_stale_on_preload {
            self.schedule_fetch(&entry.key)
        } else {
            None
        };
        (
            Resolution::cached(entry.table, CacheState::StaleServing, source),
            waiter,
        )
    }

    /// Unblocks preload once the active market itself has been served
    fn mark_resolved(&self, key: &MarketKey) {
        if self.active_market().as_ref() == Some(key) {
            self.inner.active_resolved.store(true, Ordering::SeqCst);
        }
    }

    fn persistent_entry(&self, key: &MarketKey) -> Option<CacheEntry> {
        self.inner.persistent.as_ref().and_then(|tier| tier.get(key))
    }

    /// Starts a background fetch unless one is already running
    fn schedule_fetch(&self, key: &MarketKey) -> Option<FetchWaiter> {
        match self.inner.in_flight.claim(key) {
            Claim::Acquired(guard) => {
                let waiter = self.inner.in_flight.waiter(key);
                let this = self.clone();
                self.inner.pool.spawn(async move {
                    // Failures are logged and published by run_fetch
                    let _ = this.run_fetch(guard, false).await;
                });
                waiter
            }
            Claim::Pending(waiter) => {
                debug!(market = %key, "Refresh already in flight");
                Some(waiter)
            }
        }
    }

    /// Fetches on the caller's task, or waits for a fetch already running
    async fn fetch_now(&self, key: &MarketKey) -> Resolution {
        match self.inner.in_flight.claim(key) {
            Claim::Acquired(guard) => match self.run_fetch(guard, true).await {
                Ok(table) => Resolution::cached(table, CacheState::Fresh, TierSource::Network),
                Err(e) => Resolution::failed(e),
            },
            Claim::Pending(waiter) => {
                debug!(market = %key, "Waiting for in-flight fetch");
                match waiter.wait().await {
                    Ok(()) => match self.inner.memory.get(key) {
                        Some(entry) => {
                            let now = self.inner.clock.now();
                            let state = if entry.is_fresh(now, self.inner.config.ttl_delta()) {
                                CacheState::Fresh
                            } else {
                                CacheState::StaleServing
                            };
                            Resolution::cached(entry.table, state, TierSource::Network)
                        }
                        None => Resolution::failed(CacheError::NetworkFailure(format!(
                            "fetch for '{}' completed without data",
                            key
                        ))),
                    },
                    Err(e) => Resolution::failed(e),
                }
            }
        }
    }

    /// The fetch procedure shared by foreground and background fetches
    ///
    /// The guard is released when this returns, whatever the outcome.
    async fn run_fetch(&self, guard: InFlightGuard, is_active: bool) -> Result<Table, CacheError> {
        let key = guard.key().clone();
        let result = self
            .inner
            .fetcher
            .fetch(&key, self.inner.config.fetch_timeout)
            .await;

        match result {
            Ok(table) => {
                // Stamped at completion so a slow fetch never looks newer than it is
                let entry = CacheEntry::new(key.clone(), table.clone(), self.inner.clock.now());
                if self.inner.memory.put(entry.clone()) {
                    self.write_persistent(&entry);
                } else {
                    debug!(market = %key, "Newer entry already cached, keeping it");
                }
                self.emit(CacheEvent::Refreshed(key));
                guard.complete(Ok(()));
                Ok(table)
            }
            Err(e) => {
                if is_active {
                    warn!(market = %key, error = %e, "Fetch failed");
                } else {
                    warn!(market = %key, error = %e, "Background refresh failed, keeping cached data");
                }
                self.emit(CacheEvent::RefreshFailed {
                    key,
                    error: e.clone(),
                });
                guard.complete(Err(e.clone()));
                Err(e)
            }
        }
    }

    fn write_persistent(&self, entry: &CacheEntry) {
        let Some(tier) = self.inner.persistent.as_ref() else {
            return;
        };
        if let Err(e) = tier.put(entry) {
            warn!(market = %entry.key, error = %e, "Could not persist cache entry");
        }
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    /// Current state of `key` without fetching anything
    pub fn state_of(&self, key: &MarketKey) -> CacheState {
        let now = self.inner.clock.now();
        let ttl = self.inner.config.ttl_delta();
        let fresh = self
            .inner
            .memory
            .get(key)
            .or_else(|| self.persistent_entry(key))
            .map(|entry| entry.is_fresh(now, ttl));
        CacheState::derive(fresh, self.inner.in_flight.contains(key))
    }

    /// Whether either tier holds a fresh entry for `key`
    pub fn is_fresh(&self, key: &MarketKey) -> bool {
        let now = self.inner.clock.now();
        let ttl = self.inner.config.ttl_delta();
        let memory_fresh = self
            .inner
            .memory
            .get(key)
            .is_some_and(|entry| entry.is_fresh(now, ttl));
        memory_fresh
            || self
                .persistent_entry(key)
                .is_some_and(|entry| entry.is_fresh(now, ttl))
    }

    /// Waits for the fetch of `key` if one is running
    pub async fn wait_for(&self, key: &MarketKey) -> Option<FetchOutcome> {
        let waiter = self.inner.in_flight.waiter(key)?;
        Some(waiter.wait().await)
    }

    /// Switches the active market, notifying subscribers on change
    ///
    /// Returns whether the active market changed.
    pub fn set_active_market(&self, key: MarketKey) -> bool {
        let previous = {
            let mut active = self.inner.active.lock().unwrap_or_else(PoisonError::into_inner);
            if active.as_ref() == Some(&key) {
                return false;
            }
            active.replace(key.clone())
        };
        info!(market = %key, "Active market changed");
        self.emit(CacheEvent::ActiveMarketChanged {
            previous,
            current: key,
        });
        true
    }

    pub fn active_market(&self) -> Option<MarketKey> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribes to cache notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Starts the one-shot preload of every market other than the active one
    ///
    /// Does nothing and returns `false` until the active market has been
    /// resolved with data, or once preload has already started.
    pub fn start_preload(&self, all_keys: Vec<MarketKey>) -> bool {
        if !self.inner.active_resolved.load(Ordering::SeqCst) {
            debug!("Active market not resolved yet, deferring preload");
            return false;
        }
        let Some(active) = self.active_market() else {
            debug!("No active market, skipping preload");
            return false;
        };
        self.inner.preload.trigger(self, active, all_keys)
    }

    /// Runs a coordinating task on the background pool
    pub(crate) fn spawn_coordinator<T>(&self, task: T)
    where
        T: Future<Output = ()> + Send + 'static,
    {
        self.inner.pool.spawn_unbounded(task);
    }

    pub(crate) fn record_preload(&self, report: PreloadReport) {
        self.inner.preload.set_report(report);
    }

    /// Preload counts from the last completed preload run
    pub fn preload_report(&self) -> Option<PreloadReport> {
        self.inner.preload.last_report()
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.inner.memory
    }

    pub fn fetcher(&self) -> &F {
        &self.inner.fetcher
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Waits for background refreshes and preload to finish
    pub async fn shutdown(&self) {
        self.inner.pool.drain().await;
    }
}
