//! Single-flight tracking of network fetches
//!
//! A key enters the set when a fetch starts and leaves it when the returned
//! guard is dropped, whatever the fetch outcome. Callers that find a key
//! already in flight get a `FetchWaiter` that resolves with the outcome of
//! the running fetch instead of starting a second one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use crate::data::MarketKey;
use crate::error::CacheError;

/// Outcome broadcast to everyone waiting on a fetch
pub type FetchOutcome = Result<(), CacheError>;

type Slots = Arc<Mutex<HashMap<MarketKey, watch::Sender<Option<FetchOutcome>>>>>;

/// Keys currently being fetched
#[derive(Debug, Default)]
pub struct InFlightSet {
    slots: Slots,
}

/// Result of trying to claim a key
pub enum Claim {
    /// No fetch was running; the caller now owns the fetch
    Acquired(InFlightGuard),
    /// Another fetch is running for the key
    Pending(FetchWaiter),
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims `key` or subscribes to the fetch already running
    pub fn claim(&self, key: &MarketKey) -> Claim {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = slots.get(key) {
            debug!(market = %key, "Fetch already in flight");
            return Claim::Pending(FetchWaiter {
                rx: tx.subscribe(),
            });
        }

        let (tx, _rx) = watch::channel(None);
        slots.insert(key.clone(), tx);
        Claim::Acquired(InFlightGuard {
            key: key.clone(),
            slots: Arc::clone(&self.slots),
            outcome: None,
        })
    }

    /// A waiter for the running fetch of `key`, if any
    pub fn waiter(&self, key: &MarketKey) -> Option<FetchWaiter> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|tx| FetchWaiter { rx: tx.subscribe() })
    }

    pub fn contains(&self, key: &MarketKey) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ownership of a key's fetch; dropping it releases the key
pub struct InFlightGuard {
    key: MarketKey,
    slots: Slots,
    outcome: Option<FetchOutcome>,
}

impl InFlightGuard {
    pub fn key(&self) -> &MarketKey {
        &self.key
    }

    /// Records the fetch outcome to hand to waiters on release
    pub fn complete(mut self, outcome: FetchOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let tx = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);

        if let Some(tx) = tx {
            let outcome = self.outcome.take().unwrap_or_else(|| {
                Err(CacheError::NetworkFailure(format!(
                    "fetch for '{}' ended without a result",
                    self.key
                )))
            });
            // Receivers may all be gone already
            let _ = tx.send(Some(outcome));
        }
    }
}

/// Waits for another task's fetch to finish
pub struct FetchWaiter {
    rx: watch::Receiver<Option<FetchOutcome>>,
}

impl FetchWaiter {
    /// Resolves with the outcome of the fetch being waited on
    pub async fn wait(mut self) -> FetchOutcome {
        loop {
            if let Some(outcome) = self.rx.borrow_and_update().clone() {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                // Sender dropped; pick up a value sent right before closing
                return self.rx.borrow().clone().unwrap_or_else(|| {
                    Err(CacheError::NetworkFailure(
                        "in-flight fetch was abandoned".to_string(),
                    ))
                });
            }
        }
    }
}
