//! Background warming of inactive markets
//!
//! After the active market has been served, the other markets are resolved
//! in small sequential batches so the foreground request keeps most of the
//! bandwidth and the source is not hit with every market at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info};

use super::orchestrator::Orchestrator;
use crate::data::MarketKey;
use crate::fetch::Fetcher;

/// Counts from one preload run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadReport {
    /// Markets fetched successfully
    pub warmed: usize,
    /// Markets already fresh in some tier
    pub skipped: usize,
    /// Markets whose fetch failed
    pub failed: usize,
    pub batches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreloadOutcome {
    Warmed,
    Skipped,
    Failed,
}

/// One-shot preload trigger
#[derive(Debug)]
pub struct PreloadScheduler {
    started: AtomicBool,
    batch_size: usize,
    delay: Duration,
    last_report: Mutex<Option<PreloadReport>>,
}

impl PreloadScheduler {
    pub fn new(batch_size: usize, delay: Duration) -> Self {
        Self {
            started: AtomicBool::new(false),
            batch_size,
            delay,
            last_report: Mutex::new(None),
        }
    }

    /// Starts the preload on the orchestrator's pool the first time it is called
    ///
    /// Returns `false` if a preload was already started.
    pub fn trigger<F: Fetcher>(
        &self,
        orchestrator: &Orchestrator<F>,
        active: MarketKey,
        all_keys: Vec<MarketKey>,
    ) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Preload already started");
            return false;
        }

        let orch = orchestrator.clone();
        let batch_size = self.batch_size;
        let delay = self.delay;
        orchestrator.spawn_coordinator(async move {
            tokio::time::sleep(delay).await;
            let report = preload_all(&orch, &active, &all_keys, batch_size).await;
            orch.record_preload(report);
        });
        true
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn set_report(&self, report: PreloadReport) {
        *self.last_report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report);
    }

    pub fn last_report(&self) -> Option<PreloadReport> {
        *self.last_report.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolves every market except `active`, `batch_size` at a time
///
/// Each batch is awaited as a whole before the next starts. A failing market
/// never stops its batch or the batches after it. Markets already fresh in
/// either tier are skipped without a fetch.
pub async fn preload_all<F: Fetcher>(
    orchestrator: &Orchestrator<F>,
    active: &MarketKey,
    all_keys: &[MarketKey],
    batch_size: usize,
) -> PreloadReport {
    let keys: Vec<&MarketKey> = all_keys.iter().filter(|key| *key != active).collect();
    let mut report = PreloadReport::default();

    for batch in keys.chunks(batch_size.max(1)) {
        debug!(markets = ?batch, "Preloading batch");
        let outcomes = join_all(batch.iter().map(|key| preload_one(orchestrator, key))).await;
        for outcome in outcomes {
            match outcome {
                PreloadOutcome::Warmed => report.warmed += 1,
                PreloadOutcome::Skipped => report.skipped += 1,
                PreloadOutcome::Failed => report.failed += 1,
            }
        }
        report.batches += 1;
    }

    info!(
        warmed = report.warmed,
        skipped = report.skipped,
        failed = report.failed,
        "Preload finished"
    );
    report
}

async fn preload_one<F: Fetcher>(orchestrator: &Orchestrator<F>, key: &MarketKey) -> PreloadOutcome {
    if orchestrator.is_fresh(key) {
        debug!(market = %key, "Already fresh, skipping preload");
        return PreloadOutcome::Skipped;
    }

    let (_, waiter) = orchestrator.resolve_tracked(key, false).await;
    match waiter {
        Some(waiter) => match waiter.wait().await {
            Ok(()) => PreloadOutcome::Warmed,
            Err(e) => {
                debug!(market = %key, error = %e, "Preload fetch failed");
                PreloadOutcome::Failed
            }
        },
        // Stale entry with revalidation disabled
        None => PreloadOutcome::Skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_default_is_empty() {
        let report = PreloadReport::default();
        assert_eq!(report.warmed + report.skipped + report.failed, 0);
    }

    #[test]
    fn test_scheduler_starts_idle() {
        let scheduler = PreloadScheduler::new(3, Duration::from_millis(0));
        assert!(!scheduler.has_started());
        assert!(scheduler.last_report().is_none());
    }
}
