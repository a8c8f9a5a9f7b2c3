//! Remote fetching of market tables
//!
//! The orchestrator only sees the [`Fetcher`] trait. [`HttpFetcher`] is the
//! production implementation: primary source first, fallback source second,
//! every attempt bounded by a timeout and recorded in [`FetchTelemetry`].

mod http;

pub use http::{HttpFetcher, HttpTransport, ReqwestTransport};

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::data::{MarketKey, Table};
use crate::error::CacheError;

/// Attempts kept in telemetry before the oldest are dropped
const TELEMETRY_CAPACITY: usize = 256;

/// Retrieves the table for one market
pub trait Fetcher: Send + Sync + 'static {
    /// Fetches `key`, giving each source attempt at most `timeout`
    fn fetch(
        &self,
        key: &MarketKey,
        timeout: Duration,
    ) -> impl Future<Output = Result<Table, CacheError>> + Send;
}

/// Which source an attempt went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Primary,
    Secondary,
}

/// One request to one source
#[derive(Debug, Clone, PartialEq)]
pub struct FetchAttempt {
    pub market: MarketKey,
    pub source: SourceKind,
    pub url: String,
    pub outcome: Result<(), CacheError>,
    pub elapsed: Duration,
}

/// Record of recent fetch attempts
#[derive(Debug, Default)]
pub struct FetchTelemetry {
    attempts: Mutex<VecDeque<FetchAttempt>>,
}

impl FetchTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, attempt: FetchAttempt) {
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        if attempts.len() == TELEMETRY_CAPACITY {
            attempts.pop_front();
        }
        attempts.push_back(attempt);
    }

    /// Recorded attempts, oldest first
    pub fn attempts(&self) -> Vec<FetchAttempt> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Recorded attempts for one market, oldest first
    pub fn attempts_for(&self, key: &MarketKey) -> Vec<FetchAttempt> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|a| &a.market == key)
            .cloned()
            .collect()
    }
}
