//! Cache notifications for the presentation layer
//!
//! The orchestrator publishes on a broadcast channel so a consumer can
//! re-render when the active market changes or a background refresh lands,
//! without the cache knowing anything about the UI.

use tokio::sync::broadcast;

use crate::data::MarketKey;
use crate::error::CacheError;

/// Buffered events per subscriber before the oldest are dropped
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Messages sent from the cache to its consumers
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// The consumer switched to another market
    ActiveMarketChanged {
        previous: Option<MarketKey>,
        current: MarketKey,
    },
    /// A fetch stored a new table for the market
    Refreshed(MarketKey),
    /// A fetch failed; any cached table is still being served
    RefreshFailed { key: MarketKey, error: CacheError },
}

/// Checks for a pending event without blocking
///
/// Lagged receivers skip ahead to the oldest retained event.
pub fn try_recv(receiver: &mut broadcast::Receiver<CacheEvent>) -> Option<CacheEvent> {
    loop {
        match receiver.try_recv() {
            Ok(event) => return Some(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return None,
        }
    }
}
