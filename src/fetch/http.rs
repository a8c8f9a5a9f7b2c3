//! HTTP fetching with fallback source and per-attempt timeout

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, info, warn};

use super::{FetchAttempt, FetchTelemetry, Fetcher, SourceKind};
use crate::data::{Market, MarketCatalog, MarketKey, Table};
use crate::error::CacheError;

/// User-Agent sent with every request
const USER_AGENT: &str = concat!("bestsellers/", env!("CARGO_PKG_VERSION"));

/// Transport used to download a source payload
///
/// Implementations report non-success responses as `NetworkFailure`.
pub trait HttpTransport: Send + Sync + 'static {
    fn get_text(&self, url: &str) -> impl Future<Output = Result<String, CacheError>> + Send;
}

/// Transport backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, CacheError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    /// Create a transport with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    async fn get_text(&self, url: &str) -> Result<String, CacheError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::NetworkFailure(format!("HTTP {} from {}", status, url)));
        }
        Ok(response.text().await?)
    }
}

/// Fetches market tables over HTTP
pub struct HttpFetcher<T = ReqwestTransport> {
    transport: T,
    catalog: MarketCatalog,
    telemetry: Arc<FetchTelemetry>,
}

impl HttpFetcher<ReqwestTransport> {
    /// Create a fetcher for `catalog` with the default reqwest transport
    pub fn new(catalog: MarketCatalog) -> Result<Self, CacheError> {
        Ok(Self::with_transport(ReqwestTransport::new()?, catalog))
    }
}

impl<T: HttpTransport> HttpFetcher<T> {
    pub fn with_transport(transport: T, catalog: MarketCatalog) -> Self {
        Self {
            transport,
            catalog,
            telemetry: Arc::new(FetchTelemetry::new()),
        }
    }

    /// Shared handle on the attempt log
    pub fn telemetry(&self) -> Arc<FetchTelemetry> {
        Arc::clone(&self.telemetry)
    }

    pub fn catalog(&self) -> &MarketCatalog {
        &self.catalog
    }

    async fn attempt(
        &self,
        market: &Market,
        source: SourceKind,
        url: &str,
        timeout: Duration,
    ) -> Result<Table, CacheError> {
        debug!(market = %market.key, ?source, url, "Fetching market table");
        let started = Instant::now();

        // Dropping the request future on timeout aborts it
        let result = match tokio::time::timeout(timeout, self.transport.get_text(url)).await {
            Err(_) => Err(CacheError::NetworkTimeout {
                url: url.to_string(),
                timeout,
            }),
            Ok(Err(e)) => Err(e),
            Ok(Ok(body)) => Table::parse_tsv(&body, &market.schema),
        };

        let elapsed = started.elapsed();
        self.telemetry.record(FetchAttempt {
            market: market.key.clone(),
            source,
            url: url.to_string(),
            outcome: result.as_ref().map(|_| ()).map_err(Clone::clone),
            elapsed,
        });

        match &result {
            Ok(table) => info!(
                market = %market.key,
                ?source,
                rows = table.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Fetched market table"
            ),
            Err(e) => warn!(market = %market.key, ?source, error = %e, "Fetch attempt failed"),
        }
        result
    }
}

impl<T: HttpTransport> Fetcher for HttpFetcher<T> {
    async fn fetch(&self, key: &MarketKey, timeout: Duration) -> Result<Table, CacheError> {
        let market = self
            .catalog
            .get(key)
            .ok_or_else(|| CacheError::UnknownMarket(key.clone()))?;

        let primary_error = match self
            .attempt(market, SourceKind::Primary, &market.primary_url, timeout)
            .await
        {
            Ok(table) => return Ok(table),
            Err(e) => e,
        };

        let Some(secondary_url) = market.secondary_url.as_deref() else {
            return Err(primary_error);
        };

        self.attempt(market, SourceKind::Secondary, secondary_url, timeout)
            .await
            .map_err(|_| primary_error)
    }
}
