//! Bestsellers - print a market's bestseller list
//!
//! Resolves the requested market through the cache, prints it, then warms
//! the cache for the other markets before exiting.

use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};

use bestsellers::cache::{FileStore, Orchestrator, PersistentTier};
use bestsellers::cli::{Cli, StartupConfig};
use bestsellers::data::MarketCatalog;
use bestsellers::error::CacheError;
use bestsellers::fetch::HttpFetcher;
use bestsellers::logging::init_logging;
use bestsellers::output::{render_catalog, render_view};

/// Builds the persistent tier, or runs memory-only when no cache dir is known
fn persistent_tier(startup: &StartupConfig) -> Option<PersistentTier> {
    let store = match &startup.cache_dir {
        Some(dir) => Some(FileStore::with_dir(dir.clone())),
        None => FileStore::new(),
    };
    match store {
        Some(store) => {
            info!(dir = %store.dir().display(), "Using persistent cache");
            Some(PersistentTier::new(
                Box::new(store),
                startup.cache.eviction_count,
            ))
        }
        None => {
            warn!("No cache directory available, caching in memory only");
            None
        }
    }
}

async fn run(startup: StartupConfig, catalog: MarketCatalog) -> Result<ExitCode, CacheError> {
    let market = catalog
        .get(&startup.market)
        .cloned()
        .ok_or_else(|| CacheError::UnknownMarket(startup.market.clone()))?;

    let fetcher = HttpFetcher::new(catalog.clone())?;
    let orchestrator = Orchestrator::new(fetcher, persistent_tier(&startup), startup.cache.clone());
    orchestrator.set_active_market(market.key.clone());

    let resolution = orchestrator.resolve(&market.key, true).await;
    let exit = match &resolution.table {
        Some(table) => {
            let view = table.locale_view(startup.language, &market.schema);
            print!("{}", render_view(&market, &view, resolution.state));
            if startup.preload {
                orchestrator.start_preload(catalog.keys());
            }
            ExitCode::SUCCESS
        }
        None => {
            let reason = resolution
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no data".to_string());
            eprintln!("Could not load {}: {}. Run again to retry.", market.name, reason);
            ExitCode::FAILURE
        }
    };

    orchestrator.shutdown().await;
    if let Some(report) = orchestrator.preload_report() {
        info!(
            warmed = report.warmed,
            skipped = report.skipped,
            failed = report.failed,
            "Preload complete"
        );
    }
    Ok(exit)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut catalog = MarketCatalog::default_markets();
    if let Some(base) = &cli.fallback_base {
        catalog = catalog.with_fallback_base(base);
    }

    let startup = match StartupConfig::from_cli(&cli, &catalog) {
        Ok(startup) => startup,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    init_logging(startup.verbose);

    if startup.list_markets {
        print!("{}", render_catalog(&catalog));
        return ExitCode::SUCCESS;
    }

    match run(startup, catalog).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
