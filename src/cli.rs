//! Command-line interface parsing
//!
//! Flags choose the market and language block to print and override the
//! cache constants for this run.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::config::CacheConfig;
use crate::data::{MarketCatalog, MarketKey};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified market is not in the catalog
    #[error("Invalid market: '{0}'. Valid markets: {1}")]
    InvalidMarket(String, String),

    /// A numeric option that must be positive was zero
    #[error("Invalid value for --{0}: must be greater than zero")]
    ZeroValue(&'static str),

    /// A numeric option too large to represent
    #[error("Invalid value for --{0}: too large")]
    TooLarge(&'static str),
}

/// Bestsellers - cached bestseller lists from markets around the world
#[derive(Parser, Debug)]
#[command(name = "bestsellers")]
#[command(about = "Cached bestseller lists by market")]
#[command(version)]
pub struct Cli {
    /// Market to show
    ///
    /// Valid markets: kr, us, jp, uk, cn, tw, fr, es
    #[arg(long, short, value_name = "MARKET", default_value = "kr")]
    pub market: String,

    /// Language block to display (0 = original titles)
    #[arg(long, short, value_name = "BLOCK", default_value_t = 0)]
    pub language: usize,

    /// Print the known markets and exit
    #[arg(long)]
    pub list_markets: bool,

    /// Do not warm the cache for the other markets
    #[arg(long)]
    pub no_preload: bool,

    /// Directory for the persistent cache (defaults to the XDG cache dir)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Base URL of a mirror serving `<market>.tsv` when a sheet is unreachable
    #[arg(long, value_name = "URL")]
    pub fallback_base: Option<String>,

    /// Hours before cached data is refreshed
    #[arg(long, value_name = "HOURS")]
    pub ttl_hours: Option<u64>,

    /// Markets fetched at once while preloading
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Seconds before a request is abandoned
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Log cache decisions to stderr
    #[arg(long, short)]
    pub verbose: bool,
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub market: MarketKey,
    pub language: usize,
    pub list_markets: bool,
    pub preload: bool,
    pub cache_dir: Option<PathBuf>,
    pub cache: CacheConfig,
    pub verbose: bool,
}

/// Parses a market argument against the catalog, ignoring case
pub fn parse_market_arg(s: &str, catalog: &MarketCatalog) -> Result<MarketKey, CliError> {
    let key = MarketKey::new(s.trim().to_ascii_lowercase());
    if catalog.get(&key).is_some() {
        Ok(key)
    } else {
        let valid: Vec<String> = catalog.keys().iter().map(ToString::to_string).collect();
        Err(CliError::InvalidMarket(s.to_string(), valid.join(", ")))
    }
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with defaults overridden by any flags given
    /// * `Err(CliError)` if the market is unknown or a value is zero or too large
    pub fn from_cli(cli: &Cli, catalog: &MarketCatalog) -> Result<Self, CliError> {
        let market = parse_market_arg(&cli.market, catalog)?;
        let mut cache = CacheConfig::default();

        if let Some(hours) = cli.ttl_hours {
            if hours == 0 {
                return Err(CliError::ZeroValue("ttl-hours"));
            }
            let secs = hours
                .checked_mul(60 * 60)
                .ok_or(CliError::TooLarge("ttl-hours"))?;
            cache.ttl = Duration::from_secs(secs);
        }
        if let Some(batch_size) = cli.batch_size {
            if batch_size == 0 {
                return Err(CliError::ZeroValue("batch-size"));
            }
            cache.preload_batch_size = batch_size;
        }
        if let Some(secs) = cli.timeout_secs {
            if secs == 0 {
                return Err(CliError::ZeroValue("timeout-secs"));
            }
            cache.fetch_timeout = Duration::from_secs(secs);
        }

        Ok(StartupConfig {
            market,
            language: cli.language,
            list_markets: cli.list_markets,
            preload: !cli.no_preload,
            cache_dir: cli.cache_dir.clone(),
            cache,
            verbose: cli.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["bestsellers"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).expect("arguments should parse")
    }

    #[test]
    fn test_parse_market_arg_accepts_known_markets() {
        let catalog = MarketCatalog::default_markets();
        assert_eq!(parse_market_arg("jp", &catalog).unwrap(), MarketKey::new("jp"));
        assert_eq!(parse_market_arg("FR", &catalog).unwrap(), MarketKey::new("fr"));
    }

    #[test]
    fn test_parse_market_arg_rejects_unknown_market() {
        let catalog = MarketCatalog::default_markets();
        let err = parse_market_arg("mars", &catalog).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("mars"));
        assert!(message.contains("kr, us, jp"));
    }

    #[test]
    fn test_startup_config_defaults() {
        let catalog = MarketCatalog::default_markets();
        let config = StartupConfig::from_cli(&parse(&[]), &catalog).unwrap();

        assert_eq!(config.market, MarketKey::new("kr"));
        assert_eq!(config.language, 0);
        assert!(config.preload);
        assert!(!config.list_markets);
        assert_eq!(config.cache.ttl, CacheConfig::default().ttl);
    }

    #[test]
    fn test_startup_config_overrides() {
        let catalog = MarketCatalog::default_markets();
        let cli = parse(&[
            "--market", "us", "--language", "2", "--ttl-hours", "6", "--batch-size", "2",
            "--timeout-secs", "4", "--no-preload",
        ]);
        let config = StartupConfig::from_cli(&cli, &catalog).unwrap();

        assert_eq!(config.market, MarketKey::new("us"));
        assert_eq!(config.language, 2);
        assert!(!config.preload);
        assert_eq!(config.cache.ttl, Duration::from_secs(6 * 3600));
        assert_eq!(config.cache.preload_batch_size, 2);
        assert_eq!(config.cache.fetch_timeout, Duration::from_secs(4));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let catalog = MarketCatalog::default_markets();
        let result = StartupConfig::from_cli(&parse(&["--batch-size", "0"]), &catalog);
        assert!(matches!(result, Err(CliError::ZeroValue("batch-size"))));
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let catalog = MarketCatalog::default_markets();
        let result = StartupConfig::from_cli(&parse(&["--ttl-hours", "0"]), &catalog);
        assert!(matches!(result, Err(CliError::ZeroValue("ttl-hours"))));
    }

    #[test]
    fn test_overflowing_ttl_is_rejected() {
        let catalog = MarketCatalog::default_markets();
        let hours = u64::MAX.to_string();
        let cli = parse(&["--ttl-hours", hours.as_str()]);
        let result = StartupConfig::from_cli(&cli, &catalog);
        assert!(matches!(result, Err(CliError::TooLarge("ttl-hours"))));
    }
}
