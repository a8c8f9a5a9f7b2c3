//! Integration tests for CLI argument handling
//!
//! Tests market selection, --list-markets and value validation without
//! touching the network.

use std::process::Command;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_bestsellers"))
        .args(args)
        .output()
        .expect("Failed to execute bestsellers")
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(
        output.status.success(),
        "Expected --help to exit successfully"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bestsellers"), "Help should mention bestsellers");
    assert!(stdout.contains("market"), "Help should mention --market flag");
}

#[test]
fn test_invalid_market_prints_error_and_exits() {
    let output = run_cli(&["--market", "atlantis"]);
    assert!(!output.status.success(), "Expected invalid market to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid market"),
        "Should print error message about invalid market: {}",
        stderr
    );
}

#[test]
fn test_list_markets_prints_catalog() {
    let output = run_cli(&["--list-markets"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("kr\tKorea"));
    assert!(stdout.contains("us\tUnited States"));
    assert_eq!(stdout.lines().count(), 8);
}

#[test]
fn test_zero_batch_size_is_rejected() {
    let output = run_cli(&["--batch-size", "0", "--list-markets"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("batch-size"), "stderr was: {}", stderr);
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use bestsellers::cli::{Cli, StartupConfig};
    use bestsellers::data::{MarketCatalog, MarketKey};
    use clap::Parser;

    #[test]
    fn test_cli_no_args_uses_korea() {
        let cli = Cli::parse_from(["bestsellers"]);
        assert_eq!(cli.market, "kr");
        assert_eq!(cli.language, 0);
        assert!(!cli.no_preload);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["bestsellers", "-m", "jp", "-l", "3", "-v"]);
        assert_eq!(cli.market, "jp");
        assert_eq!(cli.language, 3);
        assert!(cli.verbose);
    }

    #[test]
    fn test_startup_config_with_fallback_catalog() {
        let cli = Cli::parse_from([
            "bestsellers",
            "--market",
            "ES",
            "--fallback-base",
            "http://mirror.test",
        ]);
        let catalog = MarketCatalog::default_markets()
            .with_fallback_base(cli.fallback_base.as_deref().unwrap_or_default());
        let config = StartupConfig::from_cli(&cli, &catalog).unwrap();

        assert_eq!(config.market, MarketKey::new("es"));
        let market = catalog.get(&config.market).unwrap();
        assert_eq!(
            market.secondary_url.as_deref(),
            Some("http://mirror.test/es.tsv")
        );
    }

    #[test]
    fn test_cache_dir_is_passed_through() {
        let cli = Cli::parse_from(["bestsellers", "--cache-dir", "/tmp/bestsellers-test"]);
        let config = StartupConfig::from_cli(&cli, &MarketCatalog::default_markets()).unwrap();
        assert_eq!(
            config.cache_dir.as_deref(),
            Some(std::path::Path::new("/tmp/bestsellers-test"))
        );
    }
}
