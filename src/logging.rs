//! Logging setup for the command-line front end
//!
//! Logs go to stderr so stdout stays clean for the table output. The filter
//! comes from `RUST_LOG` when set, otherwise from the verbosity flag.

use std::io;

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "bestsellers=debug,info"
    } else {
        "warn"
    }
}

/// Installs the global subscriber
///
/// Calling it twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init_logging(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directive(false), "warn");
        assert!(default_directive(true).contains("bestsellers=debug"));
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_logging(false);
        init_logging(true);
    }
}
