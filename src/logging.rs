//! Diagnostic logging setup
//!
//! Events go to stderr; stdout carries only the ledger CSV.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter directive for a `-v` count
///
/// # Arguments
///
/// * `verbosity` - Number of `-v` flags given (0 = warn, 1 = info, 2+ = debug)
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the verbosity flag. Calling this twice
/// leaves the first subscriber in place.
pub fn init_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    // Err only when a subscriber is already installed
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::quiet(0, "warn")]
    #[case::verbose(1, "info")]
    #[case::very_verbose(2, "debug")]
    #[case::saturates(7, "debug")]
    fn test_default_directive(#[case] verbosity: u8, #[case] expected: &str) {
        assert_eq!(default_directive(verbosity), expected);
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging(0);
        init_logging(2);
    }
}
