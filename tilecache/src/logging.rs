//! Process-wide logging setup.
//!
//! Structured console output through `tracing-subscriber`, filtered by
//! `RUST_LOG` when set. Library code only emits `tracing` events; binaries
//! call [`init_logging`] once at startup.

use std::io;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "tilecache=debug,info"
    } else {
        "info"
    }
}

/// Initialize the global subscriber, writing to stderr.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(verbose: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(verbose);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), "info");
        assert!(default_filter(true).contains("tilecache=debug"));
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_logging(false);
        assert!(init_logging(false).is_err());
    }
}
