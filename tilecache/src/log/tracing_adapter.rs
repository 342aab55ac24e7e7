//! Tracing library adapter implementation.

use crate::log::{LogLevel, Logger};
use std::fmt::Arguments;

/// Logger implementation that delegates to the `tracing` crate.
///
/// Records are emitted under the `tilecache::report` target so they can be
/// filtered separately from the cache's own diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        match level {
            LogLevel::Trace => tracing::trace!(target: "tilecache::report", "{}", args),
            LogLevel::Debug => tracing::debug!(target: "tilecache::report", "{}", args),
            LogLevel::Info => tracing::info!(target: "tilecache::report", "{}", args),
            LogLevel::Warn => tracing::warn!(target: "tilecache::report", "{}", args),
            LogLevel::Error => tracing::error!(target: "tilecache::report", "{}", args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_logger_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TracingLogger>();
    }

    #[test]
    fn test_tracing_logger_without_subscriber() {
        let logger: Box<dyn Logger> = Box::new(TracingLogger::new());
        logger.warn(format_args!("no subscriber installed"));
    }
}
