//! Logger that keeps every record in memory.

use std::fmt::Arguments;

use parking_lot::Mutex;

use crate::log::{LogLevel, Logger};

/// One captured report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

/// Logger that captures records for later inspection.
///
/// Useful for embedding applications that batch failure reports, and for
/// asserting on reports in tests.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records captured so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Records at or above `level`.
    pub fn at_least(&self, level: LogLevel) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.level >= level)
            .cloned()
            .collect()
    }

    /// True if any captured message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.records.lock().iter().any(|r| r.message.contains(needle))
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        self.records.lock().push(LogRecord {
            level,
            message: args.to_string(),
        });
    }
}
