//! Reporting interface for cache failures.
//!
//! The cache never decides where its failure reports go. Storage read and
//! write failures, dropped writes and worker panics are handed to an injected
//! [`Logger`], so an embedding application can route them to its own error
//! reporting while the CLI simply forwards them to `tracing`.
//!
//! - [`TracingLogger`]: production adapter over the `tracing` macros
//! - [`NoOpLogger`]: discards everything
//! - [`RecordingLogger`]: keeps records in memory for inspection
//!
//! ```
//! use std::sync::Arc;
//! use tilecache::log::{Logger, RecordingLogger};
//! use tilecache::log_warn;
//!
//! let logger = Arc::new(RecordingLogger::new());
//! log_warn!(logger, "write queue full, dropped {}", "osm/3/1/2");
//! assert!(logger.contains("dropped osm/3/1/2"));
//! ```

mod logger;
mod noop;
mod recording;
mod tracing_adapter;

pub use logger::{LogLevel, Logger};
pub use noop::NoOpLogger;
pub use recording::{LogRecord, RecordingLogger};
pub use tracing_adapter::TracingLogger;
