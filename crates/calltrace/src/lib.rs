//! # Calltrace
//!
//! Function-level instrumentation: wrap a unit of work to record its
//! execution time, CPU and memory deltas, and any failure it signals,
//! without touching the wrapped logic.
//!
//! ## Features
//!
//! - **Timing wrapper**: [`Timer`] measures elapsed time on a monotonic clock,
//!   samples process resources and appends one row per call to a CSV table
//! - **Error wrapper**: [`ErrorCatcher`] logs failures once, with diagnostics,
//!   and hands the original error back to the caller
//! - **Structured logging**: one JSON object per line, rotated by size with a
//!   bounded number of backups
//! - **Redaction**: pluggable sanitizers applied to arguments and error
//!   messages before anything reaches a sink
//!
//! ## Quick Start
//!
//! ```no_run
//! use calltrace::{args, Timer, TimerConfig};
//!
//! fn add(a: i32, b: i32) -> i32 {
//!     a + b
//! }
//!
//! fn main() -> calltrace::Result<()> {
//!     let timer = Timer::new(TimerConfig::default())?;
//!     let sum = timer.time("add", args![2, 3], || add(2, 3));
//!     assert_eq!(sum, 5);
//!     Ok(())
//! }
//! ```

pub mod args;
pub mod catcher;
pub mod config;
pub mod correlation;
mod failure;
pub mod formatters;
pub mod logger;
pub mod metrics;
pub mod resources;
pub mod rotation;
pub mod sanitization;
pub mod timer;

#[cfg(test)]
mod tests;

pub use args::{Arg, CallArgs, Dbg, Loggable, Table, Tabular, ToArg};
pub use catcher::{ErrorCatcher, ErrorCatcherBuilder};
pub use config::{CalltraceConfig, CatcherConfig, TimerConfig};
pub use correlation::{CallContext, CorrelationId};
pub use logger::CallLogger;
pub use metrics::{CsvMetricsSink, MetricsRow, MetricsSink};
pub use resources::{ProcessSampler, ResourceSample, ResourceSampler, ResourceUsage};
pub use rotation::RotatingFileWriter;
pub use sanitization::{mask_digits, RegexSanitizer, Sanitizer};
pub use timer::{Timer, TimerBuilder};

/// Result type for instrumentation-side operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the instrumentation itself.
///
/// Failures of a wrapped unit never surface as this type; the wrappers hand
/// the unit's own error back untouched.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Log rotation error: {message}")]
    Rotation { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Instrumentation error: {message}")]
    System { message: String },
}
