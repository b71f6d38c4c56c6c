//! Per-call correlation identifiers and invocation context

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Unique identifier threaded through every log entry and metrics row of one call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new random (v4) correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the correlation ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ephemeral state of one wrapped invocation, created at wrapper entry
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Unique correlation identifier
    pub correlation_id: CorrelationId,

    /// Name of the wrapped function
    pub function: String,

    /// Monotonic start instant
    pub start_time: Instant,

    /// Wall clock time at entry
    pub timestamp: DateTime<Local>,
}

impl CallContext {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            function: function.into(),
            start_time: Instant::now(),
            timestamp: Local::now(),
        }
    }

    /// Time spent since entry, on the monotonic clock
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Entry timestamp in the metrics table format
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
