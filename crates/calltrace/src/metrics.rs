//! Tabular per-call metrics and metrics-facade reporting

use crate::{correlation::CallContext, resources::ResourceUsage, Result};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Header row of the metrics table
pub const CSV_HEADER: [&str; 9] = [
    "Timestamp",
    "UUID",
    "Function Name",
    "Execution Time (s)",
    "CPU Time (sec)",
    "Memory Change (MB)",
    "Final Memory Usage (MB)",
    "Arguments",
    "Log Message",
];

/// One row of the metrics table, immutable once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    pub timestamp: String,
    pub correlation_id: String,
    pub function: String,
    pub elapsed_seconds: f64,
    /// Absent when resources were not sampled for this call
    pub cpu_seconds: Option<f64>,
    pub memory_delta_mb: Option<f64>,
    pub final_memory_mb: Option<f64>,
    pub arguments: String,
    pub message: String,
}

impl MetricsRow {
    pub fn new(
        context: &CallContext,
        elapsed: Duration,
        usage: Option<ResourceUsage>,
        arguments: String,
        message: String,
    ) -> Self {
        Self {
            timestamp: context.timestamp_string(),
            correlation_id: context.correlation_id.to_string(),
            function: context.function.clone(),
            elapsed_seconds: elapsed.as_secs_f64(),
            cpu_seconds: usage.map(|u| u.cpu_seconds),
            memory_delta_mb: usage.map(|u| u.memory_delta_mb),
            final_memory_mb: usage.map(|u| u.final_memory_mb),
            arguments,
            message,
        }
    }

    /// Field values in header order; absent values are empty
    pub fn fields(&self) -> [String; 9] {
        let optional = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();

        [
            self.timestamp.clone(),
            self.correlation_id.clone(),
            self.function.clone(),
            self.elapsed_seconds.to_string(),
            optional(self.cpu_seconds),
            optional(self.memory_delta_mb),
            optional(self.final_memory_mb),
            self.arguments.clone(),
            self.message.clone(),
        ]
    }

    /// One CSV line including the trailing newline
    pub fn to_csv_line(&self) -> String {
        csv_line(self.fields().iter().map(String::as_str))
    }
}

/// Quote a field when it holds a delimiter, quote or line break
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let mut line = fields.map(csv_field).collect::<Vec<_>>().join(",");
    line.push_str("\r\n");
    line
}

/// Destination for metrics rows.
///
/// Implementations must keep each row atomic under concurrent appends.
pub trait MetricsSink: Send + Sync {
    fn append(&self, row: &MetricsRow) -> Result<()>;
}

/// Append-only CSV file with a fixed header
pub struct CsvMetricsSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl CsvMetricsSink {
    /// Open the table at `path`, creating it with a header row when missing or empty
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        if file.metadata()?.len() == 0 {
            file.write_all(csv_line(CSV_HEADER.iter().copied()).as_bytes())?;
            tracing::info!(
                calltrace.event = "metrics_table_created",
                file_path = %path.display(),
                "Created metrics table"
            );
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for CsvMetricsSink {
    fn append(&self, row: &MetricsRow) -> Result<()> {
        let line = row.to_csv_line();
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Reporting through the `metrics` facade; no-ops without an installed recorder
pub struct MetricsUtil;

impl MetricsUtil {
    /// Record a completed call
    pub fn record_call(function: &str, elapsed: Duration) {
        histogram!("calltrace.call.duration_seconds", "function" => function.to_string())
            .record(elapsed.as_secs_f64());

        counter!("calltrace.calls.completed", "function" => function.to_string()).increment(1);
    }

    /// Record a failed call
    pub fn record_failure(function: &str) {
        counter!("calltrace.calls.failed", "function" => function.to_string()).increment(1);
    }

    /// Record an instrumentation write that did not make it to its sink
    pub fn record_sink_error(sink: &'static str) {
        counter!("calltrace.sink.errors", "sink" => sink).increment(1);
    }
}
