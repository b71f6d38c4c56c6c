//! Log record formatting: structured JSON lines and plain console lines

use chrono::{DateTime, Local};
use serde_json::json;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
};

/// Marker for a field the event did not carry
pub const NOT_AVAILABLE: &str = "N/A";

/// Event field holding the wrapped function's name
pub const FUNCTION_FIELD: &str = "function";

/// Event field holding the correlation id
pub const UUID_FIELD: &str = "uuid";

/// Event field holding diagnostic detail of a failure
pub const TRACE_FIELD: &str = "trace";

/// A log event as seen by the sinks
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub message: String,
    pub function: Option<String>,
    pub correlation_id: Option<String>,
    pub trace: Option<String>,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
            function: None,
            correlation_id: None,
            trace: None,
        }
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// `2024-01-02 03:04:05,678`
    pub fn formatted_time(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S,%3f").to_string()
    }

    /// One self-contained JSON object, no trailing newline
    pub fn to_json_line(&self) -> String {
        let mut record = json!({
            "timestamp": self.formatted_time(),
            "level": self.level.as_str(),
            "message": self.message,
            "function": self.function.as_deref().unwrap_or(NOT_AVAILABLE),
            "uuid": self.correlation_id.as_deref().unwrap_or(NOT_AVAILABLE),
        });

        if let Some(trace) = &self.trace {
            record["trace"] = json!(trace);
        }

        record.to_string()
    }

    /// `<timestamp> - <LEVEL> - <message>`, followed by the trace on its own lines
    pub fn to_console_line(&self) -> String {
        let mut line = format!(
            "{} - {} - {}",
            self.formatted_time(),
            self.level.as_str(),
            self.message
        );

        if let Some(trace) = &self.trace {
            line.push('\n');
            line.push_str(trace);
        }

        line
    }

    /// Rebuild a record from a tracing event
    pub fn from_event(event: &Event<'_>) -> Self {
        let mut visitor = CallFieldVisitor::default();
        event.record(&mut visitor);

        Self {
            timestamp: Local::now(),
            level: *event.metadata().level(),
            message: visitor.message.unwrap_or_default(),
            function: visitor.function,
            correlation_id: visitor.uuid,
            trace: visitor.trace,
        }
    }
}

/// File formatter: one JSON object per line
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLineFormatter;

impl<S, N> FormatEvent<S, N> for JsonLineFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        writeln!(writer, "{}", LogRecord::from_event(event).to_json_line())
    }
}

/// Console formatter: `<timestamp> - <LEVEL> - <message>`
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleFormatter;

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        writeln!(writer, "{}", LogRecord::from_event(event).to_console_line())
    }
}

/// Visitor pulling the call fields out of an event
#[derive(Debug, Default)]
struct CallFieldVisitor {
    message: Option<String>,
    function: Option<String>,
    uuid: Option<String>,
    trace: Option<String>,
}

impl CallFieldVisitor {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "message" => self.message = Some(value),
            FUNCTION_FIELD => self.function = Some(value),
            UUID_FIELD => self.uuid = Some(value),
            TRACE_FIELD => self.trace = Some(value),
            _ => {}
        }
    }
}

impl tracing::field::Visit for CallFieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.set(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        // Messages and `%`-captured values arrive here and print without quotes
        self.set(field.name(), format!("{:?}", value));
    }
}
