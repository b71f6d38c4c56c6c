//! Per-wrapper log dispatch
//!
//! Every wrapper owns a [`CallLogger`]: a private `tracing` dispatcher with its
//! own console and file layers. Nothing is installed process-wide, so two
//! wrappers with different destinations never see each other's events.

use crate::{
    correlation::CallContext,
    formatters::{ConsoleFormatter, JsonLineFormatter},
    rotation::RotatingFileWriter,
};
use tracing::{level_filters::LevelFilter, Dispatch};
use tracing_subscriber::{fmt, fmt::MakeWriter, layer::SubscriberExt, Layer, Registry};

/// Target used for every event a wrapper emits
pub const LOG_TARGET: &str = "calltrace";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Handle to a wrapper's log destinations
#[derive(Clone)]
pub struct CallLogger {
    dispatch: Dispatch,
    /// Rotating files behind the file layers, checked for failed writes
    files: Vec<RotatingFileWriter>,
}

impl CallLogger {
    pub fn builder() -> CallLoggerBuilder {
        CallLoggerBuilder::default()
    }

    /// Logger with no destinations
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
            files: Vec::new(),
        }
    }

    /// Emit an info-severity entry for a call
    pub fn info(&self, context: &CallContext, message: &str) {
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info!(
                target: LOG_TARGET,
                function = %context.function,
                uuid = %context.correlation_id,
                "{}",
                message
            );
        });
        self.report_write_failures();
    }

    /// Emit an error-severity entry for a call, with optional diagnostic trace
    pub fn error(&self, context: &CallContext, message: &str, trace: Option<&str>) {
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::error!(
                target: LOG_TARGET,
                function = %context.function,
                uuid = %context.correlation_id,
                trace = trace,
                "{}",
                message
            );
        });
        self.report_write_failures();
    }

    /// Surface dropped log records through the ambient subscriber.
    ///
    /// Runs after this logger's dispatch is released, so the warning never
    /// re-enters the failing file.
    fn report_write_failures(&self) {
        for file in &self.files {
            if let Some(error) = file.take_error() {
                tracing::warn!(
                    calltrace.event = "log_write_failed",
                    path = %file.path().display(),
                    error = %error,
                    "Failed to write log record"
                );
            }
        }
    }
}

impl std::fmt::Debug for CallLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallLogger").finish_non_exhaustive()
    }
}

/// Assembles the layers of a [`CallLogger`]
pub struct CallLoggerBuilder {
    level: LevelFilter,
    layers: Vec<BoxedLayer>,
    files: Vec<RotatingFileWriter>,
}

impl Default for CallLoggerBuilder {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            layers: Vec::new(),
            files: Vec::new(),
        }
    }
}

impl CallLoggerBuilder {
    /// Minimum severity for destinations added after this call
    pub fn level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Human-readable lines on stderr
    pub fn console(self) -> Self {
        self.console_writer(std::io::stderr)
    }

    /// Human-readable lines on an arbitrary writer
    pub fn console_writer<W>(mut self, writer: W) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .event_format(ConsoleFormatter)
            .with_writer(writer)
            .with_filter(self.level)
            .boxed();
        self.layers.push(layer);
        self
    }

    /// Structured lines into a rotating log file
    pub fn file(mut self, writer: RotatingFileWriter) -> Self {
        self.files.push(writer.clone());
        self.structured_writer(writer)
    }

    /// Structured lines on an arbitrary writer
    pub fn structured_writer<W>(mut self, writer: W) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .event_format(JsonLineFormatter)
            .with_writer(writer)
            .with_filter(self.level)
            .boxed();
        self.layers.push(layer);
        self
    }

    pub fn build(self) -> CallLogger {
        if self.layers.is_empty() {
            return CallLogger::disabled();
        }

        let subscriber = Registry::default().with(self.layers);
        CallLogger {
            dispatch: Dispatch::new(subscriber),
            files: self.files,
        }
    }
}
