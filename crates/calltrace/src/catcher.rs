//! Error-logging wrapper

use crate::{
    config::CatcherConfig,
    correlation::CallContext,
    failure::{CancelGuard, Failure},
    logger::CallLogger,
    rotation::RotatingFileWriter,
    sanitization::Sanitizer,
    Result,
};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;

/// Logs failures of wrapped units and hands them back unchanged.
///
/// Successful results pass straight through. A failure is logged once at
/// error severity, with its diagnostic trace and a fresh correlation id, to
/// the console and the rotating error log; then the very same error value (or
/// panic payload) is returned to the caller. No metrics rows are written.
#[derive(Clone)]
pub struct ErrorCatcher {
    inner: Arc<CatcherInner>,
}

struct CatcherInner {
    config: CatcherConfig,
    logger: CallLogger,
    sanitizer: Sanitizer,
}

impl ErrorCatcher {
    /// Build a catcher logging to the destinations named by `config`
    pub fn new(config: CatcherConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: CatcherConfig) -> ErrorCatcherBuilder {
        ErrorCatcherBuilder {
            config,
            sanitizer: None,
            logger: None,
        }
    }

    pub fn config(&self) -> &CatcherConfig {
        &self.inner.config
    }

    /// Run a fallible unit, logging its failure if any
    pub fn call<T, E, F>(&self, function: &str, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: fmt::Display + fmt::Debug,
    {
        let context = CallContext::new(function);

        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => {
                self.report(&context, Failure::from_error(&error));
                Err(error)
            }
            Err(payload) => {
                self.report(&context, Failure::from_panic(payload.as_ref()));
                panic::resume_unwind(payload)
            }
        }
    }

    /// Run an async unit, logging its failure or cancellation if any
    pub async fn call_async<T, E, Fut>(&self, function: &str, future: Fut) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display + fmt::Debug,
    {
        let context = CallContext::new(function);

        let mut guard = CancelGuard::new(&self.inner.logger, &context, &self.inner.sanitizer);
        let outcome = AssertUnwindSafe(future).catch_unwind().await;
        guard.disarm();

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => {
                self.report(&context, Failure::from_error(&error));
                Err(error)
            }
            Err(payload) => {
                self.report(&context, Failure::from_panic(payload.as_ref()));
                panic::resume_unwind(payload)
            }
        }
    }

    /// Turn `f` into a function with the same signature whose failures are logged
    pub fn wrap<A, T, E, F>(
        &self,
        function: impl Into<String>,
        f: F,
    ) -> impl Fn(A) -> std::result::Result<T, E>
    where
        F: Fn(A) -> std::result::Result<T, E>,
        E: fmt::Display + fmt::Debug,
    {
        let catcher = self.clone();
        let function = function.into();

        move |input: A| catcher.call(&function, || f(input))
    }

    fn report(&self, context: &CallContext, failure: Failure<'_>) {
        failure.report(&self.inner.logger, context, &self.inner.sanitizer);
    }
}

impl fmt::Debug for ErrorCatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorCatcher")
            .field("config", &self.inner.config)
            .field("sanitizer", &self.inner.sanitizer)
            .finish()
    }
}

/// Configures the collaborators of an [`ErrorCatcher`]
pub struct ErrorCatcherBuilder {
    config: CatcherConfig,
    sanitizer: Option<Sanitizer>,
    logger: Option<CallLogger>,
}

impl ErrorCatcherBuilder {
    /// Redaction applied to every error message and trace
    pub fn sanitizer(mut self, sanitizer: impl Into<Sanitizer>) -> Self {
        self.sanitizer = Some(sanitizer.into());
        self
    }

    /// Replace the console and rotating-file log destinations
    pub fn logger(mut self, logger: CallLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Open the error log up front so a bad location fails at startup
    pub fn build(self) -> Result<ErrorCatcher> {
        let config = self.config;
        config.validate()?;

        let sanitizer = match self.sanitizer {
            Some(sanitizer) => sanitizer,
            None => config.pattern_sanitizer()?,
        };

        let logger = match self.logger {
            Some(logger) => logger,
            None => {
                let mut builder = CallLogger::builder().level(LevelFilter::ERROR);
                if config.log_to_file {
                    let writer = RotatingFileWriter::new(
                        &config.error_log_file,
                        config.max_bytes,
                        config.backup_count,
                    )?;
                    builder = builder.file(writer);
                }
                if config.log_to_console {
                    builder = builder.console();
                }
                builder.build()
            }
        };

        tracing::debug!(
            calltrace.event = "error_catcher_initialized",
            error_log_file = %config.error_log_file.display(),
            log_to_file = config.log_to_file,
            log_to_console = config.log_to_console,
            "Error catcher initialized"
        );

        Ok(ErrorCatcher {
            inner: Arc::new(CatcherInner {
                config,
                logger,
                sanitizer,
            }),
        })
    }
}
