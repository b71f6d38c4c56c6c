//! Timing and resource-accounting wrapper

use crate::{
    args::{CallArgs, Loggable},
    config::TimerConfig,
    correlation::CallContext,
    failure::{CancelGuard, Failure},
    logger::CallLogger,
    metrics::{CsvMetricsSink, MetricsRow, MetricsSink, MetricsUtil},
    resources::{ProcessSampler, ResourceSample, ResourceSampler, ResourceUsage},
    rotation::RotatingFileWriter,
    sanitization::Sanitizer,
    Result,
};
use futures::FutureExt;
use std::any::Any;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Wraps units of work to measure elapsed time and resource deltas.
///
/// Each successful call produces one info entry in the structured log and one
/// row in the metrics table. A failing call produces one error entry and no
/// row, and the failure is handed back to the caller untouched.
///
/// Instrumentation is best-effort: a metrics row that cannot be written is
/// reported through `tracing` and the `calltrace.sink.errors` counter, and the
/// wrapped unit's result is still returned.
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    config: TimerConfig,
    logger: CallLogger,
    metrics: Option<Arc<dyn MetricsSink>>,
    sampler: Option<Arc<dyn ResourceSampler>>,
    sanitizer: Sanitizer,
}

impl Timer {
    /// Build a timer writing to the files named by `config`
    pub fn new(config: TimerConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: TimerConfig) -> TimerBuilder {
        TimerBuilder {
            config,
            sanitizer: None,
            sampler: None,
            metrics: None,
            logger: None,
        }
    }

    pub fn config(&self) -> &TimerConfig {
        &self.inner.config
    }

    /// Run a fallible unit under measurement
    pub fn call<T, E, F>(&self, function: &str, args: CallArgs, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: fmt::Display + fmt::Debug,
    {
        let context = CallContext::new(function);
        let start = self.sample();

        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        let elapsed = context.elapsed();

        self.finish(&context, elapsed, start, &args, outcome)
    }

    /// Run an infallible unit under measurement
    pub fn time<T, F>(&self, function: &str, args: CallArgs, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        match self.call(function, args, || Ok::<T, Infallible>(f())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Run an async unit under measurement.
    ///
    /// Dropping the returned future before it completes logs the call as cancelled.
    pub async fn call_async<T, E, Fut>(
        &self,
        function: &str,
        args: CallArgs,
        future: Fut,
    ) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display + fmt::Debug,
    {
        let context = CallContext::new(function);
        let start = self.sample();

        let mut guard = CancelGuard::new(&self.inner.logger, &context, &self.inner.sanitizer);
        let outcome = AssertUnwindSafe(future).catch_unwind().await;
        let elapsed = context.elapsed();
        guard.disarm();

        self.finish(&context, elapsed, start, &args, outcome)
    }

    /// Turn `f` into a function with the same signature that is timed on every call
    pub fn wrap<A, T, E, F>(
        &self,
        function: impl Into<String>,
        f: F,
    ) -> impl Fn(A) -> std::result::Result<T, E>
    where
        A: Loggable,
        F: Fn(A) -> std::result::Result<T, E>,
        E: fmt::Display + fmt::Debug,
    {
        let timer = self.clone();
        let function = function.into();

        move |input: A| {
            let args = input.call_args();
            timer.call(&function, args, || f(input))
        }
    }

    /// [`Timer::wrap`] for functions that cannot fail
    pub fn wrap_infallible<A, T, F>(&self, function: impl Into<String>, f: F) -> impl Fn(A) -> T
    where
        A: Loggable,
        F: Fn(A) -> T,
    {
        let timer = self.clone();
        let function = function.into();

        move |input: A| {
            let args = input.call_args();
            timer.time(&function, args, || f(input))
        }
    }

    fn sample(&self) -> Option<ResourceSample> {
        self.inner.sampler.as_ref().and_then(|sampler| sampler.sample())
    }

    fn finish<T, E>(
        &self,
        context: &CallContext,
        elapsed: Duration,
        start: Option<ResourceSample>,
        args: &CallArgs,
        outcome: std::result::Result<std::result::Result<T, E>, Box<dyn Any + Send>>,
    ) -> std::result::Result<T, E>
    where
        E: fmt::Display + fmt::Debug,
    {
        match outcome {
            Ok(Ok(value)) => {
                self.record_success(context, elapsed, start, args);
                Ok(value)
            }
            Ok(Err(error)) => {
                Failure::from_error(&error).report(
                    &self.inner.logger,
                    context,
                    &self.inner.sanitizer,
                );
                Err(error)
            }
            Err(payload) => {
                Failure::from_panic(payload.as_ref()).report(
                    &self.inner.logger,
                    context,
                    &self.inner.sanitizer,
                );
                panic::resume_unwind(payload)
            }
        }
    }

    fn record_success(
        &self,
        context: &CallContext,
        elapsed: Duration,
        start: Option<ResourceSample>,
        args: &CallArgs,
    ) {
        // A failed sample on either side leaves the resource fields absent
        let usage = start.and_then(|start| {
            self.sample()
                .map(|end| ResourceUsage::between(&start, &end))
        });

        let message = summary_message(&context.function, elapsed, usage.as_ref());
        self.inner.logger.info(context, &message);
        MetricsUtil::record_call(&context.function, elapsed);

        if let Some(sink) = &self.inner.metrics {
            let rendered = args.render(&self.inner.sanitizer, self.inner.config.max_arg_length);
            let arguments = if self.inner.config.json_arguments {
                rendered.to_json().to_string()
            } else {
                rendered.summary()
            };
            let row = MetricsRow::new(context, elapsed, usage, arguments, message);

            if let Err(e) = sink.append(&row) {
                MetricsUtil::record_sink_error("metrics_table");
                tracing::warn!(
                    calltrace.event = "metrics_write_failed",
                    function = %context.function,
                    uuid = %context.correlation_id,
                    error = %e,
                    "Failed to append metrics row"
                );
            }
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("config", &self.inner.config)
            .field("metrics", &self.inner.metrics.is_some())
            .field("sampler", &self.inner.sampler.is_some())
            .finish()
    }
}

/// Human-readable summary of a successful call, elapsed time to four decimals
pub fn summary_message(function: &str, elapsed: Duration, usage: Option<&ResourceUsage>) -> String {
    let mut message = format!(
        "Function `{}` executed in {:.4} sec",
        function,
        elapsed.as_secs_f64()
    );

    if let Some(usage) = usage {
        message.push_str(&format!(
            ", CPU Time: {:.4} sec, Memory Change: {:.4} MB, Final Memory: {:.4} MB",
            usage.cpu_seconds, usage.memory_delta_mb, usage.final_memory_mb
        ));
    }

    message
}

/// Configures the collaborators of a [`Timer`]
pub struct TimerBuilder {
    config: TimerConfig,
    sanitizer: Option<Sanitizer>,
    sampler: Option<Arc<dyn ResourceSampler>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    logger: Option<CallLogger>,
}

impl TimerBuilder {
    /// Redaction applied to every rendered argument and error message
    pub fn sanitizer(mut self, sanitizer: impl Into<Sanitizer>) -> Self {
        self.sanitizer = Some(sanitizer.into());
        self
    }

    /// Replace the procfs resource sampler
    pub fn sampler(mut self, sampler: impl ResourceSampler + 'static) -> Self {
        self.sampler = Some(Arc::new(sampler));
        self
    }

    /// Replace the CSV metrics table
    pub fn metrics_sink(mut self, sink: impl MetricsSink + 'static) -> Self {
        self.metrics = Some(Arc::new(sink));
        self
    }

    /// Replace the console and rotating-file log destinations
    pub fn logger(mut self, logger: CallLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Create every sink up front so a bad location fails here
    pub fn build(self) -> Result<Timer> {
        let config = self.config;
        config.validate()?;

        let sanitizer = match self.sanitizer {
            Some(sanitizer) => sanitizer,
            None => config.pattern_sanitizer()?,
        };

        let logger = match self.logger {
            Some(logger) => logger,
            None => {
                let writer = RotatingFileWriter::new(
                    config.log_file_path(),
                    config.max_bytes,
                    config.backup_count,
                )?;
                let mut builder = CallLogger::builder();
                if config.log_to_console {
                    builder = builder.console();
                }
                builder.file(writer).build()
            }
        };

        let metrics = match self.metrics {
            Some(sink) if config.log_to_file => Some(sink),
            Some(_) => None,
            None if config.log_to_file => Some(Arc::new(CsvMetricsSink::new(
                config.results_file_path(),
            )?) as Arc<dyn MetricsSink>),
            None => None,
        };

        let sampler = if config.track_resources {
            Some(
                self.sampler
                    .unwrap_or_else(|| Arc::new(ProcessSampler::new())),
            )
        } else {
            None
        };

        tracing::debug!(
            calltrace.event = "timer_initialized",
            log_file = %config.log_file_path().display(),
            metrics_enabled = metrics.is_some(),
            track_resources = sampler.is_some(),
            "Timer initialized"
        );

        Ok(Timer {
            inner: Arc::new(TimerInner {
                config,
                logger,
                metrics,
                sampler,
                sanitizer,
            }),
        })
    }
}
