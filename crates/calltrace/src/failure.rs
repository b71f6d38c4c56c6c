//! Failure reporting shared by both wrappers

use crate::{
    correlation::CallContext, logger::CallLogger, metrics::MetricsUtil, sanitization::Sanitizer,
};
use std::any::Any;
use std::fmt;

/// What a wrapped unit signalled instead of a value
pub(crate) enum Failure<'a> {
    Error { message: String, trace: Option<String> },
    Panic(&'a (dyn Any + Send)),
    Cancelled,
}

impl<'a> Failure<'a> {
    pub(crate) fn from_error<E: fmt::Display + fmt::Debug>(error: &E) -> Self {
        let message = error.to_string();
        let debug = format!("{:?}", error);

        // Debug adds nothing when it is the message, possibly quoted
        let trace = if debug == message || debug == format!("{:?}", message) {
            None
        } else {
            Some(debug)
        };

        Failure::Error { message, trace }
    }

    pub(crate) fn from_panic(payload: &'a (dyn Any + Send)) -> Self {
        Failure::Panic(payload)
    }

    /// Log the failure once, redacted, and count it
    pub(crate) fn report(&self, logger: &CallLogger, context: &CallContext, sanitizer: &Sanitizer) {
        let function = &context.function;

        match self {
            Failure::Error { message, trace } => {
                let message = format!(
                    "Function `{}` raised an exception: {}",
                    function,
                    sanitizer.apply(message)
                );
                let trace = trace.as_deref().map(|trace| sanitizer.apply(trace));
                logger.error(context, &message, trace.as_deref());
            }
            Failure::Panic(payload) => {
                let message = format!(
                    "Function `{}` panicked: {}",
                    function,
                    sanitizer.apply(&panic_message(*payload))
                );
                logger.error(context, &message, None);
            }
            Failure::Cancelled => {
                let message = format!("Function `{}` was cancelled before completion", function);
                logger.error(context, &message, None);
            }
        }

        MetricsUtil::record_failure(function);
    }
}

/// Text carried by a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Reports cancellation if dropped while still armed.
///
/// Lives across the `.await` of a wrapped future; dropping the outer future
/// drops the guard.
pub(crate) struct CancelGuard<'a> {
    logger: &'a CallLogger,
    context: &'a CallContext,
    sanitizer: &'a Sanitizer,
    armed: bool,
}

impl<'a> CancelGuard<'a> {
    pub(crate) fn new(logger: &'a CallLogger, context: &'a CallContext, sanitizer: &'a Sanitizer) -> Self {
        Self {
            logger,
            context,
            sanitizer,
            armed: true,
        }
    }

    /// The future ran to completion (or panicked); nothing to report on drop
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            Failure::Cancelled.report(self.logger, self.context, self.sanitizer);
        }
    }
}
