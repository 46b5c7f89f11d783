//! Reporting of failed assertions.
//!
//! Every failure raised by [`ResourceAssertions`](crate::assertions::ResourceAssertions)
//! is handed to a [`Reporter`] before it is returned to the caller. This keeps
//! the polling logic independent of any particular test framework.
use std::{
    error::Error,
    sync::{Mutex, PoisonError},
};

use crate::assertions;

/// Receives every failed assertion.
pub trait Reporter: Send + Sync {
    fn report(&self, failure: &assertions::Error);
}

/// Fails the current test by panicking with the full error chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct PanicReporter;

impl Reporter for PanicReporter {
    #[expect(clippy::panic, reason = "a failed assertion fails the test")]
    fn report(&self, failure: &assertions::Error) {
        panic!("{}", error_chain(failure));
    }
}

/// Emits failures as `ERROR` events and lets the caller handle the returned
/// error.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, failure: &assertions::Error) {
        tracing::error!(
            error = failure as &dyn std::error::Error,
            "assertion failed"
        );
    }
}

/// Collects the rendered error chain of every failure.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    failures: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all failures reported so far, oldest first.
    pub fn failures(&self) -> Vec<String> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, failure: &assertions::Error) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error_chain(failure));
    }
}

impl<R> Reporter for std::sync::Arc<R>
where
    R: Reporter + ?Sized,
{
    fn report(&self, failure: &assertions::Error) {
        (**self).report(failure);
    }
}

/// Renders `err` followed by all of its sources, separated by `": "`.
pub fn error_chain(err: &dyn Error) -> String {
    let mut buf = err.to_string();
    let mut source = err.source();

    while let Some(err) = source {
        buf.push_str(": ");
        buf.push_str(&err.to_string());
        source = err.source();
    }

    buf
}
