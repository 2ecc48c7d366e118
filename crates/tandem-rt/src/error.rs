// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Runtime error types.

use std::fmt;

use thiserror::Error;

/// Errors from driving the executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The root future is pending but nothing is left that could wake it.
    #[error("executor stalled: root future pending with {pending_tasks} parked task(s) and no timers")]
    Stalled { pending_tasks: usize },

    /// `block_on` or `run` was called from inside a task on the same executor.
    #[error("executor is already being driven on this thread")]
    Reentrant,
}

/// Errors from reading executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown clock mode `{0}` (expected `real` or `virtual`)")]
    UnknownClock(String),
}

/// Error returned by a `JoinHandle` when the task failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Why `Continuation::resume` refused a value. The value is handed back.
#[derive(Debug, PartialEq, Eq)]
pub enum ResumeError<T> {
    /// A previous value has not been taken yet, or queued deliveries are
    /// waiting for the slot.
    Occupied(T),
    /// The receiving side is gone.
    Closed(T),
}

impl<T> ResumeError<T> {
    pub fn into_inner(self) -> T {
        match self {
            ResumeError::Occupied(v) | ResumeError::Closed(v) => v,
        }
    }
}

impl<T> fmt::Display for ResumeError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumeError::Occupied(_) => write!(f, "continuation already holds an undelivered value"),
            ResumeError::Closed(_) => write!(f, "continuation is closed"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for ResumeError<T> {}

/// Panic payload for broken internal invariants.
///
/// Operation failures never surface this way; they are captured into
/// `Outcome::Err`. Catch with `catch_unwind` and `downcast_ref` to tell
/// the two apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    pub message: String,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tandem invariant violated: {}", self.message)
    }
}

impl std::error::Error for InvariantViolation {}

/// Log and abort the current task with an `InvariantViolation` payload.
#[track_caller]
pub(crate) fn invariant_violated(message: impl Into<String>) -> ! {
    let violation = InvariantViolation {
        message: message.into(),
    };
    tracing::error!(
        location = %std::panic::Location::caller(),
        "{}",
        violation
    );
    std::panic::panic_any(violation)
}
