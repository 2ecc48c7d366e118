// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Captured operation results.
//!
//! `Outcome` tags a finished operation as success or failure without
//! unwinding. `Failure` is the failure payload the batch primitives
//! produce: either the operation's own error or the payload of a panic
//! caught at the invocation boundary.

use std::any::Any;
use std::fmt;

/// Success or failure of one operation.
///
/// Built exactly once, when the operation finishes, and never mutated
/// afterwards. Callers check the variant before reaching for the payload.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome<T, E> {
    Ok(T),
    Err(E),
}

impl<T, E> Outcome<T, E> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Outcome::Err(_))
    }

    /// Borrow the payload, keeping the tag.
    pub fn as_ref(&self) -> Outcome<&T, &E> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(v),
            Outcome::Err(e) => Outcome::Err(e),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(v) => Some(v),
            Outcome::Err(_) => None,
        }
    }

    pub fn err(self) -> Option<E> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Err(e) => Some(e),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U, E> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(f(v)),
            Outcome::Err(e) => Outcome::Err(e),
        }
    }

    pub fn map_err<G, F: FnOnce(E) -> G>(self, f: F) -> Outcome<T, G> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(v),
            Outcome::Err(e) => Outcome::Err(f(e)),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        self.into()
    }
}

impl<T> Outcome<T, T> {
    /// Payload regardless of variant, for outcomes whose sides share a type.
    pub fn into_value(self) -> T {
        match self {
            Outcome::Ok(v) | Outcome::Err(v) => v,
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Outcome::Ok(v),
            Err(e) => Outcome::Err(e),
        }
    }
}

impl<T, E> From<Outcome<T, E>> for Result<T, E> {
    fn from(outcome: Outcome<T, E>) -> Self {
        match outcome {
            Outcome::Ok(v) => Ok(v),
            Outcome::Err(e) => Err(e),
        }
    }
}

/// Why an operation did not produce a value.
#[derive(Debug, PartialEq, Eq)]
pub enum Failure<E> {
    /// The operation returned `Err`.
    Error(E),
    /// The operation panicked; holds the caught payload.
    Panic(PanicPayload),
}

impl<E> Failure<E> {
    pub fn is_panic(&self) -> bool {
        matches!(self, Failure::Panic(_))
    }

    /// The operation's own error, if it returned one.
    pub fn error(&self) -> Option<&E> {
        match self {
            Failure::Error(e) => Some(e),
            Failure::Panic(_) => None,
        }
    }

    /// The caught panic, if the operation panicked.
    pub fn panic(&self) -> Option<&PanicPayload> {
        match self {
            Failure::Error(_) => None,
            Failure::Panic(p) => Some(p),
        }
    }
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Error(e) => write!(f, "{}", e),
            Failure::Panic(p) => write!(f, "operation panicked: {}", p.message()),
        }
    }
}

impl<E> std::error::Error for Failure<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Failure::Error(e) => Some(e),
            Failure::Panic(_) => None,
        }
    }
}

/// Payload of a panic caught at the invocation boundary.
///
/// The original value is kept as-is and can be downcast or re-raised.
/// Two payloads compare equal when their messages do.
pub struct PanicPayload {
    message: String,
    payload: Box<dyn Any + Send>,
}

impl PanicPayload {
    pub fn new(payload: Box<dyn Any + Send>) -> Self {
        Self {
            message: panic_message(&*payload),
            payload,
        }
    }

    /// Text of `panic!` payloads, a placeholder for anything else.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }

    /// The payload exactly as it was caught.
    pub fn into_panic(self) -> Box<dyn Any + Send> {
        self.payload
    }

    /// Continue unwinding with the original payload.
    pub fn resume(self) -> ! {
        std::panic::resume_unwind(self.payload)
    }
}

impl From<String> for PanicPayload {
    fn from(message: String) -> Self {
        Self::new(Box::new(message))
    }
}

impl From<&str> for PanicPayload {
    fn from(message: &str) -> Self {
        Self::from(message.to_string())
    }
}

impl PartialEq for PanicPayload {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
    }
}

impl Eq for PanicPayload {}

impl fmt::Debug for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.message)
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
