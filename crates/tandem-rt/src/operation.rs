// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Operations and the invocation boundary.
//!
//! An operation is a zero-argument computation run at most once. Any
//! `FnOnce() -> impl Future<Output = Result<V, E>>` qualifies; `from_fn`
//! adapts a synchronous closure and `boxed` erases the type so a batch can
//! mix different operations.

use std::future::Future;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};

use futures::future::{self, LocalBoxFuture, Ready};
use futures::FutureExt;
use indexmap::IndexMap;

use crate::error::InvariantViolation;
use crate::outcome::{Failure, Outcome, PanicPayload};

/// A deferred computation producing `Result<V, E>`.
pub trait Operation<V, E>: 'static {
    type Future: Future<Output = Result<V, E>> + 'static;

    fn call(self) -> Self::Future;
}

impl<V, E, F, Fut> Operation<V, E> for F
where
    F: FnOnce() -> Fut + 'static,
    Fut: Future<Output = Result<V, E>> + 'static,
{
    type Future = Fut;

    fn call(self) -> Fut {
        self()
    }
}

/// Type-erased operation.
pub type BoxOperation<V, E> = Box<dyn FnOnce() -> LocalBoxFuture<'static, Result<V, E>>>;

/// Erase an operation's concrete type.
pub fn boxed<V, E, O>(op: O) -> BoxOperation<V, E>
where
    O: Operation<V, E>,
    V: 'static,
    E: 'static,
{
    Box::new(move || op.call().boxed_local())
}

/// Operation that runs a synchronous closure when invoked.
///
/// The closure runs on the operation's own turn, never at construction.
pub fn from_fn<V, E, F>(f: F) -> impl FnOnce() -> Ready<Result<V, E>> + 'static
where
    F: FnOnce() -> Result<V, E> + 'static,
{
    move || future::ready(f())
}

/// Collect key/operation pairs in insertion order. A repeated key replaces
/// the earlier operation but keeps its position.
pub(crate) fn registry<K, O, I>(operations: I) -> IndexMap<K, O>
where
    K: Hash + Eq,
    I: IntoIterator<Item = (K, O)>,
{
    operations.into_iter().collect()
}

/// Run an operation to completion, capturing errors and panics.
///
/// Panics are caught both while building the future and on every poll.
/// An `InvariantViolation` payload is re-raised: it is a defect in the
/// runtime, not an operation failure.
pub(crate) async fn invoke<V, E, O>(op: O) -> Outcome<V, Failure<E>>
where
    O: Operation<V, E>,
{
    let fut = match panic::catch_unwind(AssertUnwindSafe(|| op.call())) {
        Ok(fut) => fut,
        Err(payload) => return caught(payload),
    };
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Outcome::Ok(value),
        Ok(Err(err)) => Outcome::Err(Failure::Error(err)),
        Err(payload) => caught(payload),
    }
}

fn caught<V, E>(payload: Box<dyn std::any::Any + Send>) -> Outcome<V, Failure<E>> {
    if payload.is::<InvariantViolation>() {
        panic::resume_unwind(payload);
    }
    Outcome::Err(Failure::Panic(PanicPayload::new(payload)))
}
