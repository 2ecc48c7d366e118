// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Key-ordered barrier collector.
//!
//! `concurrently` schedules every operation, then parks its caller exactly
//! once. Each task records its outcome in a pre-sized slot and counts the
//! batch down; the last one releases the caller.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::FutureExt;
use indexmap::IndexMap;
use tracing::debug;

use crate::continuation::{Continuation, Suspend};
use crate::error::invariant_violated;
use crate::exec::Schedule;
use crate::operation::{invoke, registry, Operation};
use crate::outcome::{Failure, Outcome};

/// Outcomes in key order.
pub type Results<K, V, E> = IndexMap<K, Outcome<V, Failure<E>>>;

/// Start every operation and resolve once all have finished.
///
/// The operations are queued on `scheduler` before this returns. The map
/// has one entry per distinct key, in the order keys were first supplied,
/// whatever order the operations finished in.
pub fn concurrently<S, K, V, E, O, I>(scheduler: &S, operations: I) -> Concurrently<K, V, E>
where
    S: Schedule + ?Sized,
    K: Hash + Eq + 'static,
    V: 'static,
    E: 'static,
    O: Operation<V, E>,
    I: IntoIterator<Item = (K, O)>,
{
    let operations = registry(operations);
    if operations.is_empty() {
        return Concurrently {
            barrier: None,
            waiting: None,
            done: false,
        };
    }
    debug!(operations = operations.len(), "barrier started");

    let mut slots = IndexMap::with_capacity(operations.len());
    let mut ops = Vec::with_capacity(operations.len());
    for (key, op) in operations {
        slots.insert(key, None);
        ops.push(op);
    }
    let barrier = Rc::new(Barrier::new(slots));

    for (index, op) in ops.into_iter().enumerate() {
        let barrier = barrier.clone();
        scheduler.schedule(Box::pin(async move {
            let outcome = invoke(op).await;
            barrier.record(index, outcome);
            barrier.complete_one();
        }));
    }

    Concurrently {
        barrier: Some(barrier),
        waiting: None,
        done: false,
    }
}

/// Shared state of one `concurrently` call.
struct Barrier<K, V, E> {
    results: RefCell<IndexMap<K, Option<Outcome<V, Failure<E>>>>>,
    pending: Cell<usize>,
    release: Continuation<()>,
}

impl<K: Hash + Eq, V, E> Barrier<K, V, E> {
    fn new(slots: IndexMap<K, Option<Outcome<V, Failure<E>>>>) -> Self {
        let pending = slots.len();
        Self {
            results: RefCell::new(slots),
            pending: Cell::new(pending),
            release: Continuation::new(),
        }
    }

    /// Fill slot `index`. Each slot is filled exactly once.
    fn record(&self, index: usize, outcome: Outcome<V, Failure<E>>) {
        let mut results = self.results.borrow_mut();
        match results.get_index_mut(index) {
            Some((_, slot)) if slot.is_none() => *slot = Some(outcome),
            Some(_) => invariant_violated(format!("result slot {} filled twice", index)),
            None => invariant_violated(format!("result slot {} out of range", index)),
        }
    }

    /// Count one completion; the last one releases the waiting caller.
    fn complete_one(&self) {
        let left = match self.pending.get().checked_sub(1) {
            Some(left) => left,
            None => invariant_violated("pending count decremented below zero"),
        };
        self.pending.set(left);
        if left == 0 && self.release.resume(()).is_err() {
            invariant_violated("barrier released more than once");
        }
    }

    /// Hand out the finished map. Every slot must be filled by now.
    fn take_results(&self) -> Results<K, V, E> {
        let results = self.results.take();
        let pending = self.pending.get();
        if pending != 0 {
            invariant_violated(format!("barrier released with {} operation(s) pending", pending));
        }
        results
            .into_iter()
            .enumerate()
            .map(|(index, (key, slot))| match slot {
                Some(outcome) => (key, outcome),
                None => invariant_violated(format!("result slot {} unfilled at release", index)),
            })
            .collect()
    }
}

/// Future returned by `concurrently`.
#[must_use = "futures do nothing unless awaited"]
pub struct Concurrently<K, V, E> {
    /// `None` for an empty batch, or once resolved.
    barrier: Option<Rc<Barrier<K, V, E>>>,
    waiting: Option<Suspend<()>>,
    done: bool,
}

impl<K, V, E> Concurrently<K, V, E> {
    /// Operations that have not finished yet.
    pub fn pending(&self) -> usize {
        self.barrier.as_ref().map_or(0, |b| b.pending.get())
    }
}

impl<K: Hash + Eq, V, E> Future for Concurrently<K, V, E> {
    type Output = Results<K, V, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if this.done {
            panic!("`Concurrently` polled after completion");
        }
        let Some(barrier) = &this.barrier else {
            this.done = true;
            return Poll::Ready(IndexMap::new());
        };
        let waiting = this.waiting.get_or_insert_with(|| barrier.release.suspend());
        futures::ready!(waiting.poll_unpin(cx));
        this.waiting = None;

        let results = barrier.take_results();
        this.barrier = None;
        this.done = true;
        debug!(results = results.len(), "barrier released");
        Poll::Ready(results)
    }
}

impl<K, V, E> fmt::Debug for Concurrently<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Concurrently")
            .field("pending", &self.pending())
            .finish()
    }
}
