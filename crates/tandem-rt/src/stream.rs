// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Completion-ordered multiplexer.
//!
//! `stream` schedules every operation as its own task and funnels the
//! results back through one `Continuation`. The returned `Completions`
//! parks on that continuation once per pending result and yields pairs
//! in the order the operations finished.

use std::fmt;
use std::hash::Hash;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{FusedStream, Stream};
use futures::FutureExt;
use tracing::debug;

use crate::continuation::{Continuation, Suspend};
use crate::exec::Schedule;
use crate::operation::{invoke, registry, Operation};
use crate::outcome::{Failure, Outcome};

type Item<K, V, E> = (K, Outcome<V, Failure<E>>);

/// Start every operation and return their results in completion order.
///
/// All operations are queued on `scheduler` before this returns; none runs
/// inline. The stream ends after exactly one item per distinct key.
/// Dropping it early does not stop the operations; their results are
/// discarded.
pub fn stream<S, K, V, E, O, I>(scheduler: &S, operations: I) -> Completions<K, V, E>
where
    S: Schedule + ?Sized,
    K: Hash + Eq + 'static,
    V: 'static,
    E: 'static,
    O: Operation<V, E>,
    I: IntoIterator<Item = (K, O)>,
{
    let continuation = Continuation::new();
    let operations = registry(operations);
    let remaining = operations.len();
    if remaining > 0 {
        debug!(operations = remaining, "stream started");
    }

    for (key, op) in operations {
        let continuation = continuation.clone();
        scheduler.schedule(Box::pin(async move {
            let outcome = invoke(op).await;
            if continuation.deliver((key, outcome)).await.is_err() {
                debug!("stream dropped, discarding result");
            }
        }));
    }

    Completions {
        continuation,
        remaining,
        waiting: None,
    }
}

/// Stream returned by `stream`.
#[must_use = "streams do nothing unless polled"]
pub struct Completions<K, V, E> {
    continuation: Continuation<Item<K, V, E>>,
    remaining: usize,
    waiting: Option<Suspend<Item<K, V, E>>>,
}

impl<K, V, E> Completions<K, V, E> {
    /// Results not yet yielded.
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl<K, V, E> Stream for Completions<K, V, E> {
    type Item = Item<K, V, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.remaining == 0 {
            return Poll::Ready(None);
        }
        let continuation = &this.continuation;
        let waiting = this.waiting.get_or_insert_with(|| continuation.suspend());
        let item = futures::ready!(waiting.poll_unpin(cx));
        this.waiting = None;
        this.remaining -= 1;
        if this.remaining == 0 {
            debug!("stream finished");
        }
        Poll::Ready(Some(item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, E> FusedStream for Completions<K, V, E> {
    fn is_terminated(&self) -> bool {
        self.remaining == 0
    }
}

impl<K, V, E> Drop for Completions<K, V, E> {
    fn drop(&mut self) {
        self.waiting = None;
        if self.remaining > 0 {
            debug!(remaining = self.remaining, "stream dropped before exhaustion");
            self.continuation.close();
        }
    }
}

impl<K, V, E> fmt::Debug for Completions<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completions")
            .field("remaining", &self.remaining)
            .field("continuation", &self.continuation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClockMode, ExecutorConfig};
    use crate::exec::{Executor, Handle};
    use crate::operation::{boxed, from_fn, BoxOperation};
    use futures::StreamExt;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    fn executor() -> Executor {
        Executor::with_config(ExecutorConfig::default().with_clock(ClockMode::Virtual))
    }

    fn after(handle: &Handle, millis: u64, value: &'static str) -> BoxOperation<&'static str, String> {
        let handle = handle.clone();
        boxed(move || async move {
            handle.sleep(Duration::from_millis(millis)).await;
            Ok(value)
        })
    }

    #[test]
    fn yields_in_completion_order() {
        let exec = executor();
        let h = exec.handle();
        let ops = vec![(1, after(&h, 300, "A")), (2, after(&h, 100, "B"))];
        let items: Vec<_> = exec.block_on(stream(&h, ops).collect()).unwrap();
        assert_eq!(items, vec![(2, Outcome::Ok("B")), (1, Outcome::Ok("A"))]);
        assert_eq!(h.elapsed(), Duration::from_millis(300));
    }

    #[test]
    fn empty_input_never_parks() {
        let exec = executor();
        let ops: Vec<(u8, BoxOperation<(), ()>)> = Vec::new();
        let mut s = stream(&exec, ops);
        assert!(s.is_terminated());
        assert_eq!(s.size_hint(), (0, Some(0)));
        assert!(exec.block_on(s.next()).unwrap().is_none());
        assert_eq!(exec.stats().root_polls, 1);
        assert_eq!(exec.stats().tasks_spawned, 0);
    }

    #[test]
    fn nothing_runs_until_the_executor_turns() {
        let exec = executor();
        let ran = Rc::new(Cell::new(0));
        let ops = (0..3).map(|i| {
            let ran = ran.clone();
            (
                i,
                from_fn(move || {
                    ran.set(ran.get() + 1);
                    Ok::<_, ()>(i)
                }),
            )
        });
        let s = stream(&exec, ops);
        assert_eq!(ran.get(), 0);
        assert_eq!(exec.handle().pending_tasks(), 3);
        let items: Vec<_> = exec.block_on(s.collect()).unwrap();
        assert_eq!(ran.get(), 3);
        // Same turn, FIFO.
        let keys: Vec<_> = items.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![0, 1, 2]);
    }

    #[test]
    fn consumer_resumes_once_per_result() {
        let exec = executor();
        let h = exec.handle();
        let ops = (0..5).map(|i| (i, from_fn(move || Ok::<_, ()>(i))));
        let count = exec
            .block_on(async move { stream(&h, ops).count().await })
            .unwrap();
        assert_eq!(count, 5);
        assert_eq!(exec.stats().root_polls, 6);
    }

    #[test]
    fn failures_are_items() {
        let exec = executor();
        let ops: Vec<(&str, BoxOperation<u8, &'static str>)> = vec![
            ("ok", boxed(from_fn(|| Ok::<u8, &'static str>(1)))),
            ("bad", boxed(from_fn(|| Err::<u8, &'static str>("boom")))),
            ("panic", boxed(from_fn(|| -> Result<u8, &'static str> { panic!("kaput") }))),
        ];
        let items: Vec<_> = exec.block_on(stream(&exec, ops).collect()).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], ("ok", Outcome::Ok(1)));
        assert_eq!(items[1], ("bad", Outcome::Err(Failure::Error("boom"))));
        assert_eq!(items[2], ("panic", Outcome::Err(Failure::Panic("kaput".into()))));
    }

    #[test]
    fn early_drop_lets_operations_finish() {
        let exec = executor();
        let h = exec.handle();
        let finished = Rc::new(Cell::new(0));
        let ops = (1..=3u64).map(|i| {
            let h = h.clone();
            let finished = finished.clone();
            (i, move || async move {
                h.sleep(Duration::from_millis(i * 10)).await;
                finished.set(finished.get() + 1);
                Ok::<_, ()>(i)
            })
        });
        let first = exec
            .block_on(async {
                let mut s = stream(&h, ops);
                s.next().await
            })
            .unwrap();
        assert_eq!(first.map(|(k, _)| k), Some(1));
        exec.run().unwrap();
        assert_eq!(finished.get(), 3);
        assert_eq!(h.pending_tasks(), 0);
    }

    #[test]
    fn duplicate_keys_yield_once() {
        let exec = executor();
        let ops: Vec<(&str, BoxOperation<u8, ()>)> = vec![
            ("k", boxed(from_fn(|| Ok(1)))),
            ("k", boxed(from_fn(|| Ok(2)))),
        ];
        let items: Vec<_> = exec.block_on(stream(&exec, ops).collect()).unwrap();
        assert_eq!(items, vec![("k", Outcome::Ok(2))]);
    }
}
