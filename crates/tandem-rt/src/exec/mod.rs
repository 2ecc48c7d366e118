// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Single-threaded cooperative executor.
//!
//! One task runs at a time and gives up control only at `.await` points.
//! Everything lives on the thread that created the `Executor`.
//!
//! Components:
//! - `task`     : task record, state machine, waker
//! - `queue`    : FIFO ready queue shared with wakers
//! - `timer`    : clock (real or virtual) and timer heap
//! - `executor` : `Executor` / `Handle`, the turn loop
//! - `join`     : `JoinHandle` for spawned tasks

mod executor;
mod join;
mod queue;
mod task;
mod timer;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pub use executor::{Executor, ExecutorStats, Handle};
pub use join::JoinHandle;
pub use task::TaskId;
pub use timer::{CallbackId, Sleep};

/// Boxed task future as handed to a scheduler.
pub type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

/// Something that can queue a task to run on a later turn.
///
/// The batch primitives only need this: they never poll operations
/// inline, they hand them over and wait on a `Continuation`.
pub trait Schedule {
    fn schedule(&self, task: LocalTask);
}

impl<S: Schedule + ?Sized> Schedule for &S {
    fn schedule(&self, task: LocalTask) {
        (**self).schedule(task)
    }
}

/// Reschedule the current task behind everything already queued.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by `yield_now`.
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
