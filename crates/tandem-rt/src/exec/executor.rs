// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The executor and its turn loop.
//!
//! A turn polls every task that was queued when the turn started, in FIFO
//! order, then fires the timers that are due. When a turn does nothing the
//! clock moves to the next deadline. Deferred work therefore always runs
//! before timers that expire in the same turn.

use std::cell::{BorrowMutError, Cell, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{debug, trace, warn};

use crate::config::{ClockMode, ExecutorConfig};
use crate::error::{ConfigError, JoinError, RuntimeError};
use crate::outcome::panic_message;

use super::join::{JoinHandle, JoinState};
use super::queue::ReadyQueue;
use super::task::{task_waker, StateCell, Task, TaskId, TaskState};
use super::timer::{CallbackId, Clock, Fired, Sleep, TimerQueue};
use super::{LocalTask, Schedule};

/// Counters describing what the executor has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub tasks_spawned: u64,
    pub task_polls: u64,
    /// Polls of the future passed to `block_on`.
    pub root_polls: u64,
    pub timers_fired: u64,
    pub turns: u64,
}

/// State shared by the executor and every handle.
pub(crate) struct Shared {
    name: String,
    ready: ReadyQueue,
    tasks: RefCell<HashMap<TaskId, Task>>,
    next_id: Cell<u64>,
    timers: RefCell<TimerQueue>,
    clock: Clock,
    stats: Cell<ExecutorStats>,
    /// Set while `block_on` or `run` is on the stack.
    driving: Cell<bool>,
}

impl Shared {
    fn bump(&self, f: impl FnOnce(&mut ExecutorStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn spawn_task(&self, future: LocalTask) -> TaskId {
        let id = TaskId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let task = Task::new(id, future, &self.ready);
        self.tasks.borrow_mut().insert(id, task);
        self.ready.push(id);
        self.bump(|s| s.tasks_spawned += 1);
        trace!(executor = %self.name, task = %id, "spawned");
        id
    }

    /// Poll one task. Completed tasks are dropped; pending ones go back
    /// into the table before their state is parked.
    fn run_task(&self, id: TaskId) {
        let Some(mut task) = self.tasks.borrow_mut().remove(&id) else {
            return;
        };
        if task.state.get() == TaskState::Complete {
            return;
        }

        task.state.set(TaskState::Running);
        self.bump(|s| s.task_polls += 1);

        let mut cx = Context::from_waker(&task.waker);
        match task.future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                task.state.set(TaskState::Complete);
                trace!(executor = %self.name, task = %id, "complete");
                drop(task);
            }
            Poll::Pending => {
                let state = task.state.clone();
                self.tasks.borrow_mut().insert(id, task);
                state.park(id, &self.ready);
            }
        }
    }

    /// Fire every timer that is due and was registered before this call.
    fn fire_expired(&self) -> usize {
        let now = self.clock.now();
        let watermark = self.timers.borrow().watermark();
        let mut fired = 0;
        loop {
            let next = self.timers.borrow_mut().pop_expired(now, watermark);
            let Some(next) = next else {
                break;
            };
            fired += 1;
            self.bump(|s| s.timers_fired += 1);
            match next {
                Fired::Wake(waker) => waker.wake(),
                Fired::Callback(id, callback) => {
                    trace!(executor = %self.name, timer = %id, "callback");
                    (&mut *callback.borrow_mut())(id);
                }
            }
        }
        fired
    }

    /// Move the clock to the next timer. False when no timer is pending.
    fn wait_for_next_timer(&self) -> bool {
        let next = self.timers.borrow_mut().next_deadline();
        match next {
            Some(deadline) => {
                self.clock.advance_to(deadline);
                true
            }
            None => false,
        }
    }

    /// Drive turns until `poll_root` reports completion or nothing is left.
    /// Returns whether the root finished.
    fn drive(&self, poll_root: &mut dyn FnMut() -> bool) -> bool {
        loop {
            self.bump(|s| s.turns += 1);
            let mut progressed = false;

            let batch = self.ready.len();
            for _ in 0..batch {
                let Some(id) = self.ready.pop() else {
                    break;
                };
                progressed = true;
                if id == TaskId::ROOT {
                    if poll_root() {
                        return true;
                    }
                } else {
                    self.run_task(id);
                }
            }

            if self.fire_expired() > 0 {
                progressed = true;
            }
            if progressed || self.wait_for_next_timer() {
                continue;
            }
            return false;
        }
    }

    fn enter(&self) -> Result<DriveGuard<'_>, RuntimeError> {
        if self.driving.replace(true) {
            return Err(RuntimeError::Reentrant);
        }
        Ok(DriveGuard { driving: &self.driving })
    }

    /// Drop every task and timer. Futures are dropped after the tables
    /// are released, since their destructors may reach back in here.
    fn teardown(&self) {
        let tasks: Vec<Task> = self.tasks.borrow_mut().drain().map(|(_, t)| t).collect();
        let timers = std::mem::take(&mut *self.timers.borrow_mut());
        self.ready.clear();
        if !tasks.is_empty() {
            debug!(executor = %self.name, abandoned = tasks.len(), "dropping unfinished tasks");
        }
        drop(tasks);
        drop(timers);
    }
}

struct DriveGuard<'a> {
    driving: &'a Cell<bool>,
}

impl Drop for DriveGuard<'_> {
    fn drop(&mut self) {
        self.driving.set(false);
    }
}

/// Single-threaded cooperative executor.
///
/// Owns the task table, ready queue and timers. Dropping it abandons any
/// unfinished task.
pub struct Executor {
    handle: Handle,
}

impl Executor {
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        let shared = Shared {
            name: config.name,
            ready: ReadyQueue::new(),
            tasks: RefCell::new(HashMap::new()),
            // 0 is the root.
            next_id: Cell::new(1),
            timers: RefCell::new(TimerQueue::new()),
            clock: Clock::new(config.clock),
            stats: Cell::new(ExecutorStats::default()),
            driving: Cell::new(false),
        };
        Self {
            handle: Handle {
                shared: Rc::new(shared),
            },
        }
    }

    /// Executor configured from `TANDEM_CLOCK`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::with_config(ExecutorConfig::from_env()?))
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.handle.spawn(future)
    }

    pub fn stats(&self) -> ExecutorStats {
        self.handle.shared.stats.get()
    }

    /// Drive the executor until `future` completes.
    ///
    /// Tasks that are still queued or parked when the future finishes stay
    /// put; a later `block_on` or `run` picks them up. Fails with
    /// `Stalled` if the future is pending and nothing can wake it.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, RuntimeError> {
        let shared = &*self.handle.shared;
        let _guard = shared.enter()?;

        let mut future = pin!(future);
        let root = StateCell::new();
        let waker = task_waker(TaskId::ROOT, root.clone(), shared.ready.clone());
        shared.ready.push(TaskId::ROOT);

        let mut output = None;
        let finished = shared.drive(&mut || {
            if root.get() != TaskState::Ready {
                return false;
            }
            root.set(TaskState::Running);
            shared.bump(|s| s.root_polls += 1);
            let mut cx = Context::from_waker(&waker);
            match future.as_mut().poll(&mut cx) {
                Poll::Ready(value) => {
                    output = Some(value);
                    true
                }
                Poll::Pending => {
                    root.park(TaskId::ROOT, &shared.ready);
                    false
                }
            }
        });
        root.set(TaskState::Complete);

        match output {
            Some(value) if finished => Ok(value),
            _ => {
                let pending_tasks = shared.tasks.borrow().len();
                warn!(executor = %shared.name, pending_tasks, "root future can never complete");
                Err(RuntimeError::Stalled { pending_tasks })
            }
        }
    }

    /// Drive the executor until no task is ready and no timer is pending.
    pub fn run(&self) -> Result<(), RuntimeError> {
        let shared = &*self.handle.shared;
        let _guard = shared.enter()?;
        shared.drive(&mut || false);
        let parked = shared.tasks.borrow().len();
        if parked > 0 {
            debug!(executor = %shared.name, parked, "loop idle with parked tasks");
        }
        Ok(())
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.handle.shared.name)
            .field("clock", &self.handle.shared.clock.mode())
            .field("tasks", &self.handle.pending_tasks())
            .field("timers", &self.handle.pending_timers())
            .finish()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.handle.shared.teardown();
    }
}

/// Cheap, cloneable reference to an executor, usable from inside tasks.
#[derive(Clone)]
pub struct Handle {
    shared: Rc<Shared>,
}

impl Handle {
    /// Queue a future as a new task. Panics inside it are caught and
    /// reported through the `JoinHandle`; dropping the handle detaches.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let state = JoinState::shared();
        let slot = state.clone();
        let name = self.shared.name.clone();
        let task = async move {
            let result = AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .map_err(|payload| JoinError::Panicked(panic_message(&*payload)));
            if let Err(err) = &result {
                warn!(executor = %name, "{}", err);
            }
            JoinState::complete(&slot, result);
        };
        let id = self.shared.spawn_task(Box::pin(task));
        JoinHandle::new(id, state)
    }

    /// Run `f` on a later turn.
    pub fn defer<F: FnOnce() + 'static>(&self, f: F) {
        self.shared.spawn_task(Box::pin(async move { f() }));
    }

    /// Current executor time.
    pub fn now(&self) -> Instant {
        self.shared.clock.now()
    }

    /// Executor time since creation.
    pub fn elapsed(&self) -> Duration {
        self.shared.clock.elapsed()
    }

    pub fn clock_mode(&self) -> ClockMode {
        self.shared.clock.mode()
    }

    pub fn sleep(&self, duration: Duration) -> Sleep {
        Sleep::new(self.clone(), self.now() + duration)
    }

    pub fn sleep_until(&self, deadline: Instant) -> Sleep {
        Sleep::new(self.clone(), deadline)
    }

    /// Run `f` once after `duration`.
    pub fn delay<F: FnOnce() + 'static>(&self, duration: Duration, f: F) -> CallbackId {
        let mut f = Some(f);
        let deadline = self.now() + duration;
        self.shared.timers.borrow_mut().insert_callback(
            deadline,
            None,
            Box::new(move |_| {
                if let Some(f) = f.take() {
                    f();
                }
            }),
        )
    }

    /// Run `f` every `interval` until cancelled. The callback receives its
    /// own id so it can cancel itself.
    pub fn repeat<F: FnMut(CallbackId) + 'static>(&self, interval: Duration, f: F) -> CallbackId {
        let deadline = self.now() + interval;
        self.shared
            .timers
            .borrow_mut()
            .insert_callback(deadline, Some(interval), Box::new(f))
    }

    /// Cancel a timer callback. Returns false if it already fired or was
    /// cancelled.
    pub fn cancel(&self, id: CallbackId) -> bool {
        self.shared.timers.borrow_mut().remove(id.0)
    }

    /// Tasks spawned but not finished (queued or parked).
    pub fn pending_tasks(&self) -> usize {
        self.shared.tasks.borrow().len()
    }

    pub fn pending_timers(&self) -> usize {
        self.shared.timers.borrow().len()
    }

    pub(crate) fn timers(&self) -> RefMut<'_, TimerQueue> {
        self.shared.timers.borrow_mut()
    }

    pub(crate) fn try_timers(&self) -> Result<RefMut<'_, TimerQueue>, BorrowMutError> {
        self.shared.timers.try_borrow_mut()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("executor", &self.shared.name)
            .finish()
    }
}

impl Schedule for Handle {
    fn schedule(&self, task: LocalTask) {
        self.shared.spawn_task(task);
    }
}

impl Schedule for Executor {
    fn schedule(&self, task: LocalTask) {
        self.handle.schedule(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::yield_now;
    use std::cell::RefCell;

    fn virtual_executor() -> Executor {
        Executor::with_config(ExecutorConfig::default().with_clock(ClockMode::Virtual))
    }

    #[test]
    fn block_on_ready_future() {
        let exec = virtual_executor();
        assert_eq!(exec.block_on(async { 42 }).unwrap(), 42);
        assert_eq!(exec.stats().root_polls, 1);
    }

    #[test]
    fn spawned_tasks_run_in_fifo_order() {
        let exec = virtual_executor();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..4 {
            let log = log.clone();
            exec.handle().defer(move || log.borrow_mut().push(i));
        }
        exec.run().unwrap();
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn join_handle_returns_value() {
        let exec = virtual_executor();
        let h = exec.spawn(async { "done" });
        assert_eq!(exec.block_on(h).unwrap(), Ok("done"));
    }

    #[test]
    fn spawn_panic_returns_join_error() {
        let exec = virtual_executor();
        let h = exec.spawn(async {
            if true {
                panic!("boom");
            }
            1
        });
        match exec.block_on(h).unwrap() {
            Err(JoinError::Panicked(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected Panicked, got {:?}", other),
        }
    }

    #[test]
    fn sleep_advances_virtual_clock() {
        let exec = virtual_executor();
        let handle = exec.handle();
        let elapsed = exec
            .block_on(async move {
                handle.sleep(Duration::from_secs(5)).await;
                handle.elapsed()
            })
            .unwrap();
        assert_eq!(elapsed, Duration::from_secs(5));
    }

    #[test]
    fn stalled_root_is_reported() {
        let exec = virtual_executor();
        let err = exec.block_on(futures::future::pending::<()>()).unwrap_err();
        assert_eq!(err, RuntimeError::Stalled { pending_tasks: 0 });
    }

    #[test]
    fn reentrant_block_on_is_rejected() {
        let exec = Rc::new(virtual_executor());
        let inner = exec.clone();
        let result = exec.block_on(async move { inner.block_on(async {}) }).unwrap();
        assert_eq!(result, Err(RuntimeError::Reentrant));
    }

    #[test]
    fn deferred_work_runs_before_due_timers() {
        let exec = virtual_executor();
        let handle = exec.handle();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = log.clone();
            handle.delay(Duration::ZERO, move || log.borrow_mut().push("timer"));
        }
        {
            let log = log.clone();
            handle.defer(move || log.borrow_mut().push("defer"));
        }
        exec.run().unwrap();
        assert_eq!(*log.borrow(), vec!["defer", "timer"]);
    }

    #[test]
    fn repeat_until_cancelled() {
        let exec = virtual_executor();
        let handle = exec.handle();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let h = handle.clone();
        handle.repeat(Duration::from_millis(100), move |id| {
            c.set(c.get() + 1);
            if c.get() == 3 {
                h.cancel(id);
            }
        });
        exec.run().unwrap();
        assert_eq!(count.get(), 3);
        assert_eq!(handle.elapsed(), Duration::from_millis(300));
        assert_eq!(handle.pending_timers(), 0);
    }

    #[test]
    fn cancelled_delay_never_fires() {
        let exec = virtual_executor();
        let handle = exec.handle();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let id = handle.delay(Duration::from_secs(1), move || f.set(true));
        assert!(handle.cancel(id));
        assert!(!handle.cancel(id));
        exec.run().unwrap();
        assert!(!fired.get());
    }

    #[test]
    fn yield_now_lets_siblings_run() {
        let exec = virtual_executor();
        let handle = exec.handle();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        handle.spawn(async move {
            l.borrow_mut().push("a1");
            yield_now().await;
            l.borrow_mut().push("a2");
        });
        let l = log.clone();
        handle.spawn(async move {
            l.borrow_mut().push("b");
        });
        exec.run().unwrap();
        assert_eq!(*log.borrow(), vec!["a1", "b", "a2"]);
    }

    #[test]
    fn block_on_leaves_other_tasks_queued() {
        let exec = virtual_executor();
        let handle = exec.handle();
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        let h = handle.clone();
        exec.block_on(async move {
            h.delay(Duration::from_secs(2), move || r.set(true));
        })
        .unwrap();
        assert!(!ran.get());
        assert_eq!(handle.pending_timers(), 1);
        exec.run().unwrap();
        assert!(ran.get());
    }

    #[test]
    fn drop_abandons_parked_tasks() {
        let exec = virtual_executor();
        let handle = exec.handle();
        handle.spawn(futures::future::pending::<()>());
        exec.run().unwrap();
        assert_eq!(handle.pending_tasks(), 1);
        drop(exec);
        assert_eq!(handle.pending_tasks(), 0);
    }
}
