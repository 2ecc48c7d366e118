// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Task representation.
//!
//! A task is a boxed future plus an atomic state. The executor owns the
//! polling loop; wakers only push the task id back onto the ready queue.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Wake, Waker};

use super::queue::ReadyQueue;
use super::LocalTask;

/// Identifies a task within one executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    /// The future passed to `block_on`. Never stored in the task table.
    pub(crate) const ROOT: TaskId = TaskId(0);
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == TaskId::ROOT {
            write!(f, "root")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Task lifecycle states.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskState {
    /// Queued, waiting to be polled. Also set by a wake that lands
    /// while the task is running.
    Ready = 0,
    /// Currently being polled.
    Running = 1,
    /// Parked until its waker fires.
    Waiting = 2,
    /// Finished; wakes are ignored.
    Complete = 3,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Ready,
            1 => Self::Running,
            2 => Self::Waiting,
            _ => Self::Complete,
        }
    }
}

/// State cell shared between a task record and its waker.
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(TaskState::Ready as u8)))
    }

    pub fn get(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: TaskState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Called after a poll returned `Pending`. Moves Running to Waiting;
    /// if a wake already landed during the poll, re-queues instead.
    pub fn park(&self, id: TaskId, queue: &ReadyQueue) {
        if !self.transition(TaskState::Running, TaskState::Waiting)
            && self.get() == TaskState::Ready
        {
            queue.push(id);
        }
    }
}

/// A spawned task owned by the executor's task table.
pub(crate) struct Task {
    pub id: TaskId,
    pub future: LocalTask,
    pub state: StateCell,
    pub waker: Waker,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish()
    }
}

impl Task {
    pub fn new(id: TaskId, future: LocalTask, queue: &ReadyQueue) -> Self {
        let state = StateCell::new();
        let waker = task_waker(id, state.clone(), queue.clone());
        Self {
            id,
            future,
            state,
            waker,
        }
    }
}

/// Waker that re-enqueues a task id.
///
/// `Waker` must be `Send + Sync`, so the waker only carries the id, the
/// atomic state and the shared queue; the future itself stays on the
/// executor's thread.
struct TaskWaker {
    id: TaskId,
    state: StateCell,
    queue: ReadyQueue,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        loop {
            match self.state.get() {
                TaskState::Waiting => {
                    if self.state.transition(TaskState::Waiting, TaskState::Ready) {
                        self.queue.push(self.id);
                        return;
                    }
                }
                TaskState::Running => {
                    // Picked up by `park` once the poll returns.
                    if self.state.transition(TaskState::Running, TaskState::Ready) {
                        return;
                    }
                }
                TaskState::Ready | TaskState::Complete => return,
            }
        }
    }
}

pub(crate) fn task_waker(id: TaskId, state: StateCell, queue: ReadyQueue) -> Waker {
    Waker::from(Arc::new(TaskWaker { id, state, queue }))
}
