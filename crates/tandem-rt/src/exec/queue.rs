// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Ready queue.
//!
//! FIFO of task ids waiting for a turn. Cloned into every waker, so it
//! sits behind a mutex even though only one thread ever drains it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::task::TaskId;

#[derive(Debug, Clone, Default)]
pub(crate) struct ReadyQueue {
    queue: Arc<Mutex<VecDeque<TaskId>>>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TaskId>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, id: TaskId) {
        self.lock().push_back(id);
    }

    /// Pop one task from the front.
    pub fn pop(&self) -> Option<TaskId> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every queued id (used when the executor is torn down).
    pub fn clear(&self) {
        self.lock().clear();
    }
}
