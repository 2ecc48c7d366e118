// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Join handle for spawned tasks.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::JoinError;

use super::task::TaskId;

/// Result slot shared by a spawned task and its handle.
pub(crate) struct JoinState<T> {
    result: Option<Result<T, JoinError>>,
    finished: bool,
    waiter: Option<Waker>,
}

impl<T> JoinState<T> {
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            result: None,
            finished: false,
            waiter: None,
        }))
    }

    /// Store the task's result and wake whoever is joining.
    pub fn complete(state: &Rc<RefCell<Self>>, result: Result<T, JoinError>) {
        let waiter = {
            let mut state = state.borrow_mut();
            state.result = Some(result);
            state.finished = true;
            state.waiter.take()
        };
        if let Some(waker) = waiter {
            waker.wake();
        }
    }
}

/// Handle to a task spawned with `Handle::spawn`.
///
/// Awaiting it yields the task's output, or `JoinError::Panicked` if the
/// task panicked. Dropping it detaches the task.
pub struct JoinHandle<T> {
    id: TaskId,
    state: Rc<RefCell<JoinState<T>>>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(id: TaskId, state: Rc<RefCell<JoinState<T>>>) -> Self {
        Self { id, state }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.state.borrow().finished
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();
        if let Some(result) = state.result.take() {
            return Poll::Ready(result);
        }
        if state.finished {
            return Poll::Ready(Err(JoinError::Panicked(
                "task result already taken".to_string(),
            )));
        }
        state.waiter = Some(cx.waker().clone());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker;

    #[test]
    fn pending_until_completed() {
        let state = JoinState::shared();
        let mut handle = JoinHandle::new(TaskId(3), state.clone());
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(Pin::new(&mut handle).poll(&mut cx).is_pending());
        assert!(!handle.is_finished());

        JoinState::complete(&state, Ok(5));
        assert!(handle.is_finished());
        assert_eq!(Pin::new(&mut handle).poll(&mut cx), Poll::Ready(Ok(5)));
    }

    #[test]
    fn panicked_task_reports_message() {
        let state = JoinState::<()>::shared();
        let mut handle = JoinHandle::new(TaskId(1), state.clone());
        JoinState::complete(&state, Err(JoinError::Panicked("oops".into())));
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert_eq!(
            Pin::new(&mut handle).poll(&mut cx),
            Poll::Ready(Err(JoinError::Panicked("oops".into())))
        );
    }
}
