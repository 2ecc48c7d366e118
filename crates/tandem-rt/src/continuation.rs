// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Suspend/resume bridge.
//!
//! A `Continuation` is a single-slot rendezvous between one waiting task
//! and any number of producers. The waiting side awaits `suspend()`;
//! producers either `resume` synchronously or `deliver` and wait for their
//! turn at the slot. Writers are admitted strictly in arrival order, so
//! completions racing for the slot come out in the order they happened.
//!
//! Every logical wait gets its own handle. There is no "current"
//! continuation; clones share one slot.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::ResumeError;

struct Inner<T> {
    slot: Option<T>,
    /// Waker of the task parked in `suspend`.
    parked: Option<Waker>,
    /// Deliveries waiting for the slot, front is next.
    writers: VecDeque<(u64, Waker)>,
    next_ticket: u64,
    closed: bool,
    suspensions: u64,
    resumptions: u64,
}

impl<T> Inner<T> {
    fn remove_writer(&mut self, ticket: u64) {
        if let Some(pos) = self.writers.iter().position(|(t, _)| *t == ticket) {
            self.writers.remove(pos);
        }
    }

    /// Waker of the writer allowed to fill the slot next, if the slot is free.
    fn next_writer(&self) -> Option<Waker> {
        if self.slot.is_some() {
            return None;
        }
        self.writers.front().map(|(_, w)| w.clone())
    }
}

/// Resumable handle a task can park on.
pub struct Continuation<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Continuation<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                slot: None,
                parked: None,
                writers: VecDeque::new(),
                next_ticket: 0,
                closed: false,
                suspensions: 0,
                resumptions: 0,
            })),
        }
    }

    /// Park until a value is resumed or delivered, then take it.
    ///
    /// Completes without parking if a value is already waiting.
    pub fn suspend(&self) -> Suspend<T> {
        Suspend {
            inner: self.inner.clone(),
            registered: false,
        }
    }

    /// Hand `value` to the parked task and wake it.
    ///
    /// Fails if an earlier value has not been taken yet or deliveries are
    /// queued ahead, and once the handle is closed. The value is returned
    /// in the error.
    pub fn resume(&self, value: T) -> Result<(), ResumeError<T>> {
        let waker = {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                return Err(ResumeError::Closed(value));
            }
            if inner.slot.is_some() || !inner.writers.is_empty() {
                return Err(ResumeError::Occupied(value));
            }
            inner.slot = Some(value);
            inner.parked.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }

    /// Queue `value` for the parked task, waiting until the slot is free.
    ///
    /// Resolves with `ResumeError::Closed` carrying the value if the handle
    /// is closed before the value is accepted.
    pub fn deliver(&self, value: T) -> Deliver<T> {
        Deliver {
            inner: self.inner.clone(),
            value: Some(value),
            ticket: None,
        }
    }

    /// Stop accepting values. Any pending value is dropped and queued
    /// deliveries resolve with `Closed`.
    pub fn close(&self) {
        let (writers, pending) = {
            let mut inner = self.inner.borrow_mut();
            inner.closed = true;
            inner.parked = None;
            let writers: Vec<Waker> = inner.writers.drain(..).map(|(_, w)| w).collect();
            (writers, inner.slot.take())
        };
        drop(pending);
        for waker in writers {
            waker.wake();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    /// Whether a value is sitting in the slot.
    pub fn is_ready(&self) -> bool {
        self.inner.borrow().slot.is_some()
    }

    /// Deliveries currently queued for the slot.
    pub fn queued(&self) -> usize {
        self.inner.borrow().writers.len()
    }

    /// Times a `suspend` future had to park.
    pub fn suspensions(&self) -> u64 {
        self.inner.borrow().suspensions
    }

    /// Values handed to the waiting side.
    pub fn resumptions(&self) -> u64 {
        self.inner.borrow().resumptions
    }
}

impl<T> Clone for Continuation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Continuation<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Continuation")
            .field("ready", &inner.slot.is_some())
            .field("parked", &inner.parked.is_some())
            .field("queued", &inner.writers.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

/// Future returned by `Continuation::suspend`.
#[must_use = "futures do nothing unless awaited"]
pub struct Suspend<T> {
    inner: Rc<RefCell<Inner<T>>>,
    registered: bool,
}

// The value is moved out of the shared slot, never out of `self`.
impl<T> Unpin for Suspend<T> {}

impl<T> Future for Suspend<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let (value, writer) = {
            let mut inner = self.inner.borrow_mut();
            match inner.slot.take() {
                Some(value) => {
                    inner.parked = None;
                    inner.resumptions += 1;
                    (value, inner.next_writer())
                }
                None => {
                    match &mut inner.parked {
                        Some(w) if w.will_wake(cx.waker()) => {}
                        parked => *parked = Some(cx.waker().clone()),
                    }
                    if !self.registered {
                        inner.suspensions += 1;
                    }
                    drop(inner);
                    self.registered = true;
                    return Poll::Pending;
                }
            }
        };
        self.registered = false;
        if let Some(waker) = writer {
            waker.wake();
        }
        Poll::Ready(value)
    }
}

impl<T> Drop for Suspend<T> {
    fn drop(&mut self) {
        if self.registered {
            if let Ok(mut inner) = self.inner.try_borrow_mut() {
                inner.parked = None;
            }
        }
    }
}

/// Future returned by `Continuation::deliver`.
#[must_use = "futures do nothing unless awaited"]
pub struct Deliver<T> {
    inner: Rc<RefCell<Inner<T>>>,
    value: Option<T>,
    ticket: Option<u64>,
}

impl<T> Unpin for Deliver<T> {}

impl<T> Future for Deliver<T> {
    type Output = Result<(), ResumeError<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let mut inner = this.inner.borrow_mut();
        let Some(value) = this.value.take() else {
            panic!("`Deliver` polled after completion");
        };

        if inner.closed {
            if let Some(ticket) = this.ticket.take() {
                inner.remove_writer(ticket);
            }
            return Poll::Ready(Err(ResumeError::Closed(value)));
        }

        let my_turn = match (this.ticket, inner.writers.front()) {
            (Some(ticket), Some((front, _))) => *front == ticket,
            (None, front) => front.is_none(),
            (Some(_), None) => true,
        };

        if my_turn && inner.slot.is_none() {
            if let Some(ticket) = this.ticket.take() {
                inner.remove_writer(ticket);
            }
            inner.slot = Some(value);
            let waker = inner.parked.take();
            drop(inner);
            if let Some(waker) = waker {
                waker.wake();
            }
            return Poll::Ready(Ok(()));
        }

        this.value = Some(value);
        match this.ticket {
            Some(ticket) => {
                if let Some((_, w)) = inner.writers.iter_mut().find(|(t, _)| *t == ticket) {
                    if !w.will_wake(cx.waker()) {
                        *w = cx.waker().clone();
                    }
                }
            }
            None => {
                let ticket = inner.next_ticket;
                inner.next_ticket += 1;
                inner.writers.push_back((ticket, cx.waker().clone()));
                this.ticket = Some(ticket);
            }
        }
        Poll::Pending
    }
}

impl<T> Drop for Deliver<T> {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        let next = match self.inner.try_borrow_mut() {
            Ok(mut inner) => {
                inner.remove_writer(ticket);
                inner.next_writer()
            }
            Err(_) => None,
        };
        if let Some(waker) = next {
            waker.wake();
        }
    }
}
