// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Clock and timers.
//!
//! Timers live in a min-heap keyed by `(deadline, order)`. Cancelled or
//! rescheduled entries stay in the heap and are skipped lazily when they
//! surface. Ties fire in registration order.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crate::config::ClockMode;

use super::executor::Handle;

/// Time source for one executor.
#[derive(Debug)]
pub(crate) struct Clock {
    mode: ClockMode,
    origin: Instant,
    /// Virtual mode only: time elapsed since `origin`.
    elapsed: Cell<Duration>,
}

impl Clock {
    pub fn new(mode: ClockMode) -> Self {
        Self {
            mode,
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
        }
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    pub fn now(&self) -> Instant {
        match self.mode {
            ClockMode::Real => Instant::now(),
            ClockMode::Virtual => self.origin + self.elapsed.get(),
        }
    }

    /// Time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.now().saturating_duration_since(self.origin)
    }

    /// Move to `deadline`: sleep the thread, or jump in virtual mode.
    pub fn advance_to(&self, deadline: Instant) {
        let now = self.now();
        if deadline <= now {
            return;
        }
        match self.mode {
            ClockMode::Real => std::thread::sleep(deadline - now),
            ClockMode::Virtual => self.elapsed.set(deadline - self.origin),
        }
    }
}

/// Identifies a timer callback registered with `Handle::delay` or
/// `Handle::repeat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(pub(crate) u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

pub(crate) type TimerCallback = Rc<RefCell<Box<dyn FnMut(CallbackId)>>>;

enum TimerAction {
    Wake(Waker),
    Callback {
        callback: TimerCallback,
        interval: Option<Duration>,
    },
}

struct TimerEntry {
    deadline: Instant,
    order: u64,
    action: TimerAction,
}

/// What a timer turned into when it expired.
pub(crate) enum Fired {
    Wake(Waker),
    Callback(CallbackId, TimerCallback),
}

#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<Reverse<(Instant, u64, u64)>>,
    entries: HashMap<u64, TimerEntry>,
    next_id: u64,
    next_order: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_order(&mut self) -> u64 {
        let order = self.next_order;
        self.next_order += 1;
        order
    }

    fn insert(&mut self, deadline: Instant, action: TimerAction) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let order = self.bump_order();
        self.heap.push(Reverse((deadline, order, id)));
        self.entries.insert(
            id,
            TimerEntry {
                deadline,
                order,
                action,
            },
        );
        id
    }

    pub fn insert_waker(&mut self, deadline: Instant, waker: Waker) -> u64 {
        self.insert(deadline, TimerAction::Wake(waker))
    }

    pub fn insert_callback(
        &mut self,
        deadline: Instant,
        interval: Option<Duration>,
        callback: Box<dyn FnMut(CallbackId)>,
    ) -> CallbackId {
        let callback = Rc::new(RefCell::new(callback));
        CallbackId(self.insert(deadline, TimerAction::Callback { callback, interval }))
    }

    /// Swap the waker of a pending sleep. Returns false if the timer is gone.
    pub fn update_waker(&mut self, id: u64, waker: &Waker) -> bool {
        match self.entries.get_mut(&id) {
            Some(TimerEntry {
                action: TimerAction::Wake(w),
                ..
            }) => {
                if !w.will_wake(waker) {
                    *w = waker.clone();
                }
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order stamp the next registration will get.
    pub fn watermark(&self) -> u64 {
        self.next_order
    }

    /// Drop heap entries whose timer was removed or rescheduled.
    fn skip_stale(&mut self) {
        while let Some(Reverse((_, order, id))) = self.heap.peek().copied() {
            match self.entries.get(&id) {
                Some(entry) if entry.order == order => return,
                _ => {
                    self.heap.pop();
                }
            }
        }
    }

    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.skip_stale();
        self.heap.peek().map(|Reverse((deadline, _, _))| *deadline)
    }

    /// Pop the earliest timer that is due at `now` and was registered
    /// before `watermark`. Repeating callbacks are re-armed before they
    /// are returned, so the callback may cancel itself.
    pub fn pop_expired(&mut self, now: Instant, watermark: u64) -> Option<Fired> {
        self.skip_stale();
        let Reverse((deadline, order, id)) = *self.heap.peek()?;
        if deadline > now || order >= watermark {
            return None;
        }
        self.heap.pop();

        let rearm = match self.entries.get(&id).map(|e| &e.action) {
            Some(TimerAction::Callback {
                callback,
                interval: Some(interval),
            }) => Some((callback.clone(), *interval)),
            _ => None,
        };

        if let Some((callback, interval)) = rearm {
            let next = now + interval;
            let order = self.bump_order();
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.deadline = next;
                entry.order = order;
            }
            self.heap.push(Reverse((next, order, id)));
            return Some(Fired::Callback(CallbackId(id), callback));
        }

        match self.entries.remove(&id)?.action {
            TimerAction::Wake(waker) => Some(Fired::Wake(waker)),
            TimerAction::Callback { callback, .. } => Some(Fired::Callback(CallbackId(id), callback)),
        }
    }

    #[cfg(test)]
    pub fn deadline_of(&self, id: u64) -> Option<Instant> {
        self.entries.get(&id).map(|e| e.deadline)
    }
}

/// Future that completes once the executor clock reaches a deadline.
#[must_use = "futures do nothing unless awaited"]
pub struct Sleep {
    handle: Handle,
    deadline: Instant,
    timer: Option<u64>,
}

impl Sleep {
    pub(crate) fn new(handle: Handle, deadline: Instant) -> Self {
        Self {
            handle,
            deadline,
            timer: None,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl fmt::Debug for Sleep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sleep")
            .field("deadline", &self.deadline)
            .field("registered", &self.timer.is_some())
            .finish()
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        if this.handle.now() >= this.deadline {
            if let Some(id) = this.timer.take() {
                this.handle.timers().remove(id);
            }
            return Poll::Ready(());
        }

        let registered = this.timer;
        let mut timers = this.handle.timers();
        match registered {
            Some(id) if timers.update_waker(id, cx.waker()) => {}
            _ => this.timer = Some(timers.insert_waker(this.deadline, cx.waker().clone())),
        }
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(id) = self.timer.take() {
            if let Ok(mut timers) = self.handle.try_timers() {
                timers.remove(id);
            }
        }
    }
}
