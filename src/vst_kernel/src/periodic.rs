//! Periodic timers replayed after a reconciliation
use arrayvec::ArrayVec;
use core::{fmt, num::NonZeroU64};

use crate::utils::binary_heap::{BinaryHeap, BinaryHeapCtx};

/// The periodic-timer subsystem driven by the tick path.
///
/// The methods are called from inside the time base's write section with the
/// current tick count. Implementations must not read the time base through
/// [`GlobalTimeBase::read`](crate::GlobalTimeBase::read); it would spin
/// forever.
pub trait PeriodicWork {
    /// Run every piece of work whose deadline is at or before `now`.
    fn run_due(&self, now: u64);

    /// Run due work only if there is any. Used when no tick has elapsed
    /// since the last time work was run.
    fn check_due(&self, now: u64) {
        if self.next_deadline().map_or(false, |deadline| deadline <= now) {
            self.run_due(now);
        }
    }

    /// Get the earliest deadline, if any.
    fn next_deadline(&self) -> Option<u64>;
}

impl PeriodicWork for () {
    fn run_due(&self, _now: u64) {}

    fn next_deadline(&self) -> Option<u64> {
        None
    }
}

/// A timer registered in [`TimerQueue`].
#[derive(Clone, Copy)]
pub struct PeriodicTimer {
    /// The tick count at which the timer fires next.
    pub deadline: u64,
    /// The interval between firings, or `None` for a one-shot timer.
    pub period: Option<NonZeroU64>,
    /// Called as `callback(param, now)`.
    pub callback: fn(usize, u64),
    pub param: usize,
}

impl fmt::Debug for PeriodicTimer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PeriodicTimer")
            .field("deadline", &self.deadline)
            .field("period", &self.period)
            .field("callback", &(self.callback as *const ()))
            .field("param", &self.param)
            .finish()
    }
}

impl PeriodicTimer {
    /// Get the first deadline after `now`, skipping any periods that have
    /// already passed. Returns `None` for a one-shot timer.
    fn next_after(&self, now: u64) -> Option<u64> {
        let period = self.period?.get();
        let missed = now.saturating_sub(self.deadline) / period;
        Some(
            self.deadline
                .saturating_add(missed.saturating_add(1).saturating_mul(period)),
        )
    }
}

/// Identifies a timer in [`TimerQueue`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Error type for [`TimerQueue::insert`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct QueueFullError;

impl fmt::Display for QueueFullError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("the timer queue is full")
    }
}

#[derive(Debug)]
struct Entry {
    id: TimerId,
    timer: PeriodicTimer,
}

/// Orders entries by deadline, breaking ties by registration order.
struct ByDeadline;

impl BinaryHeapCtx<Entry> for ByDeadline {
    #[inline]
    fn lt(&mut self, x: &Entry, y: &Entry) -> bool {
        (x.timer.deadline, x.id.0) < (y.timer.deadline, y.id.0)
    }
}

struct Inner<const N: usize> {
    heap: ArrayVec<Entry, N>,
    next_id: u64,
}

/// A fixed-capacity [`PeriodicWork`] implementation holding up to `N`
/// timers.
pub struct TimerQueue<const N: usize> {
    inner: spin::Mutex<Inner<N>>,
}

impl<const N: usize> Default for TimerQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for TimerQueue<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TimerQueue")
            .field("len", &self.len())
            .field("capacity", &N)
            .finish()
    }
}

impl<const N: usize> TimerQueue<N> {
    pub const fn new() -> Self {
        Self {
            inner: spin::Mutex::new(Inner {
                heap: ArrayVec::new_const(),
                next_id: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a timer.
    pub fn insert(&self, timer: PeriodicTimer) -> Result<TimerId, QueueFullError> {
        let mut inner = self.inner.lock();
        let id = TimerId(inner.next_id);
        inner
            .heap
            .heap_push(Entry { id, timer }, ByDeadline)
            .map_err(|_| QueueFullError)?;
        inner.next_id += 1;
        Ok(id)
    }

    /// Cancel a timer. Returns `None` if it has already fired (one-shot) or
    /// been removed.
    pub fn remove(&self, id: TimerId) -> Option<PeriodicTimer> {
        let mut inner = self.inner.lock();
        let i = inner.heap.iter().position(|e| e.id == id)?;
        inner.heap.heap_remove(i, ByDeadline).map(|e| e.timer)
    }
}

impl<const N: usize> PeriodicWork for TimerQueue<N> {
    fn run_due(&self, now: u64) {
        loop {
            let mut inner = self.inner.lock();
            match inner.heap.first() {
                Some(e) if e.timer.deadline <= now => {}
                _ => break,
            }
            let Some(mut entry) = inner.heap.heap_pop(ByDeadline) else {
                break;
            };
            let timer = entry.timer;

            if let Some(next) = timer.next_after(now) {
                // Reuses the slot that was just vacated
                entry.timer.deadline = next;
                let pushed = inner.heap.heap_push(entry, ByDeadline);
                debug_assert!(pushed.is_ok());
            }

            // The callback may insert or remove timers
            drop(inner);

            log::trace!(
                "running timer (param = {}, deadline = {}) at {}",
                timer.param,
                timer.deadline,
                now
            );
            (timer.callback)(timer.param, now);
        }
    }

    fn next_deadline(&self) -> Option<u64> {
        self.inner.lock().heap.first().map(|e| e.timer.deadline)
    }
}
