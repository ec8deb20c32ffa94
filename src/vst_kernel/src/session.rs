//! Per-processor sleep sessions
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The sleep state of a processor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ProcessorState {
    Awake,
    /// Inside a sleep window opened by [`Vst::sleep_until`](crate::Vst::sleep_until)
    /// and not yet reconciled.
    Sleeping,
}

/// The record of one sleep window on one processor.
///
/// Written by the sleep scheduler with CPU Lock active and consumed exactly
/// once by the wake reconciler. Only the owning processor touches it, but
/// the fields are atomic so that the containing `Vst` can be `Sync`.
#[derive(Debug)]
pub struct SleepSession {
    sleeping: AtomicBool,
    start_cycle: AtomicU64,
    target_ticks: AtomicU64,
}

/// The fields of a [`SleepSession`] taken by [`SleepSession::end`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct EndedSession {
    pub start_cycle: u64,
    pub target_ticks: u64,
}

impl Default for SleepSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SleepSession {
    pub const fn new() -> Self {
        Self {
            sleeping: AtomicBool::new(false),
            start_cycle: AtomicU64::new(0),
            target_ticks: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn state(&self) -> ProcessorState {
        if self.sleeping.load(Ordering::Acquire) {
            ProcessorState::Sleeping
        } else {
            ProcessorState::Awake
        }
    }

    /// Get the tick count the current (or last) sleep window was aiming for.
    #[inline]
    pub fn target_ticks(&self) -> u64 {
        self.target_ticks.load(Ordering::Relaxed)
    }

    /// Open a sleep window.
    pub(crate) fn begin(&self, start_cycle: u64, target_ticks: u64) {
        debug_assert!(
            !self.sleeping.load(Ordering::Relaxed),
            "a sleep session is already active on this processor"
        );
        self.start_cycle.store(start_cycle, Ordering::Relaxed);
        self.target_ticks.store(target_ticks, Ordering::Relaxed);
        self.sleeping.store(true, Ordering::Release);
    }

    /// Close the sleep window. Returns `None` if there was none, in which
    /// case nothing is changed.
    pub(crate) fn end(&self) -> Option<EndedSession> {
        if !self.sleeping.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(EndedSession {
            start_cycle: self.start_cycle.load(Ordering::Relaxed),
            target_ticks: self.target_ticks.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_consumes_once() {
        let session = SleepSession::new();
        assert_eq!(session.state(), ProcessorState::Awake);
        assert_eq!(session.end(), None);

        session.begin(1234, 10);
        assert_eq!(session.state(), ProcessorState::Sleeping);
        assert_eq!(session.target_ticks(), 10);

        assert_eq!(
            session.end(),
            Some(EndedSession {
                start_cycle: 1234,
                target_ticks: 10
            })
        );
        assert_eq!(session.state(), ProcessorState::Awake);
        assert_eq!(session.end(), None);
    }
}
