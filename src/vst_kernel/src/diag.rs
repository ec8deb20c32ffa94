//! Reconciliation counters
use core::sync::atomic::{AtomicU64, Ordering};

use crate::WakeCause;

/// Monotonic counters updated by the wake reconciler.
///
/// Only written from inside the time base's write section, so the
/// increments themselves never race. Reading them is lock-free.
#[derive(Debug, Default)]
pub struct Diagnostics {
    timer_exits: AtomicU64,
    external_exits: AtomicU64,
    skipped_ticks: AtomicU64,
}

/// A copy of [`Diagnostics`]'s counters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct DiagnosticsSnapshot {
    /// The number of sleep windows ended by the programmed timer match.
    pub timer_exits: u64,
    /// The number of sleep windows ended by some other interrupt.
    pub external_exits: u64,
    /// The number of ticks credited by reconciliation instead of by the
    /// ordinary tick path.
    pub skipped_ticks: u64,
}

impl Diagnostics {
    pub const fn new() -> Self {
        Self {
            timer_exits: AtomicU64::new(0),
            external_exits: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_exit(&self, cause: WakeCause) {
        let counter = match cause {
            WakeCause::TimerMatch => &self.timer_exits,
            WakeCause::ExternalInterrupt => &self.external_exits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_skipped(&self, num_ticks: u64) {
        self.skipped_ticks.fetch_add(num_ticks, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            timer_exits: self.timer_exits.load(Ordering::Relaxed),
            external_exits: self.external_exits.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
        }
    }
}
