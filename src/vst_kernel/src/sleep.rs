//! Entering a sleep window
use core::sync::atomic::Ordering;

use crate::{
    periodic::PeriodicWork,
    port::{lock_cpu, Port},
    Vst,
};

/// The result of [`Vst::sleep_until`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SleepOutcome {
    /// The target tick had already been reached. The processor didn't sleep.
    Elapsed,
    /// The processor slept and has been woken up by an interrupt.
    Slept {
        /// The tick the wakeup was programmed for.
        target_ticks: u64,
        /// `true` if the requested target was further away than the counter
        /// can represent and was moved closer.
        clamped: bool,
    },
}

impl<P: Port, W: PeriodicWork, const NUM_CPUS: usize> Vst<P, W, NUM_CPUS> {
    /// Get the longest sleep, measured in ticks.
    fn max_sleep_ticks(&self) -> u64 {
        *self.max_sleep_ticks.call_once(|| {
            let max_sleep_ticks = self.cfg.max_sleep_ticks();
            log::debug!(
                "cycles_per_jiffy = {}, counter_width = {}, max_sleep_ticks = {}",
                self.cfg.cycles_per_jiffy(),
                self.cfg.counter_width(),
                max_sleep_ticks
            );
            max_sleep_ticks
        })
    }

    /// Stop the periodic tick on the current processor and halt until
    /// `target_ticks`, or until an unrelated interrupt arrives, whichever
    /// comes first.
    ///
    /// The interrupt that ends the sleep is taken before this method returns,
    /// so by then it has been reconciled by [`Self::on_wake`]. This method
    /// must be called from the idle loop with CPU Lock inactive.
    pub fn sleep_until(&self, target_ticks: u64) -> SleepOutcome {
        let max_sleep_ticks = self.max_sleep_ticks();
        let cpu_lock = lock_cpu(&self.port);

        // Include the ticks that have elapsed but are owed to the tick path
        let now = self
            .time_base
            .ticks()
            .saturating_add(self.deferred_ticks.load(Ordering::Relaxed));
        if target_ticks <= now {
            return SleepOutcome::Elapsed;
        }

        let (target_ticks, clamped) = if target_ticks - now > max_sleep_ticks {
            log::trace!(
                "clamping the sleep target {} to {}",
                target_ticks,
                now + max_sleep_ticks
            );
            (now + max_sleep_ticks, true)
        } else {
            (target_ticks, false)
        };

        // The next periodic tick is `now + 1`, so the target is
        // `target_ticks - now - 1` ticks after it
        let cycles_per_jiffy = self.cfg.cycles_per_jiffy() as u64;
        let deadline = self
            .port
            .compare()
            .wrapping_add((target_ticks - now - 1) * cycles_per_jiffy)
            & self.cfg.counter_mask();
        self.port.set_wakeup(deadline);

        let session = self.session();
        let start_cycle = self.port.read_cycles() & self.cfg.counter_mask();
        session.begin(start_cycle, target_ticks);

        if NUM_CPUS > 1 {
            self.watchdog.enter(&self.port);
        }

        log::trace!(
            "sleeping from tick {} (cycle {}) until tick {} (cycle {})",
            now,
            start_cycle,
            target_ticks,
            deadline
        );

        self.port.wait_for_interrupt();

        // Take the pending interrupt
        drop(cpu_lock);

        SleepOutcome::Slept {
            target_ticks,
            clamped,
        }
    }

    /// Sleep until the earliest periodic work is due, or for
    /// `default_sleep_ticks` ticks if there's none.
    pub fn idle_once(&self, default_sleep_ticks: u64) -> SleepOutcome {
        let target_ticks = self.work.next_deadline().unwrap_or_else(|| {
            self.time_base
                .ticks()
                .saturating_add(self.deferred_ticks.load(Ordering::Relaxed))
                .saturating_add(default_sleep_ticks)
        });
        self.sleep_until(target_ticks)
    }
}
