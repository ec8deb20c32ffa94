//! Reconciling a sleep window and the ordinary tick path
use core::sync::atomic::Ordering;

use crate::{periodic::PeriodicWork, port::Port, Vst, WakeCause};

/// The result of [`Vst::on_wake`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WakeOutcome {
    /// The processor wasn't sleeping. Nothing was changed.
    Awake,
    /// A sleep window was closed.
    Reconciled {
        cause: WakeCause,
        /// The number of whole ticks since the sleep started, not counting
        /// ticks another processor has already reconciled.
        elapsed: u64,
        /// The number of ticks credited to the time base. This is
        /// `elapsed - 1` (or zero); the last tick is left for
        /// [`Vst::on_tick`].
        credited: u64,
    },
}

impl<P: Port, W: PeriodicWork, const NUM_CPUS: usize> Vst<P, W, NUM_CPUS> {
    /// Close the current processor's sleep window, if any, and credit the
    /// ticks that elapsed during it.
    ///
    /// This is to be called from the handler of every interrupt that can end
    /// a sleep. Calling it when the processor is awake has no effect, so
    /// it's safe to call more than once per wake-up.
    ///
    /// The elapsed count is bounded by the ticks the time base still owes
    /// (measured from the tick boundary before the global compare value), so
    /// processors whose sleeps overlap don't credit the same tick twice.
    pub fn on_wake(&self, cause: WakeCause) -> WakeOutcome {
        let Some(session) = self.session().end() else {
            return WakeOutcome::Awake;
        };

        let mut time_base = self.time_base.lock_write(&self.port);

        self.diag.record_exit(cause);
        self.port.stop();

        let cycles_per_jiffy = self.cfg.cycles_per_jiffy() as u64;
        let now_cycle = self.port.read_cycles();

        // The last tick boundary the time base has accounted for
        let accounted_until =
            self.port.compare().wrapping_sub(cycles_per_jiffy) & self.cfg.counter_mask();
        let elapsed = self
            .cfg
            .cycles_between(session.start_cycle, now_cycle)
            .min(self.cfg.cycles_between(accounted_until, now_cycle))
            / cycles_per_jiffy;

        let credited = if elapsed > 0 {
            let credited = elapsed - 1;
            let ticks = time_base.credit(credited);

            // `elapsed * cycles_per_jiffy <= counter_mask` by construction
            self.port.advance_compare(elapsed * cycles_per_jiffy);

            self.diag.add_skipped(credited);
            self.deferred_ticks.fetch_add(1, Ordering::Relaxed);
            self.work.run_due(ticks);
            credited
        } else {
            self.work.check_due(time_base.ticks());
            0
        };

        self.port.start();
        drop(time_base);

        if NUM_CPUS > 1 {
            self.watchdog.exit(&self.port);
        }

        log::trace!(
            "woken up by {} at cycle {} (target tick {}): {} ticks elapsed, {} credited",
            cause,
            now_cycle,
            session.target_ticks,
            elapsed,
            credited
        );

        WakeOutcome::Reconciled {
            cause,
            elapsed,
            credited,
        }
    }

    /// The ordinary tick path. Credit every tick whose compare value the
    /// counter has reached, plus the ticks left over by [`Self::on_wake`],
    /// and move the compare value past the counter. Returns the number of
    /// ticks credited.
    ///
    /// A spurious call (nothing due, nothing left over) has no effect.
    pub fn on_tick(&self) -> u64 {
        let mut time_base = self.time_base.lock_write(&self.port);

        let cycles_per_jiffy = self.cfg.cycles_per_jiffy() as u64;
        let mask = self.cfg.counter_mask();
        let late = self
            .cfg
            .cycles_between(self.port.compare(), self.port.read_cycles());

        // A compare value more than half the counter's range behind is
        // considered to be ahead
        let due = if late <= mask / 2 {
            late / cycles_per_jiffy + 1
        } else {
            0
        };
        if due > 0 {
            self.port.advance_compare(due * cycles_per_jiffy);
        }

        let deferred = self.deferred_ticks.swap(0, Ordering::Relaxed);
        let credited = due + deferred;
        if credited > 0 {
            let ticks = time_base.credit(credited);
            self.work.run_due(ticks);
        }

        credited
    }

    /// The handler for the timer interrupt. Ends the sleep window, if any,
    /// and then claims the tick the match signaled.
    pub fn handle_timer_interrupt(&self) {
        self.on_wake(WakeCause::TimerMatch);
        self.on_tick();
    }

    /// The hook for every interrupt other than the timer interrupt.
    pub fn handle_external_interrupt(&self) {
        self.on_wake(WakeCause::ExternalInterrupt);
    }
}
