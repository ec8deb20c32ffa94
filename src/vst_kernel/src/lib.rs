//! Tickless sleep time reconciliation ("VST", variable sleep time).
//!
//! This crate lets a processor stop taking its periodic timer interrupt for an
//! extended, variable interval and, on resumption, reconstruct how many ticks
//! have elapsed. Every elapsed tick is credited to the [global time base]
//! exactly once, and the hardware compare register is re-armed so that no tick
//! is lost or counted twice.
//!
//! The algorithm is generic over a [`Port`], which bundles the per-architecture
//! capabilities it needs ([`HardwareClock`], [`TickGate`], [`CpuLock`],
//! [`Halt`], [`CpuId`], and [`Watchdog`]). The port crates `vst_port_arm`,
//! `vst_port_riscv`, and `vst_port_std` provide implementations.
//!
//! # Control flow
//!
//! ```text
//!  idle loop ── sleep_until ──► arm wakeup, mark Sleeping, halt
//!                                          │
//!                              any interrupt arrives
//!                                          ▼
//!  interrupt glue ── on_wake ──► credit elapsed - 1 ticks, advance compare,
//!                                replay due periodic work
//!                 └─ on_tick ──► (timer interrupt only) claim the final tick
//! ```
//!
//! The last elapsed tick is never credited by the reconciler. It's left to the
//! ordinary tick path, which is allowed to fire for it anyway, so crediting it
//! here would count it twice.
//!
//! [global time base]: GlobalTimeBase
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
#![deny(unsafe_op_in_unsafe_fn)]
use core::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

pub mod cfg;
pub mod diag;
pub mod num;
pub mod periodic;
pub mod port;
pub mod session;
pub mod timebase;
mod utils;

mod sleep;
mod wake;
mod watchdog;

#[cfg(test)]
mod test_utils;

pub use self::{
    cfg::{CfgError, TimerCfg, TimerOptions},
    diag::{Diagnostics, DiagnosticsSnapshot},
    periodic::{PeriodicTimer, PeriodicWork, QueueFullError, TimerId, TimerQueue},
    port::{CpuId, CpuLock, CpuLockGuard, Halt, HardwareClock, Port, TickGate, Watchdog},
    session::{ProcessorState, SleepSession},
    sleep::SleepOutcome,
    timebase::{GlobalTimeBase, TimeBaseWriteGuard, TimeSnapshot, WallClock},
    wake::WakeOutcome,
};

use self::watchdog::WatchdogGate;

/// The event that ended a sleep window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WakeCause {
    /// The compare register programmed by [`Vst::sleep_until`] matched.
    TimerMatch,
    /// An unrelated interrupt arrived before the programmed deadline.
    ExternalInterrupt,
}

impl fmt::Display for WakeCause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::TimerMatch => "timer match",
            Self::ExternalInterrupt => "external interrupt",
        })
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const SESSION_INIT: SleepSession = SleepSession::new();

/// The tickless sleep engine for a system with `NUM_CPUS` processors.
///
/// An instance is meant to be placed in a `static`, initialized at boot, and
/// never torn down. `P` is the port and `W` is the periodic-timer subsystem
/// whose due work is replayed after a reconciliation.
pub struct Vst<P, W, const NUM_CPUS: usize> {
    port: P,
    work: W,
    cfg: TimerCfg,
    time_base: GlobalTimeBase,
    sessions: [SleepSession; NUM_CPUS],
    diag: Diagnostics,
    watchdog: WatchdogGate,
    /// The number of ticks that have elapsed but are left for the ordinary
    /// tick path to credit. Only modified inside the time base's write
    /// section.
    deferred_ticks: AtomicU64,
    /// Derived from `cfg` on the first call to [`Self::sleep_until`].
    max_sleep_ticks: spin::Once<u64>,
}

impl<P, W, const NUM_CPUS: usize> Vst<P, W, NUM_CPUS> {
    /// Construct a `Vst`. The tick counter and the wall clock start at zero.
    ///
    /// `cfg` has already been validated by its constructor, so a zero
    /// `cycles_per_jiffy` can't reach this point.
    pub const fn new(port: P, work: W, cfg: TimerCfg) -> Self {
        assert!(NUM_CPUS > 0, "`NUM_CPUS` must not be zero");
        Self {
            port,
            work,
            cfg,
            time_base: GlobalTimeBase::new(cfg.jiffy_nanos()),
            sessions: [SESSION_INIT; NUM_CPUS],
            diag: Diagnostics::new(),
            watchdog: WatchdogGate::new(),
            deferred_ticks: AtomicU64::new(0),
            max_sleep_ticks: spin::Once::new(),
        }
    }

    #[inline]
    pub fn port(&self) -> &P {
        &self.port
    }

    #[inline]
    pub fn work(&self) -> &W {
        &self.work
    }

    #[inline]
    pub fn cfg(&self) -> &TimerCfg {
        &self.cfg
    }

    /// Get the process-wide time base. Readers use [`GlobalTimeBase::read`].
    #[inline]
    pub fn time_base(&self) -> &GlobalTimeBase {
        &self.time_base
    }

    /// Get the reconciliation counters.
    #[inline]
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diag.snapshot()
    }

    /// Get the number of elapsed ticks that haven't been credited yet because
    /// they're owed to the ordinary tick path.
    #[inline]
    pub fn deferred_ticks(&self) -> u64 {
        self.deferred_ticks.load(Ordering::Relaxed)
    }

    /// Get the number of processors currently inside a sleep window.
    #[inline]
    pub fn sleeping_cpus(&self) -> usize {
        self.watchdog.sleepers()
    }
}

impl<P: CpuId, W, const NUM_CPUS: usize> Vst<P, W, NUM_CPUS> {
    /// Get the sleep session of the current processor.
    ///
    /// # Panics
    ///
    /// Panics if the port reports a CPU ID not less than `NUM_CPUS`.
    fn session(&self) -> &SleepSession {
        let cpu_id = self.port.cpu_id();
        match self.sessions.get(cpu_id) {
            Some(session) => session,
            None => panic!("CPU ID {cpu_id} is out of range (`NUM_CPUS` = {NUM_CPUS})"),
        }
    }

    /// Get the sleep state of the current processor.
    pub fn state(&self) -> ProcessorState {
        self.session().state()
    }
}
