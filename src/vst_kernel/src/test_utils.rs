//! A scriptable port and periodic-work recorder for unit tests
use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
    Mutex,
};

use crate::{
    num::{counter_max, wrapping_cycles_between},
    periodic::PeriodicWork,
    port::{CpuId, CpuLock, Halt, HardwareClock, TickGate, Watchdog},
    WakeCause,
};

/// A port whose counter only moves when told to.
///
/// [`Halt::wait_for_interrupt`] moves the counter forward by `halt_advance`
/// cycles, or up to the programmed compare value if that comes first, and
/// remembers which of the two ended the halt.
#[derive(Debug)]
pub struct MockPort {
    mask: u64,
    pub counter: AtomicU64,
    /// The next periodic tick.
    pub compare: AtomicU64,
    /// The value the hardware compare register is currently programmed with.
    pub hw_compare: AtomicU64,
    pub tick_running: AtomicBool,
    pub stops: AtomicU32,
    pub starts: AtomicU32,
    pub cpu_lock_depth: AtomicU32,
    pub halt_advance: AtomicU64,
    pub halts: AtomicU32,
    halted_until_match: AtomicBool,
    pub cpu: AtomicUsize,
    pub suspends: AtomicU32,
    pub resumes: AtomicU32,
}

impl MockPort {
    /// Construct a `MockPort` at cycle `0` with the first tick due at
    /// `first_compare`.
    pub fn new(counter_width: u32, first_compare: u64) -> Self {
        Self {
            mask: counter_max(counter_width),
            counter: AtomicU64::new(0),
            compare: AtomicU64::new(first_compare),
            hw_compare: AtomicU64::new(first_compare),
            tick_running: AtomicBool::new(true),
            stops: AtomicU32::new(0),
            starts: AtomicU32::new(0),
            cpu_lock_depth: AtomicU32::new(0),
            halt_advance: AtomicU64::new(0),
            halts: AtomicU32::new(0),
            halted_until_match: AtomicBool::new(false),
            cpu: AtomicUsize::new(0),
            suspends: AtomicU32::new(0),
            resumes: AtomicU32::new(0),
        }
    }

    pub fn set_counter(&self, value: u64) {
        self.counter.store(value & self.mask, Ordering::Relaxed);
    }

    pub fn advance(&self, cycles: u64) {
        let value = self.counter.load(Ordering::Relaxed).wrapping_add(cycles);
        self.set_counter(value);
    }

    pub fn hw_compare(&self) -> u64 {
        self.hw_compare.load(Ordering::Relaxed)
    }

    /// Get the cause of the last halt's end.
    pub fn wake_cause(&self) -> WakeCause {
        if self.halted_until_match.load(Ordering::Relaxed) {
            WakeCause::TimerMatch
        } else {
            WakeCause::ExternalInterrupt
        }
    }

    /// Return `true` if the counter has reached the hardware compare value.
    pub fn timer_pending(&self) -> bool {
        let late = wrapping_cycles_between(
            self.hw_compare(),
            self.counter.load(Ordering::Relaxed),
            self.mask,
        );
        late <= self.mask / 2
    }
}

impl HardwareClock for MockPort {
    fn read_cycles(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    fn compare(&self) -> u64 {
        self.compare.load(Ordering::Relaxed)
    }

    fn advance_compare(&self, delta: u64) {
        assert_ne!(self.cpu_lock_depth.load(Ordering::Relaxed), 0);
        let value = self.compare().wrapping_add(delta) & self.mask;
        self.compare.store(value, Ordering::Relaxed);
        self.hw_compare.store(value, Ordering::Relaxed);
    }

    fn set_wakeup(&self, at: u64) {
        assert_ne!(self.cpu_lock_depth.load(Ordering::Relaxed), 0);
        assert_eq!(at & self.mask, at);
        self.hw_compare.store(at, Ordering::Relaxed);
    }
}

impl TickGate for MockPort {
    fn stop(&self) {
        assert_ne!(self.cpu_lock_depth.load(Ordering::Relaxed), 0);
        assert!(self.tick_running.swap(false, Ordering::Relaxed));
        self.stops.fetch_add(1, Ordering::Relaxed);
    }

    fn start(&self) {
        assert_ne!(self.cpu_lock_depth.load(Ordering::Relaxed), 0);
        assert!(!self.tick_running.swap(true, Ordering::Relaxed));
        self.hw_compare.store(self.compare(), Ordering::Relaxed);
        self.starts.fetch_add(1, Ordering::Relaxed);
    }
}

impl CpuLock for MockPort {
    type Saved = u32;

    fn enter_cpu_lock(&self) -> u32 {
        self.cpu_lock_depth.fetch_add(1, Ordering::Relaxed)
    }

    unsafe fn leave_cpu_lock(&self, saved: u32) {
        self.cpu_lock_depth.store(saved, Ordering::Relaxed);
    }
}

impl Halt for MockPort {
    fn wait_for_interrupt(&self) {
        assert_ne!(self.cpu_lock_depth.load(Ordering::Relaxed), 0);
        self.halts.fetch_add(1, Ordering::Relaxed);

        let now = self.counter.load(Ordering::Relaxed);
        let until_match = wrapping_cycles_between(now, self.hw_compare(), self.mask);
        let advance = self.halt_advance.load(Ordering::Relaxed);
        let matched = advance >= until_match;
        self.halted_until_match.store(matched, Ordering::Relaxed);
        self.advance(advance.min(until_match));
    }
}

impl CpuId for MockPort {
    fn cpu_id(&self) -> usize {
        self.cpu.load(Ordering::Relaxed)
    }
}

impl Watchdog for MockPort {
    fn suspend_watchdog(&self) {
        self.suspends.fetch_add(1, Ordering::Relaxed);
    }

    fn resume_watchdog(&self) {
        self.resumes.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WorkCall {
    RunDue(u64),
    CheckDue(u64),
}

/// A [`PeriodicWork`] that records how it was called.
#[derive(Debug, Default)]
pub struct RecordingWork {
    pub calls: Mutex<Vec<WorkCall>>,
    pub next_deadline: Mutex<Option<u64>>,
}

impl RecordingWork {
    pub fn take_calls(&self) -> Vec<WorkCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

impl PeriodicWork for RecordingWork {
    fn run_due(&self, now: u64) {
        self.calls.lock().unwrap().push(WorkCall::RunDue(now));
    }

    fn check_due(&self, now: u64) {
        self.calls.lock().unwrap().push(WorkCall::CheckDue(now));
    }

    fn next_deadline(&self) -> Option<u64> {
        *self.next_deadline.lock().unwrap()
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
