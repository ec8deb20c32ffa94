//! Simulation environment for running the tickless sleep reconciler on a
//! hosted environment.
//!
//! [`SimPort`] models a single processor with a free-running counter, an
//! equality-match compare register, and one external interrupt line. Time
//! only moves when the simulation is told to move it ([`SimPort::advance`])
//! or when the processor halts, in which case it fast-forwards to the next
//! interrupt.
//!
//! ```rust
//! use vst_kernel::TimerCfg;
//! use vst_port_std::boot;
//!
//! let cfg = TimerCfg::from_cycles_per_jiffy(1000, 32, 1_000_000).unwrap();
//! let vst = boot::<(), 1>(cfg, ());
//!
//! vst.port().schedule_external(5_500);
//! vst.sleep_until(10);
//! assert_eq!(vst.time_base().ticks(), 4);
//! assert_eq!(vst.diagnostics().external_exits, 1);
//! ```
use once_cell::sync::OnceCell;
use std::{
    fmt,
    sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
};
use vst_kernel::{
    num::wrapping_cycles_between, CpuId, CpuLock, Halt, HardwareClock, PeriodicWork, TickGate,
    TimerCfg, Vst, Watchdog,
};

pub extern crate env_logger;

/// The number of interrupts [`SimPort`] dispatches in a row before
/// concluding that an interrupt source is stuck.
const STORM_LIMIT: u32 = 1000;

/// An interrupt line of [`SimPort`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Interrupt {
    /// The compare register matched.
    Timer,
    External,
}

/// The handler [`SimPort`] calls for each interrupt. It's called with CPU
/// Lock inactive.
pub type InterruptHandler = &'static (dyn Fn(Interrupt) + Send + Sync);

/// A simulated processor and timer.
pub struct SimPort {
    mask: u64,
    /// The simulated time, measured in cycles. The counter is its low bits.
    time: AtomicU64,
    /// The next periodic tick.
    compare: AtomicU64,
    hw_compare: AtomicU64,
    tick_enabled: AtomicBool,
    cpu_lock: AtomicBool,
    in_interrupt: AtomicBool,
    timer_pending: AtomicBool,
    external_pending: AtomicBool,
    /// Sorted in ascending order.
    external_schedule: spin::Mutex<Vec<u64>>,
    handler: OnceCell<InterruptHandler>,
    cpu: AtomicUsize,
    stats: SimStats,
}

/// Event counters of [`SimPort`].
#[derive(Debug, Default)]
struct SimStats {
    tick_stops: AtomicU32,
    tick_starts: AtomicU32,
    watchdog_suspends: AtomicU32,
    watchdog_resumes: AtomicU32,
    halts: AtomicU32,
    timer_interrupts: AtomicU32,
    external_interrupts: AtomicU32,
}

/// A copy of [`SimPort`]'s event counters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct SimStatsSnapshot {
    pub tick_stops: u32,
    pub tick_starts: u32,
    pub watchdog_suspends: u32,
    pub watchdog_resumes: u32,
    pub halts: u32,
    pub timer_interrupts: u32,
    pub external_interrupts: u32,
}

impl fmt::Debug for SimPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SimPort")
            .field("time", &self.time())
            .field("compare", &self.compare())
            .field("hw_compare", &self.hw_compare())
            .field("tick_enabled", &self.tick_enabled.load(Ordering::Relaxed))
            .field("cpu_lock", &self.cpu_lock.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SimPort {
    /// Construct a `SimPort` at time zero with the first tick due after one
    /// tick period.
    pub fn new(cfg: &TimerCfg) -> Self {
        let first_tick = cfg.cycles_per_jiffy() as u64;
        Self {
            mask: cfg.counter_mask(),
            time: AtomicU64::new(0),
            compare: AtomicU64::new(first_tick),
            hw_compare: AtomicU64::new(first_tick),
            tick_enabled: AtomicBool::new(true),
            cpu_lock: AtomicBool::new(false),
            in_interrupt: AtomicBool::new(false),
            timer_pending: AtomicBool::new(false),
            external_pending: AtomicBool::new(false),
            external_schedule: spin::Mutex::new(Vec::new()),
            handler: OnceCell::new(),
            cpu: AtomicUsize::new(0),
            stats: SimStats::default(),
        }
    }

    /// Register the interrupt handler. Returns `false` if one has already
    /// been registered.
    pub fn set_handler(&self, handler: InterruptHandler) -> bool {
        self.handler.set(handler).is_ok()
    }

    /// Get the simulated time, measured in cycles.
    pub fn time(&self) -> u64 {
        self.time.load(Ordering::SeqCst)
    }

    /// Get the value the hardware compare register is programmed with.
    pub fn hw_compare(&self) -> u64 {
        self.hw_compare.load(Ordering::SeqCst)
    }

    pub fn is_cpu_lock_active(&self) -> bool {
        self.cpu_lock.load(Ordering::SeqCst)
    }

    /// Select the processor subsequent calls are made on behalf of.
    pub fn set_cpu(&self, cpu: usize) {
        self.cpu.store(cpu, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SimStatsSnapshot {
        let s = &self.stats;
        SimStatsSnapshot {
            tick_stops: s.tick_stops.load(Ordering::Relaxed),
            tick_starts: s.tick_starts.load(Ordering::Relaxed),
            watchdog_suspends: s.watchdog_suspends.load(Ordering::Relaxed),
            watchdog_resumes: s.watchdog_resumes.load(Ordering::Relaxed),
            halts: s.halts.load(Ordering::Relaxed),
            timer_interrupts: s.timer_interrupts.load(Ordering::Relaxed),
            external_interrupts: s.external_interrupts.load(Ordering::Relaxed),
        }
    }

    /// Schedule the external interrupt line to be asserted at the simulated
    /// time `at`. A time in the past asserts it immediately.
    pub fn schedule_external(&self, at: u64) {
        {
            let mut schedule = self.external_schedule.lock();
            let i = schedule.partition_point(|&t| t <= at);
            schedule.insert(i, at);
        }
        let now = self.time();
        if at <= now {
            self.latch(now);
            self.poll();
        }
    }

    /// Assert the external interrupt line now.
    pub fn raise_external(&self) {
        log::trace!("raise_external at {}", self.time());
        self.external_pending.store(true, Ordering::SeqCst);
        self.poll();
    }

    /// Move the simulated time forward by `cycles`, taking interrupts as
    /// they occur.
    pub fn advance(&self, cycles: u64) {
        let end = self.time().saturating_add(cycles);
        loop {
            match self.next_event(self.time()) {
                Some(at) if at <= end => {
                    self.time.store(at, Ordering::SeqCst);
                    self.latch(at);
                    self.poll();
                }
                _ => break,
            }
        }
        self.time.store(end, Ordering::SeqCst);
    }

    /// Take pending interrupts if CPU Lock is inactive and no interrupt
    /// handler is running.
    pub fn poll(&self) {
        if self.is_cpu_lock_active() {
            return;
        }
        let Some(handler) = self.handler.get() else {
            return;
        };
        if self.in_interrupt.swap(true, Ordering::SeqCst) {
            // Tail-chained after the running handler
            return;
        }

        for _ in 0..STORM_LIMIT {
            let irq = if self.timer_pending.swap(false, Ordering::SeqCst) {
                self.stats.timer_interrupts.fetch_add(1, Ordering::Relaxed);
                Interrupt::Timer
            } else if self.external_pending.swap(false, Ordering::SeqCst) {
                self.stats.external_interrupts.fetch_add(1, Ordering::Relaxed);
                Interrupt::External
            } else {
                self.in_interrupt.store(false, Ordering::SeqCst);
                return;
            };

            log::trace!("taking {:?} interrupt at {}", irq, self.time());
            handler(irq);
        }

        panic!("interrupt storm: more than {STORM_LIMIT} interrupts taken in a row");
    }

    /// Get the earliest simulated time after `now` at which an interrupt
    /// source asserts its line.
    fn next_event(&self, now: u64) -> Option<u64> {
        let external = self.external_schedule.lock().first().copied();

        let timer = if self.tick_enabled.load(Ordering::SeqCst) {
            let until_match = wrapping_cycles_between(now & self.mask, self.hw_compare(), self.mask);
            if until_match != 0 {
                now.checked_add(until_match)
            } else {
                // A full period from now
                self.mask.checked_add(1).and_then(|period| now.checked_add(period))
            }
        } else {
            None
        };

        match (timer, external) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Latch the interrupt lines asserted at `now`.
    fn latch(&self, now: u64) {
        if self.tick_enabled.load(Ordering::SeqCst) && now & self.mask == self.hw_compare() {
            self.timer_pending.store(true, Ordering::SeqCst);
        }

        let mut schedule = self.external_schedule.lock();
        let num_due = schedule.partition_point(|&t| t <= now);
        if num_due > 0 {
            schedule.drain(..num_due);
            self.external_pending.store(true, Ordering::SeqCst);
        }
    }

    fn any_pending(&self) -> bool {
        self.timer_pending.load(Ordering::SeqCst) || self.external_pending.load(Ordering::SeqCst)
    }
}

impl HardwareClock for SimPort {
    fn read_cycles(&self) -> u64 {
        self.time() & self.mask
    }

    fn compare(&self) -> u64 {
        self.compare.load(Ordering::SeqCst)
    }

    fn advance_compare(&self, delta: u64) {
        let value = self.compare().wrapping_add(delta) & self.mask;
        self.compare.store(value, Ordering::SeqCst);
        self.hw_compare.store(value, Ordering::SeqCst);
    }

    fn set_wakeup(&self, at: u64) {
        debug_assert_eq!(at & self.mask, at);
        self.hw_compare.store(at, Ordering::SeqCst);
    }
}

impl TickGate for SimPort {
    fn stop(&self) {
        self.stats.tick_stops.fetch_add(1, Ordering::Relaxed);
        self.tick_enabled.store(false, Ordering::SeqCst);
        self.timer_pending.store(false, Ordering::SeqCst);
    }

    fn start(&self) {
        self.stats.tick_starts.fetch_add(1, Ordering::Relaxed);
        let compare = self.compare();
        self.hw_compare.store(compare, Ordering::SeqCst);
        self.tick_enabled.store(true, Ordering::SeqCst);

        // The match register only fires on equality. If the counter is
        // already at or past the compare value, pend the interrupt manually.
        let late = wrapping_cycles_between(compare, self.read_cycles(), self.mask);
        if late <= self.mask / 2 {
            self.timer_pending.store(true, Ordering::SeqCst);
        }
    }
}

impl CpuLock for SimPort {
    type Saved = bool;

    fn enter_cpu_lock(&self) -> bool {
        self.cpu_lock.swap(true, Ordering::SeqCst)
    }

    unsafe fn leave_cpu_lock(&self, saved: bool) {
        self.cpu_lock.store(saved, Ordering::SeqCst);
        if !saved {
            self.poll();
        }
    }
}

impl Halt for SimPort {
    fn wait_for_interrupt(&self) {
        assert!(self.is_cpu_lock_active(), "halted without CPU Lock");
        self.stats.halts.fetch_add(1, Ordering::Relaxed);

        if self.any_pending() {
            return;
        }

        let now = self.time();
        let Some(at) = self.next_event(now) else {
            panic!("halted at {now} with no interrupt source; the processor would sleep forever");
        };
        log::trace!("halting from {} to {}", now, at);
        self.time.store(at, Ordering::SeqCst);
        self.latch(at);
    }
}

impl CpuId for SimPort {
    fn cpu_id(&self) -> usize {
        self.cpu.load(Ordering::Relaxed)
    }
}

impl Watchdog for SimPort {
    fn suspend_watchdog(&self) {
        self.stats.watchdog_suspends.fetch_add(1, Ordering::Relaxed);
    }

    fn resume_watchdog(&self) {
        self.stats.watchdog_resumes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Route `vst`'s port's interrupts to `vst`'s interrupt glue.
pub fn attach<W, const NUM_CPUS: usize>(vst: &'static Vst<SimPort, W, NUM_CPUS>) -> bool
where
    W: PeriodicWork + Send + Sync + 'static,
{
    let handler: InterruptHandler = Box::leak(Box::new(move |irq: Interrupt| match irq {
        Interrupt::Timer => vst.handle_timer_interrupt(),
        Interrupt::External => vst.handle_external_interrupt(),
    }));
    vst.port().set_handler(handler)
}

/// Construct a `Vst` on a fresh [`SimPort`], leak it, and attach the
/// interrupt handler.
pub fn boot<W, const NUM_CPUS: usize>(cfg: TimerCfg, work: W) -> &'static Vst<SimPort, W, NUM_CPUS>
where
    W: PeriodicWork + Send + Sync + 'static,
{
    let vst = Box::leak(Box::new(Vst::new(SimPort::new(&cfg), work, cfg)));
    let attached = attach(vst);
    debug_assert!(attached);
    vst
}

/// Initialize `env_logger` for a test.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn cfg() -> TimerCfg {
        TimerCfg::from_cycles_per_jiffy(100, 16, 1_000_000).unwrap()
    }

    fn recording_port() -> (&'static SimPort, &'static Mutex<Vec<(Interrupt, u64)>>) {
        init_logger();
        let port: &'static SimPort = Box::leak(Box::new(SimPort::new(&cfg())));
        let log: &'static Mutex<Vec<(Interrupt, u64)>> = Box::leak(Box::default());
        port.set_handler(Box::leak(Box::new(move |irq: Interrupt| {
            log.lock().unwrap().push((irq, port.time()));
            if irq == Interrupt::Timer {
                // Re-arm like the tick path does
                port.cpu_lock.store(true, Ordering::SeqCst);
                port.advance_compare(100);
                unsafe { port.leave_cpu_lock(false) };
            }
        })));
        (port, log)
    }

    #[test]
    fn timer_matches_on_time() {
        let (port, log) = recording_port();
        port.advance(350);
        assert_eq!(
            *log.lock().unwrap(),
            [
                (Interrupt::Timer, 100),
                (Interrupt::Timer, 200),
                (Interrupt::Timer, 300)
            ]
        );
        assert_eq!(port.time(), 350);
        assert_eq!(port.hw_compare(), 400);
    }

    #[test]
    fn cpu_lock_defers_interrupts() {
        let (port, log) = recording_port();
        port.schedule_external(50);

        let saved = port.enter_cpu_lock();
        port.advance(120);
        assert!(log.lock().unwrap().is_empty());
        unsafe { port.leave_cpu_lock(saved) };

        assert_eq!(
            *log.lock().unwrap(),
            [(Interrupt::Timer, 120), (Interrupt::External, 120)]
        );
    }

    #[test]
    fn halt_fast_forwards() {
        let (port, log) = recording_port();
        port.schedule_external(40);

        let saved = port.enter_cpu_lock();
        port.wait_for_interrupt();
        assert_eq!(port.time(), 40);
        unsafe { port.leave_cpu_lock(saved) };
        assert_eq!(*log.lock().unwrap(), [(Interrupt::External, 40)]);

        let saved = port.enter_cpu_lock();
        port.wait_for_interrupt();
        assert_eq!(port.time(), 100);
        unsafe { port.leave_cpu_lock(saved) };
    }

    #[test]
    fn counter_wraps() {
        let (port, log) = recording_port();
        let saved = port.enter_cpu_lock();
        port.set_wakeup(50);
        port.advance(0x1_0000);
        assert_eq!(port.read_cycles(), 0);
        unsafe { port.leave_cpu_lock(saved) };
        // Matched at 50 and taken after the wrap-around. The handler re-arms
        // from the next periodic tick, not from the wakeup.
        assert_eq!(*log.lock().unwrap(), [(Interrupt::Timer, 0x1_0000)]);
        assert_eq!(port.hw_compare(), 200);
    }

    #[test]
    fn start_pends_late_compare() {
        let (port, _) = recording_port();
        let saved = port.enter_cpu_lock();
        port.stop();
        port.advance(250);
        assert!(!port.any_pending());
        port.start();
        assert!(port.timer_pending.load(Ordering::SeqCst));
        unsafe { port.leave_cpu_lock(saved) };
        assert!(!port.any_pending());
        assert_eq!(port.stats().timer_interrupts, 1);
    }

    #[should_panic(expected = "no interrupt source")]
    #[test]
    fn halt_without_source_panics() {
        init_logger();
        let port = SimPort::new(&cfg());
        port.enter_cpu_lock();
        port.stop();
        port.wait_for_interrupt();
    }
}
