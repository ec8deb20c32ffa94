//! The implementation of the general-purpose timer port.
use core::sync::atomic::{AtomicU32, Ordering};
use tock_registers::interfaces::{Readable, Writeable};
use vst_kernel::{
    port::lock_cpu, CpuId, CpuLock, Halt, HardwareClock, PeriodicWork, TickGate, Vst, Watchdog,
};

use crate::{
    core_control::CoreControl,
    gptimer::{cfg::GpTimerOptions, gptimer_regs},
};

/// A [`Port`](vst_kernel::Port) built on a general-purpose timer.
///
/// The timer runs in auto-reload mode with `TLDR = 0`, so `TCRR` is a 32-bit
/// free-running up-counter, and raises an interrupt when `TCRR` becomes equal
/// to `TMAR`. A match value the counter has already gone past never fires,
/// so every write to `TMAR` is followed by a check that pends the interrupt
/// manually in that case.
///
/// The timer has no separate gate for the match interrupt that the
/// reconciler could use, so [`TickGate::stop`] is a no-op. CPU Lock, which
/// is held while the match register is repositioned, keeps the interrupt
/// from being taken in the meantime.
#[derive(Debug)]
pub struct GpTimerPort<C> {
    gptimer_base: usize,
    /// The next periodic tick.
    compare: AtomicU32,
    core: C,
}

impl<C> GpTimerPort<C> {
    /// Construct a `GpTimerPort`. The first tick is due one tick period after
    /// [`Self::init`].
    ///
    /// # Safety
    ///
    /// `options.gptimer_base` must point to the timer's register block, and
    /// nothing else may use the timer.
    pub const unsafe fn new(options: &GpTimerOptions, core: C) -> Self {
        Self {
            gptimer_base: options.gptimer_base,
            compare: AtomicU32::new(options.timer_cfg().cycles_per_jiffy()),
            core,
        }
    }

    #[inline]
    pub fn core(&self) -> &C {
        &self.core
    }

    #[inline(always)]
    fn regs(&self) -> &gptimer_regs::GpTimer {
        // Safety: Verified by the caller of `new`
        unsafe { &*(self.gptimer_base as *const gptimer_regs::GpTimer) }
    }

    #[inline]
    fn counter(&self) -> u32 {
        self.regs().TCRR.get()
    }

    /// Acknowledge the match interrupt.
    #[inline]
    pub fn clear_match(&self) {
        self.regs().TISR.write(gptimer_regs::Irq::MAT::SET);
    }
}

impl<C: CoreControl> GpTimerPort<C> {
    /// Reset the counter and start the timer. Call this once at boot.
    pub fn init(&self) {
        use gptimer_regs::{Irq, Tclr};
        let _cpu_lock = lock_cpu(self);
        let regs = self.regs();

        regs.TCLR.write(Tclr::ST::Stop);
        regs.TIER.set(0);
        regs.TISR.write(Irq::MAT::SET + Irq::OVF::SET + Irq::TCAR::SET);
        regs.TLDR.set(0);
        regs.TCRR.set(0);
        regs.TMAR.set(self.compare.load(Ordering::Relaxed));
        regs.TIER.write(Irq::MAT::SET);
        regs.TCLR.write(
            Tclr::ST::Start + Tclr::AR::AutoReload + Tclr::PRE::Disable + Tclr::CE::Enable,
        );
    }

    /// Program `TMAR` with `value`. If the counter reaches `value` while it's
    /// being written, pend the interrupt manually because the timer might not
    /// have generated one.
    fn set_match(&self, value: u32) {
        let before = self.counter();
        self.regs().TMAR.set(value);
        let after = self.counter();

        if after.wrapping_sub(before) >= value.wrapping_sub(before) {
            self.core.pend_match_interrupt();
        }
    }
}

impl<C: CoreControl> HardwareClock for GpTimerPort<C> {
    #[inline]
    fn read_cycles(&self) -> u64 {
        self.counter() as u64
    }

    #[inline]
    fn compare(&self) -> u64 {
        self.compare.load(Ordering::Relaxed) as u64
    }

    fn advance_compare(&self, delta: u64) {
        let value = self
            .compare
            .load(Ordering::Relaxed)
            .wrapping_add(delta as u32);
        self.compare.store(value, Ordering::Relaxed);
        self.set_match(value);
    }

    #[inline]
    fn set_wakeup(&self, at: u64) {
        self.set_match(at as u32);
    }
}

impl<C: CoreControl> TickGate for GpTimerPort<C> {
    #[inline]
    fn stop(&self) {}

    fn start(&self) {
        // Discard the match that ended the sleep
        self.clear_match();

        let compare = self.compare.load(Ordering::Relaxed);
        self.regs().TMAR.set(compare);

        // The restored value is less than a tick period away from the
        // counter, in either direction. Did we go past it already?
        if self.counter().wrapping_sub(compare) <= u32::MAX / 2 {
            self.core.pend_match_interrupt();
        }
    }
}

impl<C: CoreControl> CpuLock for GpTimerPort<C> {
    type Saved = bool;

    #[inline]
    fn enter_cpu_lock(&self) -> bool {
        self.core.disable_irq()
    }

    #[inline]
    unsafe fn leave_cpu_lock(&self, saved: bool) {
        // Safety: Upheld by the caller
        unsafe { self.core.restore_irq(saved) };
    }
}

impl<C: CoreControl> Halt for GpTimerPort<C> {
    #[inline]
    fn wait_for_interrupt(&self) {
        self.core.wait_for_interrupt();
    }
}

impl<C: CoreControl> CpuId for GpTimerPort<C> {
    #[inline]
    fn cpu_id(&self) -> usize {
        self.core.cpu_id()
    }
}

impl<C> Watchdog for GpTimerPort<C> {}

/// The handler for the timer's interrupt line.
pub fn handle_match_interrupt<C, W, const NUM_CPUS: usize>(
    vst: &Vst<GpTimerPort<C>, W, NUM_CPUS>,
) where
    C: CoreControl,
    W: PeriodicWork,
{
    // Acknowledge first so that a match during the handler is not lost
    vst.port().clear_match();
    vst.handle_timer_interrupt();
}
