//! The implementation of the `mtime`-based port.
use core::sync::atomic::{AtomicU64, Ordering};
use tock_registers::{
    interfaces::{Readable, Writeable},
    registers::ReadWrite,
};
use vst_kernel::{port::lock_cpu, CpuId, CpuLock, Halt, HardwareClock, TickGate, Watchdog};

use crate::{hart::HartControl, mtime::cfg::MtimeOptions};

/// A [`Port`](vst_kernel::Port) built on the machine timer of the current
/// hart.
///
/// `mtime` is a 64-bit counter that doesn't wrap around in practice, and
/// the timer interrupt is asserted for as long as `mtime >= mtimecmp`. A
/// compare value that is already behind the counter therefore raises the
/// interrupt as soon as it's enabled, and no manual pending is needed.
#[derive(Debug)]
pub struct MtimePort<H> {
    mtime_ptr: usize,
    mtimecmp_ptr: usize,
    /// The next periodic tick.
    compare: AtomicU64,
    hart: H,
}

impl<H> MtimePort<H> {
    /// Construct an `MtimePort`. The first tick is due one tick period after
    /// `mtime` was zero; if `mtime` wasn't reset at boot, the ordinary tick
    /// path catches up on the first timer interrupt.
    ///
    /// # Safety
    ///
    /// `options.mtime_ptr` and `options.mtimecmp_ptr` must point to the
    /// `mtime` register and the current hart's `mtimecmp` register, and
    /// nothing else may write `mtimecmp`.
    pub const unsafe fn new(options: &MtimeOptions, hart: H) -> Self {
        Self {
            mtime_ptr: options.mtime_ptr,
            mtimecmp_ptr: options.mtimecmp_ptr,
            compare: AtomicU64::new(options.timer_cfg().cycles_per_jiffy() as u64),
            hart,
        }
    }

    #[inline]
    pub fn hart(&self) -> &H {
        &self.hart
    }

    #[inline(always)]
    fn mtime_reg32(&self) -> &[ReadWrite<u32>; 2] {
        // Safety: Verified by the caller of `new`
        unsafe { &*(self.mtime_ptr as *const _) }
    }

    #[inline(always)]
    fn mtimecmp_reg32(&self) -> &[ReadWrite<u32>; 2] {
        // Safety: Verified by the caller of `new`
        unsafe { &*(self.mtimecmp_ptr as *const _) }
    }

    #[cfg(target_arch = "riscv64")]
    #[inline(always)]
    fn mtime(&self) -> u64 {
        // Safety: Verified by the caller of `new`
        let reg: &ReadWrite<u64> = unsafe { &*(self.mtime_ptr as *const _) };
        reg.get()
    }

    #[cfg(not(target_arch = "riscv64"))]
    #[inline(always)]
    fn mtime(&self) -> u64 {
        loop {
            let hi1 = self.mtime_reg32()[1].get();
            let lo = self.mtime_reg32()[0].get();
            let hi2 = self.mtime_reg32()[1].get();
            if hi1 == hi2 {
                return lo as u64 | ((hi2 as u64) << 32);
            }
        }
    }

    /// Get the value `mtimecmp` is currently programmed with.
    pub fn mtimecmp(&self) -> u64 {
        let reg = self.mtimecmp_reg32();
        reg[0].get() as u64 | ((reg[1].get() as u64) << 32)
    }

    /// Program `mtimecmp` with two 32-bit writes. The low half is parked at
    /// its maximum first so that the intermediate value is never below both
    /// the old and the new one.
    fn set_mtimecmp(&self, value: u64) {
        let reg = self.mtimecmp_reg32();
        reg[0].set(u32::MAX);
        reg[1].set((value >> 32) as u32);
        reg[0].set(value as u32);
    }
}

impl<H: HartControl> MtimePort<H> {
    /// Program `mtimecmp` for the first tick and enable the timer interrupt.
    /// Call this once at boot.
    pub fn init(&self) {
        let _cpu_lock = lock_cpu(self);
        self.start();
    }
}

impl<H> HardwareClock for MtimePort<H> {
    #[inline]
    fn read_cycles(&self) -> u64 {
        self.mtime()
    }

    #[inline]
    fn compare(&self) -> u64 {
        self.compare.load(Ordering::Relaxed)
    }

    fn advance_compare(&self, delta: u64) {
        let value = self.compare().wrapping_add(delta);
        self.compare.store(value, Ordering::Relaxed);
        self.set_mtimecmp(value);
    }

    #[inline]
    fn set_wakeup(&self, at: u64) {
        self.set_mtimecmp(at);
    }
}

impl<H: HartControl> TickGate for MtimePort<H> {
    #[inline]
    fn stop(&self) {
        self.hart.set_timer_interrupt_enabled(false);
    }

    fn start(&self) {
        self.set_mtimecmp(self.compare());
        self.hart.set_timer_interrupt_enabled(true);
    }
}

impl<H: HartControl> CpuLock for MtimePort<H> {
    type Saved = bool;

    #[inline]
    fn enter_cpu_lock(&self) -> bool {
        self.hart.disable_interrupts()
    }

    #[inline]
    unsafe fn leave_cpu_lock(&self, saved: bool) {
        // Safety: Upheld by the caller
        unsafe { self.hart.restore_interrupts(saved) };
    }
}

impl<H: HartControl> Halt for MtimePort<H> {
    #[inline]
    fn wait_for_interrupt(&self) {
        self.hart.wait_for_interrupt();
    }
}

impl<H: HartControl> CpuId for MtimePort<H> {
    #[inline]
    fn cpu_id(&self) -> usize {
        self.hart.hart_id()
    }
}

impl<H> Watchdog for MtimePort<H> {}
