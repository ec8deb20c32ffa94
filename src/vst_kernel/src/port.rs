//! The per-architecture capabilities the reconciler is built upon.
//!
//! A port implements these traits on a single type, which is then passed to
//! [`Vst::new`](crate::Vst::new). The methods are called with CPU Lock active
//! unless stated otherwise.

/// A free-running hardware counter paired with a compare register that raises
/// an interrupt when the counter reaches it.
pub trait HardwareClock {
    /// Read the current counter value. Only the low
    /// [`TimerCfg::counter_width`](crate::TimerCfg::counter_width) bits are
    /// meaningful.
    ///
    /// May be called without CPU Lock.
    fn read_cycles(&self) -> u64;

    /// Get the counter value at which the next periodic tick fires.
    ///
    /// This is the value the ordinary tick path maintains. It's left untouched
    /// by [`Self::set_wakeup`].
    fn compare(&self) -> u64;

    /// Move the next periodic tick `delta` cycles forward (modulo the counter
    /// width) and program the hardware compare register accordingly.
    fn advance_compare(&self, delta: u64);

    /// Program the hardware compare register to fire at `at` without moving
    /// the next periodic tick. Used to arm a wakeup before halting.
    fn set_wakeup(&self, at: u64);
}

/// Control over delivery of the periodic tick interrupt.
///
/// [`Self::stop`] and [`Self::start`] are always called as a pair, in this
/// order, by [`Vst::on_wake`](crate::Vst::on_wake).
pub trait TickGate {
    /// Quiesce the periodic tick source while the compare register is being
    /// repositioned.
    ///
    /// A timer without a separate enable bit may implement this as a no-op,
    /// in which case CPU Lock alone keeps the tick from being observed.
    fn stop(&self);

    /// Program the hardware compare register from [`HardwareClock::compare`]
    /// and re-enable the periodic tick source.
    fn start(&self);
}

/// Masking of all interrupts on the current processor ("CPU Lock").
pub trait CpuLock {
    /// The interrupt state to restore when leaving CPU Lock.
    type Saved: Copy;

    /// Enter CPU Lock and return the previous interrupt state.
    fn enter_cpu_lock(&self) -> Self::Saved;

    /// Restore the interrupt state returned by the matching call to
    /// [`Self::enter_cpu_lock`].
    ///
    /// # Safety
    ///
    /// `saved` must be the value returned by the most recent unmatched call
    /// to `enter_cpu_lock` on the current processor.
    unsafe fn leave_cpu_lock(&self, saved: Self::Saved);
}

/// RAII guard for CPU Lock, returned by [`lock_cpu`].
pub struct CpuLockGuard<'a, L: CpuLock + ?Sized> {
    lock: &'a L,
    saved: L::Saved,
}

/// Enter CPU Lock, returning a guard that leaves it when dropped.
#[inline]
pub fn lock_cpu<L: CpuLock + ?Sized>(lock: &L) -> CpuLockGuard<'_, L> {
    CpuLockGuard {
        saved: lock.enter_cpu_lock(),
        lock,
    }
}

impl<L: CpuLock + ?Sized> Drop for CpuLockGuard<'_, L> {
    #[inline]
    fn drop(&mut self) {
        // Safety: `saved` came from `enter_cpu_lock`, and guards are dropped
        //         in reverse order of creation
        unsafe { self.lock.leave_cpu_lock(self.saved) };
    }
}

/// Halting the current processor.
pub trait Halt {
    /// Halt until an interrupt is pending. Returns with CPU Lock still
    /// active; the pending interrupt is taken when CPU Lock is released.
    fn wait_for_interrupt(&self);
}

/// Identification of the current processor.
pub trait CpuId {
    /// Get the index of the current processor, in range `0..NUM_CPUS`.
    #[inline]
    fn cpu_id(&self) -> usize {
        0
    }
}

/// Suspension of a hardware or software lockup watchdog.
///
/// On a multi-processor system, a sleeping processor stops servicing its
/// watchdog. [`Vst`](crate::Vst) suspends the watchdog when the first
/// processor goes to sleep and resumes it when the last one wakes up. On a
/// single-processor system these methods are never called.
pub trait Watchdog {
    #[inline]
    fn suspend_watchdog(&self) {}

    #[inline]
    fn resume_watchdog(&self) {}
}

/// All the capabilities a port provides.
pub trait Port: HardwareClock + TickGate + CpuLock + Halt + CpuId + Watchdog {}

impl<T: HardwareClock + TickGate + CpuLock + Halt + CpuId + Watchdog + ?Sized> Port for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct Counter {
        depth: Cell<u32>,
    }

    impl CpuLock for Counter {
        type Saved = u32;

        fn enter_cpu_lock(&self) -> u32 {
            let old = self.depth.get();
            self.depth.set(old + 1);
            old
        }

        unsafe fn leave_cpu_lock(&self, saved: u32) {
            self.depth.set(saved);
        }
    }

    #[test]
    fn guards_nest() {
        let lock = Counter {
            depth: Cell::new(0),
        };
        {
            let _outer = lock_cpu(&lock);
            assert_eq!(lock.depth.get(), 1);
            {
                let _inner = lock_cpu(&lock);
                assert_eq!(lock.depth.get(), 2);
            }
            assert_eq!(lock.depth.get(), 1);
        }
        assert_eq!(lock.depth.get(), 0);
    }
}
