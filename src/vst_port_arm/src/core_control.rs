/// The processor-local operations [`GpTimerPort`](crate::GpTimerPort) needs
/// besides the timer's registers.
pub trait CoreControl {
    /// Get the index of the current processor.
    fn cpu_id(&self) -> usize;

    /// Set `CPSR.I` and return `true` if IRQs were unmasked before.
    fn disable_irq(&self) -> bool;

    /// Clear `CPSR.I` if `enabled` is `true`.
    ///
    /// # Safety
    ///
    /// Must be paired with a preceding call to [`Self::disable_irq`].
    unsafe fn restore_irq(&self, enabled: bool);

    /// Set the pending bit of the timer's interrupt line in the interrupt
    /// controller.
    fn pend_match_interrupt(&self);

    /// Execute `wfi`. A pending IRQ ends the wait even if `CPSR.I` is set.
    fn wait_for_interrupt(&self);
}

/// [`CoreControl`] for an Armv7-A processor.
#[derive(Debug, Copy, Clone)]
pub struct Armv7a {
    /// Pends the timer's interrupt line. Interrupt controllers differ between
    /// SoCs, so this is supplied by the system.
    pub pend_match_interrupt: fn(),
}

#[cfg(target_arch = "arm")]
impl CoreControl for Armv7a {
    #[inline]
    fn cpu_id(&self) -> usize {
        let mpidr: u32;
        // Safety: Reading MPIDR has no side effects
        unsafe { core::arch::asm!("mrc p15, 0, {}, c0, c0, 5", out(reg) mpidr) };
        (mpidr & 0xff) as usize
    }

    #[inline]
    fn disable_irq(&self) -> bool {
        let cpsr: u32;
        // Safety: Masking IRQs is always allowed in a privileged mode
        unsafe {
            core::arch::asm!("mrs {}, cpsr", out(reg) cpsr);
            core::arch::asm!("cpsid i");
        }
        (cpsr & (1 << 7)) == 0
    }

    #[inline]
    unsafe fn restore_irq(&self, enabled: bool) {
        if enabled {
            // Safety: The caller is leaving the matching critical section
            unsafe { core::arch::asm!("cpsie i") };
        }
    }

    #[inline]
    fn pend_match_interrupt(&self) {
        (self.pend_match_interrupt)();
    }

    #[inline]
    fn wait_for_interrupt(&self) {
        // Safety: `wfi` has no side effects other than stalling
        unsafe { core::arch::asm!("wfi") };
    }
}
