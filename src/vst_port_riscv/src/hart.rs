/// The hart-local operations [`MtimePort`](crate::MtimePort) needs besides
/// the memory-mapped timer registers.
pub trait HartControl {
    /// Get the index of the current hart.
    fn hart_id(&self) -> usize;

    /// Clear `mstatus.MIE` and return its previous value.
    fn disable_interrupts(&self) -> bool;

    /// Set `mstatus.MIE` to `enabled`.
    ///
    /// # Safety
    ///
    /// Must be paired with a preceding call to [`Self::disable_interrupts`].
    unsafe fn restore_interrupts(&self, enabled: bool);

    /// Set or clear `mie.MTIE`.
    fn set_timer_interrupt_enabled(&self, enabled: bool);

    /// Execute `wfi`. An interrupt that is pending and enabled in `mie` ends
    /// the wait even if `mstatus.MIE` is clear.
    fn wait_for_interrupt(&self);
}

/// [`HartControl`] for code running in M-mode.
#[derive(Debug, Copy, Clone, Default)]
pub struct MachineHart;

#[cfg(target_os = "none")]
impl HartControl for MachineHart {
    #[inline]
    fn hart_id(&self) -> usize {
        riscv::register::mhartid::read()
    }

    #[inline]
    fn disable_interrupts(&self) -> bool {
        let enabled = riscv::register::mstatus::read().mie();
        // Safety: Masking interrupts is always allowed in M-mode
        unsafe { riscv::register::mstatus::clear_mie() };
        enabled
    }

    #[inline]
    unsafe fn restore_interrupts(&self, enabled: bool) {
        if enabled {
            // Safety: The caller is leaving the matching critical section
            unsafe { riscv::register::mstatus::set_mie() };
        }
    }

    #[inline]
    fn set_timer_interrupt_enabled(&self, enabled: bool) {
        // Safety: `MTIE` only gates the machine timer interrupt
        unsafe {
            if enabled {
                riscv::register::mie::set_mtimer();
            } else {
                riscv::register::mie::clear_mtimer();
            }
        }
    }

    #[inline]
    fn wait_for_interrupt(&self) {
        // Safety: `wfi` has no side effects other than stalling
        unsafe { riscv::asm::wfi() };
    }
}
