//! The RISC-V port of the tickless sleep reconciler, driving the machine
//! timer (`mtime`/`mtimecmp`).
//!
//! ```rust,ignore
//! use vst_kernel::Vst;
//! use vst_port_riscv::{MachineHart, MtimeOptions, MtimePort};
//!
//! const OPTIONS: MtimeOptions = MtimeOptions {
//!     mtime_ptr: 0x0200_bff8,
//!     mtimecmp_ptr: 0x0200_4000,
//!     frequency: 10_000_000,
//!     frequency_denominator: 1,
//!     jiffies_per_sec: 100,
//! };
//!
//! static VST: Vst<MtimePort<MachineHart>, (), 1> = Vst::new(
//!     // Safety: The registers are mapped at these addresses on this board
//!     unsafe { MtimePort::new(&OPTIONS, MachineHart) },
//!     (),
//!     OPTIONS.timer_cfg(),
//! );
//!
//! // The machine timer interrupt handler
//! fn handle_mti() {
//!     VST.handle_timer_interrupt();
//! }
//!
//! // The machine external interrupt handler
//! fn handle_mei() {
//!     VST.handle_external_interrupt();
//!     /* dispatch to the PLIC */
//! }
//! ```
#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

/// The machine timer driver.
pub mod mtime {
    pub mod cfg;
    pub mod imp;
}

/// Hart-local control: interrupt masking, timer interrupt enable, and
/// halting.
pub mod hart;

pub use self::hart::*;
pub use self::mtime::{cfg::*, imp::MtimePort};
