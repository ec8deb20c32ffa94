//! The Armv7-A port of the tickless sleep reconciler, driving a
//! general-purpose timer with a 32-bit up-counter and a match register
//! (e.g., OMAP3 GPTIMER).
//!
//! ```rust,ignore
//! use vst_kernel::Vst;
//! use vst_port_arm::{Armv7a, GpTimerOptions, GpTimerPort};
//!
//! const OPTIONS: GpTimerOptions = GpTimerOptions {
//!     gptimer_base: 0x4831_8000,
//!     frequency: 32_768,
//!     frequency_denominator: 1,
//!     jiffies_per_sec: 128,
//! };
//!
//! static VST: Vst<GpTimerPort<Armv7a>, (), 1> = Vst::new(
//!     // Safety: GPTIMER1 is mapped at this address on this SoC
//!     unsafe { GpTimerPort::new(&OPTIONS, Armv7a { pend_match_interrupt: pend_gpt1 }) },
//!     (),
//!     OPTIONS.timer_cfg(),
//! );
//!
//! fn pend_gpt1() {
//!     /* set the pending bit of GPTIMER1's interrupt line */
//! }
//!
//! // GPTIMER1's interrupt handler
//! fn handle_gpt1() {
//!     vst_port_arm::handle_match_interrupt(&VST);
//! }
//! ```
#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

/// The general-purpose timer driver.
pub mod gptimer {
    pub mod cfg;
    pub mod gptimer_regs;
    pub mod imp;
}

/// Processor-local control: interrupt masking, pending the timer interrupt,
/// and halting.
pub mod core_control;

pub use self::core_control::*;
pub use self::gptimer::{
    cfg::*,
    imp::{handle_match_interrupt, GpTimerPort},
};
