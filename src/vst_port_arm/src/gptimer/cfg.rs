//! The public interface for the general-purpose timer driver.
use vst_kernel::{TimerCfg, TimerOptions};

/// The options for [`GpTimerPort`](crate::GpTimerPort).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GpTimerOptions {
    /// The base address of the timer's register block.
    pub gptimer_base: usize,

    /// The numerator of the effective timer clock rate, after the
    /// prescaler.
    pub frequency: u64,

    /// The denominator of the effective timer clock rate. Defaults to `1`.
    pub frequency_denominator: u64,

    /// The tick rate.
    pub jiffies_per_sec: u32,
}

impl GpTimerOptions {
    /// The width of `TCRR`, measured in bits.
    pub const COUNTER_WIDTH: u32 = 32;

    /// Derive the timer configuration, panicking on a misconfiguration.
    pub const fn timer_cfg(&self) -> TimerCfg {
        match TimerCfg::new(TimerOptions {
            hw_freq_num: self.frequency,
            hw_freq_denom: self.frequency_denominator,
            jiffies_per_sec: self.jiffies_per_sec,
            counter_width: Self::COUNTER_WIDTH,
        }) {
            Ok(x) => x,
            Err(e) => e.panic(),
        }
    }
}
