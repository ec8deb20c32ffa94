//! The public interface for the machine timer driver.
use vst_kernel::{TimerCfg, TimerOptions};

/// The options for [`MtimePort`](crate::MtimePort).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MtimeOptions {
    /// The memory address of the `mtime` register.
    pub mtime_ptr: usize,

    /// The memory address of the current hart's `mtimecmp` register.
    pub mtimecmp_ptr: usize,

    /// The numerator of the `mtime` clock rate.
    pub frequency: u64,

    /// The denominator of the `mtime` clock rate. Usually `1`.
    pub frequency_denominator: u64,

    /// The tick rate.
    pub jiffies_per_sec: u32,
}

impl MtimeOptions {
    /// The width of `mtime`, measured in bits.
    pub const COUNTER_WIDTH: u32 = 64;

    /// Derive the timer configuration, panicking on a misconfiguration. Use
    /// this in a constant context to turn a misconfiguration into a
    /// compile-time error.
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
