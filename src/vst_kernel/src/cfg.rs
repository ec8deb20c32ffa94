//! Per-architecture timer configuration.
use core::fmt;
use num_rational::Ratio;

use crate::num::{counter_max, floor_ratio128, reduce_ratio128, wrapping_cycles_between};

/// The parameters of a hardware timer, from which [`TimerCfg::new`] derives a
/// [`TimerCfg`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TimerOptions {
    /// The numerator of the hardware timer frequency.
    pub hw_freq_num: u64,
    /// The denominator of the hardware timer frequency.
    pub hw_freq_denom: u64,
    /// The tick rate ("HZ").
    pub jiffies_per_sec: u32,
    /// The width of the free-running counter, measured in bits.
    pub counter_width: u32,
}

/// Error type for [`TimerCfg::new`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CfgError {
    /// The numerator of the clock frequency is zero.
    FreqNumZero,
    /// The denominator of the clock frequency is zero.
    FreqDenomZero,
    /// The tick rate is zero.
    JiffiesPerSecZero,
    /// A tick is shorter than one hardware cycle.
    CyclesPerJiffyZero,
    /// A tick does not fit in 32 bits when measured in hardware cycles.
    CyclesPerJiffyOverflowsU32,
    /// The counter width is not in range `1..=64`.
    CounterWidthOutOfRange,
    /// A tick is longer than half the counter's period.
    CyclesPerJiffyExceedsCounter,
    /// A tick is shorter than a nanosecond.
    JiffyNanosZero,
}

impl CfgError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FreqNumZero => "the numerator of the clock frequency must not be zero",
            Self::FreqDenomZero => "the denominator of the clock frequency must not be zero",
            Self::JiffiesPerSecZero => "the tick rate must not be zero",
            Self::CyclesPerJiffyZero => "`cycles_per_jiffy` must not be zero",
            Self::CyclesPerJiffyOverflowsU32 => {
                "the tick period is too long and \
                does not fit in 32 bits when measured in hardware cycles"
            }
            Self::CounterWidthOutOfRange => "the counter width must be in range `1..=64`",
            Self::CyclesPerJiffyExceedsCounter => {
                "the tick period must not be longer than half the counter's period"
            }
            Self::JiffyNanosZero => "the tick period must not be shorter than a nanosecond",
        }
    }

    /// Panic with a message describing `self`. Usable in a constant context,
    /// turning a misconfiguration into a compile-time error.
    pub const fn panic(self) -> ! {
        match self {
            Self::FreqNumZero => panic!("the numerator of the clock frequency must not be zero"),
            Self::FreqDenomZero => {
                panic!("the denominator of the clock frequency must not be zero")
            }
            Self::JiffiesPerSecZero => panic!("the tick rate must not be zero"),
            Self::CyclesPerJiffyZero => panic!("`cycles_per_jiffy` must not be zero"),
            Self::CyclesPerJiffyOverflowsU32 => panic!(
                "the tick period is too long and \
                does not fit in 32 bits when measured in hardware cycles"
            ),
            Self::CounterWidthOutOfRange => panic!("the counter width must be in range `1..=64`"),
            Self::CyclesPerJiffyExceedsCounter => {
                panic!("the tick period must not be longer than half the counter's period")
            }
            Self::JiffyNanosZero => panic!("the tick period must not be shorter than a nanosecond"),
        }
    }
}

impl fmt::Display for CfgError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The validated, immutable timer parameters the reconciler works with.
///
/// The only way to obtain a `TimerCfg` is through its constructors, which
/// reject a zero `cycles_per_jiffy`. The reconciler divides by it without
/// checking again.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TimerCfg {
    cycles_per_jiffy: u32,
    counter_width: u32,
    jiffy_nanos: u32,
}

impl TimerCfg {
    /// Construct a `TimerCfg` from a hardware timer frequency and a tick rate.
    ///
    /// `cycles_per_jiffy` is rounded down if the tick period isn't an integral
    /// number of hardware cycles.
    pub const fn new(
        TimerOptions {
            hw_freq_num,
            hw_freq_denom,
            jiffies_per_sec,
            counter_width,
        }: TimerOptions,
    ) -> Result<Self, CfgError> {
        if hw_freq_denom == 0 {
            return Err(CfgError::FreqDenomZero);
        } else if hw_freq_num == 0 {
            return Err(CfgError::FreqNumZero);
        } else if jiffies_per_sec == 0 {
            return Err(CfgError::JiffiesPerSecZero);
        }

        // `cycles_per_jiffy = hw_freq_num / hw_freq_denom / jiffies_per_sec`
        // `0 < cycles_per_jiffy.numer() <=          0xffff_ffff_ffff_ffff`
        // `0 < cycles_per_jiffy.denom() <= 0xffff_fffe_ffff_ffff_0000_0001`
        let cycles_per_jiffy = reduce_ratio128(Ratio::new_raw(
            hw_freq_num as u128,
            hw_freq_denom as u128 * jiffies_per_sec as u128,
        ));
        let cycles_per_jiffy = floor_ratio128(cycles_per_jiffy);

        if cycles_per_jiffy == 0 {
            return Err(CfgError::CyclesPerJiffyZero);
        } else if cycles_per_jiffy > u32::MAX as u128 {
            return Err(CfgError::CyclesPerJiffyOverflowsU32);
        }

        Self::from_cycles_per_jiffy(
            cycles_per_jiffy as u32,
            counter_width,
            1_000_000_000 / jiffies_per_sec,
        )
    }

    /// Construct a `TimerCfg` directly from its components.
    pub const fn from_cycles_per_jiffy(
        cycles_per_jiffy: u32,
        counter_width: u32,
        jiffy_nanos: u32,
    ) -> Result<Self, CfgError> {
        if cycles_per_jiffy == 0 {
            return Err(CfgError::CyclesPerJiffyZero);
        } else if counter_width == 0 || counter_width > 64 {
            return Err(CfgError::CounterWidthOutOfRange);
        } else if cycles_per_jiffy as u64 > counter_max(counter_width) / 2 {
            return Err(CfgError::CyclesPerJiffyExceedsCounter);
        } else if jiffy_nanos == 0 {
            return Err(CfgError::JiffyNanosZero);
        }

        Ok(Self {
            cycles_per_jiffy,
            counter_width,
            jiffy_nanos,
        })
    }

    /// Get the number of hardware cycles in one tick. Never zero.
    #[inline]
    pub const fn cycles_per_jiffy(&self) -> u32 {
        self.cycles_per_jiffy
    }

    /// Get the width of the free-running counter, measured in bits.
    #[inline]
    pub const fn counter_width(&self) -> u32 {
        self.counter_width
    }

    /// Get the tick period, measured in nanoseconds.
    #[inline]
    pub const fn jiffy_nanos(&self) -> u32 {
        self.jiffy_nanos
    }

    /// Get the mask applied to raw counter values.
    #[inline]
    pub const fn counter_mask(&self) -> u64 {
        counter_max(self.counter_width)
    }

    /// Get the longest sleep, measured in ticks, such that
    /// `ticks * cycles_per_jiffy` never exceeds half the counter's range.
    ///
    /// A compare value reached within that range is still recognized as
    /// passed when the wake-up is late, however late (up to the other half).
    /// Always at least `1` because a tick fits in half the counter.
    #[inline]
    pub const fn max_sleep_ticks(&self) -> u64 {
        (self.counter_mask() / 2) / self.cycles_per_jiffy as u64
    }

    /// Get the number of cycles elapsed between two counter readings.
    #[inline]
    pub const fn cycles_between(&self, earlier: u64, later: u64) -> u64 {
        wrapping_cycles_between(earlier, later, self.counter_mask())
    }
}
