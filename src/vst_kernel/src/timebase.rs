//! The process-wide tick counter and wall clock, protected by a sequence lock
use core::{
    fmt,
    sync::atomic::{fence, AtomicU32, AtomicU64, AtomicUsize, Ordering},
};

use crate::port::{lock_cpu, CpuLock, CpuLockGuard};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A point in wall-clock time, measured from an arbitrary epoch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WallClock {
    pub secs: u64,
    /// Always less than `1_000_000_000`.
    pub nanos: u32,
}

impl WallClock {
    pub const ZERO: Self = Self { secs: 0, nanos: 0 };

    /// Construct a `WallClock`, normalizing excess nanoseconds into seconds.
    pub const fn new(secs: u64, nanos: u32) -> Self {
        Self {
            secs: secs.saturating_add((nanos / NANOS_PER_SEC) as u64),
            nanos: nanos % NANOS_PER_SEC,
        }
    }

    /// Advance by `nanos` nanoseconds, saturating at the largest
    /// representable time.
    pub const fn add_nanos(self, nanos: u128) -> Self {
        let total = self.nanos as u128 + nanos;
        let secs = total / NANOS_PER_SEC as u128;
        if secs > (u64::MAX - self.secs) as u128 {
            return Self {
                secs: u64::MAX,
                nanos: NANOS_PER_SEC - 1,
            };
        }
        Self {
            secs: self.secs + secs as u64,
            nanos: (total % NANOS_PER_SEC as u128) as u32,
        }
    }

    /// Get the total number of nanoseconds.
    pub const fn as_nanos(self) -> u128 {
        self.secs as u128 * NANOS_PER_SEC as u128 + self.nanos as u128
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

/// A consistent view of [`GlobalTimeBase`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TimeSnapshot {
    /// The number of ticks since the epoch.
    pub ticks: u64,
    pub wall: WallClock,
    /// The value of `ticks` when `wall` was last advanced.
    pub wall_updated_at: u64,
}

/// The tick counter and the wall clock.
///
/// Readers never block; they retry if a writer was active while they were
/// reading. Writers are serialized by a spin lock and hold CPU Lock while
/// mutating, so a reader is never preempted by a writer on the same
/// processor.
pub struct GlobalTimeBase {
    /// Odd while a writer is mutating the fields below.
    generation: AtomicUsize,
    ticks: AtomicU64,
    wall_secs: AtomicU64,
    wall_nanos: AtomicU32,
    wall_updated_at: AtomicU64,
    jiffy_nanos: u32,
    writer: spin::Mutex<()>,
}

impl GlobalTimeBase {
    /// Construct a `GlobalTimeBase` at the epoch.
    pub const fn new(jiffy_nanos: u32) -> Self {
        Self {
            generation: AtomicUsize::new(0),
            ticks: AtomicU64::new(0),
            wall_secs: AtomicU64::new(0),
            wall_nanos: AtomicU32::new(0),
            wall_updated_at: AtomicU64::new(0),
            jiffy_nanos,
            writer: spin::Mutex::new(()),
        }
    }

    /// Get the length of a tick, measured in nanoseconds.
    #[inline]
    pub fn jiffy_nanos(&self) -> u32 {
        self.jiffy_nanos
    }

    /// Take a consistent snapshot.
    ///
    /// This must not be called from inside the write section on the same
    /// processor (e.g., from a periodic timer callback); it would spin
    /// forever.
    pub fn read(&self) -> TimeSnapshot {
        loop {
            let gen1 = self.generation.load(Ordering::Acquire);
            if gen1 % 2 != 0 {
                core::hint::spin_loop();
                continue;
            }

            let snapshot = self.load_relaxed();

            fence(Ordering::Acquire);
            let gen2 = self.generation.load(Ordering::Relaxed);
            if gen1 == gen2 {
                return snapshot;
            }
        }
    }

    /// Get the number of ticks since the epoch.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.read().ticks
    }

    /// Enter the exclusive write section. CPU Lock is acquired first, then
    /// the writer lock.
    pub fn lock_write<'a, L: CpuLock + ?Sized>(
        &'a self,
        cpu_lock: &'a L,
    ) -> TimeBaseWriteGuard<'a, L> {
        let cpu_lock = lock_cpu(cpu_lock);
        let writer = self.writer.lock();

        let gen = self.generation.load(Ordering::Relaxed);
        debug_assert_eq!(gen % 2, 0);
        self.generation.store(gen.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        TimeBaseWriteGuard {
            time_base: self,
            _writer: writer,
            _cpu_lock: cpu_lock,
        }
    }

    fn load_relaxed(&self) -> TimeSnapshot {
        TimeSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            wall: WallClock {
                secs: self.wall_secs.load(Ordering::Relaxed),
                nanos: self.wall_nanos.load(Ordering::Relaxed),
            },
            wall_updated_at: self.wall_updated_at.load(Ordering::Relaxed),
        }
    }

    fn store_relaxed(&self, snapshot: &TimeSnapshot) {
        self.ticks.store(snapshot.ticks, Ordering::Relaxed);
        self.wall_secs.store(snapshot.wall.secs, Ordering::Relaxed);
        self.wall_nanos.store(snapshot.wall.nanos, Ordering::Relaxed);
        self.wall_updated_at
            .store(snapshot.wall_updated_at, Ordering::Relaxed);
    }
}

impl fmt::Debug for GlobalTimeBase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("GlobalTimeBase")
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("jiffy_nanos", &self.jiffy_nanos)
            .finish_non_exhaustive()
    }
}

/// RAII guard for [`GlobalTimeBase`]'s exclusive write section.
///
/// Dropping it publishes the changes, releases the writer lock, and then
/// leaves CPU Lock.
pub struct TimeBaseWriteGuard<'a, L: CpuLock + ?Sized> {
    time_base: &'a GlobalTimeBase,
    // Fields are dropped in declaration order, after `Drop::drop`
    _writer: spin::MutexGuard<'a, ()>,
    _cpu_lock: CpuLockGuard<'a, L>,
}

impl<L: CpuLock + ?Sized> TimeBaseWriteGuard<'_, L> {
    /// Get the current values.
    #[inline]
    pub fn snapshot(&self) -> TimeSnapshot {
        self.time_base.load_relaxed()
    }

    /// Get the number of ticks since the epoch.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.time_base.ticks.load(Ordering::Relaxed)
    }

    /// Advance the tick counter and the wall clock by `num_ticks` ticks.
    /// Returns the new tick count.
    ///
    /// Saturates instead of wrapping around, so the tick count never
    /// decreases.
    pub fn credit(&mut self, num_ticks: u64) -> u64 {
        let mut snapshot = self.snapshot();
        if num_ticks == 0 {
            return snapshot.ticks;
        }

        snapshot.ticks = snapshot.ticks.saturating_add(num_ticks);
        snapshot.wall = snapshot
            .wall
            .add_nanos(num_ticks as u128 * self.time_base.jiffy_nanos as u128);
        snapshot.wall_updated_at = snapshot.ticks;
        self.time_base.store_relaxed(&snapshot);
        snapshot.ticks
    }

    /// Overwrite the tick counter and the wall clock.
    pub fn reset(&mut self, ticks: u64, wall: WallClock) {
        self.time_base.store_relaxed(&TimeSnapshot {
            ticks,
            wall,
            wall_updated_at: ticks,
        });
    }
}

impl<L: CpuLock + ?Sized> Drop for TimeBaseWriteGuard<'_, L> {
    #[inline]
    fn drop(&mut self) {
        let gen = self.time_base.generation.load(Ordering::Relaxed);
        self.time_base
            .generation
            .store(gen.wrapping_add(1), Ordering::Release);
    }
}
