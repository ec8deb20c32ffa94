//! Suspension of the lockup watchdog while processors sleep
use crate::port::Watchdog;

/// Counts the processors inside a sleep window.
///
/// The watchdog is suspended by the first processor to go to sleep and
/// resumed by the last one to wake up. The count and the port calls are
/// updated together under the lock, so two processors crossing in opposite
/// directions can't leave the watchdog in the wrong state.
#[derive(Debug)]
pub(crate) struct WatchdogGate {
    sleepers: spin::Mutex<usize>,
}

impl WatchdogGate {
    pub const fn new() -> Self {
        Self {
            sleepers: spin::Mutex::new(0),
        }
    }

    pub fn enter(&self, watchdog: &(impl Watchdog + ?Sized)) {
        let mut sleepers = self.sleepers.lock();
        if *sleepers == 0 {
            log::trace!("first processor going to sleep; suspending the watchdog");
            watchdog.suspend_watchdog();
        }
        *sleepers += 1;
    }

    pub fn exit(&self, watchdog: &(impl Watchdog + ?Sized)) {
        let mut sleepers = self.sleepers.lock();
        debug_assert_ne!(*sleepers, 0);
        *sleepers = sleepers.saturating_sub(1);
        if *sleepers == 0 {
            log::trace!("last processor woke up; resuming the watchdog");
            watchdog.resume_watchdog();
        }
    }

    pub fn sleepers(&self) -> usize {
        *self.sleepers.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[derive(Default)]
    struct Calls {
        suspended: Cell<u32>,
        resumed: Cell<u32>,
    }

    impl Watchdog for Calls {
        fn suspend_watchdog(&self) {
            self.suspended.set(self.suspended.get() + 1);
        }

        fn resume_watchdog(&self) {
            self.resumed.set(self.resumed.get() + 1);
        }
    }

    #[test]
    fn first_in_last_out() {
        let gate = WatchdogGate::new();
        let calls = Calls::default();

        gate.enter(&calls);
        assert_eq!((calls.suspended.get(), calls.resumed.get()), (1, 0));
        gate.enter(&calls);
        gate.enter(&calls);
        assert_eq!(gate.sleepers(), 3);
        assert_eq!((calls.suspended.get(), calls.resumed.get()), (1, 0));

        gate.exit(&calls);
        gate.exit(&calls);
        assert_eq!((calls.suspended.get(), calls.resumed.get()), (1, 0));
        gate.exit(&calls);
        assert_eq!((calls.suspended.get(), calls.resumed.get()), (1, 1));
        assert_eq!(gate.sleepers(), 0);

        gate.enter(&calls);
        assert_eq!((calls.suspended.get(), calls.resumed.get()), (2, 1));
    }
}
