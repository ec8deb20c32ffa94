//! An idle loop driving periodic timers through repeated sleep windows
use itertools::Itertools;
use quickcheck_macros::quickcheck;
use std::{num::NonZeroU64, sync::Mutex};
use vst_kernel::{
    port::lock_cpu, HardwareClock, PeriodicTimer, PeriodicWork, SleepOutcome, TimerCfg,
    TimerQueue,
};
use vst_port_std::{boot, init_logger};

const CPJ: u32 = 1000;

fn cfg() -> TimerCfg {
    TimerCfg::from_cycles_per_jiffy(CPJ, 32, 1_000_000).unwrap()
}

#[test]
fn periodic_timers_fire_on_time() {
    static FIRED: Mutex<Vec<(usize, u64)>> = Mutex::new(Vec::new());
    fn record(param: usize, now: u64) {
        FIRED.lock().unwrap().push((param, now));
    }

    init_logger();
    let vst = boot::<TimerQueue<4>, 1>(cfg(), TimerQueue::new());
    vst.work()
        .insert(PeriodicTimer {
            deadline: 5,
            period: NonZeroU64::new(5),
            callback: record,
            param: 0,
        })
        .unwrap();
    vst.work()
        .insert(PeriodicTimer {
            deadline: 7,
            period: None,
            callback: record,
            param: 1,
        })
        .unwrap();

    let targets: Vec<u64> = (0..6)
        .map(|_| match vst.idle_once(100) {
            SleepOutcome::Slept { target_ticks, .. } => target_ticks,
            SleepOutcome::Elapsed => panic!("nothing to sleep for"),
        })
        .collect();

    assert_eq!(targets, [5, 7, 10, 15, 20, 25]);
    assert_eq!(
        *FIRED.lock().unwrap(),
        [(0, 5), (1, 7), (0, 10), (0, 15), (0, 20), (0, 25)]
    );
    assert_eq!(vst.port().time(), 25_000);
    assert_eq!(vst.time_base().ticks(), 25);
    assert_eq!(vst.diagnostics().timer_exits, 6);
    assert_eq!(vst.diagnostics().skipped_ticks, 4 + 1 + 2 + 4 + 4 + 4);
    assert_eq!(vst.work().next_deadline(), Some(30));
}

#[test]
fn missed_periods_are_replayed_once() {
    static FIRED: Mutex<Vec<(usize, u64)>> = Mutex::new(Vec::new());
    fn record(param: usize, now: u64) {
        FIRED.lock().unwrap().push((param, now));
    }

    init_logger();
    let vst = boot::<TimerQueue<4>, 1>(cfg(), TimerQueue::new());
    vst.work()
        .insert(PeriodicTimer {
            deadline: 2,
            period: NonZeroU64::new(2),
            callback: record,
            param: 0,
        })
        .unwrap();

    // Sleep past several deadlines; an external interrupt ends it at 9.5
    // ticks
    vst.port().schedule_external(9_500);
    vst.sleep_until(50);
    assert_eq!(vst.time_base().ticks(), 8);
    assert_eq!(*FIRED.lock().unwrap(), [(0, 8)]);
    assert_eq!(vst.work().next_deadline(), Some(10));

    vst.port().advance(500);
    assert_eq!(vst.time_base().ticks(), 10);
    assert_eq!(*FIRED.lock().unwrap(), [(0, 8), (0, 10)]);
}

#[test]
fn tail_chained_ticks_are_caught_up() {
    init_logger();
    let vst = boot::<(), 1>(cfg(), ());
    let port = vst.port();

    {
        // Busy with interrupts masked for three and a half ticks
        let _cpu_lock = lock_cpu(port);
        port.advance(3500);
        assert_eq!(vst.time_base().ticks(), 0);
    }

    // One interrupt credits all of them
    assert_eq!(port.stats().timer_interrupts, 1);
    assert_eq!(vst.time_base().ticks(), 3);
    assert_eq!(port.compare(), 4000);

    port.advance(500);
    assert_eq!(vst.time_base().ticks(), 4);
}

#[test]
fn idle_without_work_uses_default() {
    init_logger();
    let vst = boot::<(), 1>(cfg(), ());
    assert_eq!(
        vst.idle_once(20),
        SleepOutcome::Slept {
            target_ticks: 20,
            clamped: false
        }
    );
    assert_eq!(vst.time_base().ticks(), 20);
}

/// Random sleeps interrupted by random external interrupts. At every
/// quiescent point the credited ticks plus the ticks owed to the tick path
/// equal the number of tick periods the simulated time has covered.
#[quickcheck]
fn ticks_follow_simulated_time(ops: Vec<(u8, Option<u16>, u16)>) {
    init_logger();
    let vst = boot::<(), 1>(cfg(), ());
    let port = vst.port();

    let mut samples = vec![0];
    for (sleep_ticks, external, awake) in ops {
        if let Some(offset) = external {
            port.schedule_external(port.time() + offset as u64 + 1);
        }

        let target =
            vst.time_base().ticks() + vst.deferred_ticks() + (sleep_ticks % 50) as u64 + 1;
        assert!(matches!(
            vst.sleep_until(target),
            SleepOutcome::Slept { clamped: false, .. }
        ));
        assert!(!port.is_cpu_lock_active());
        assert_eq!(
            vst.time_base().ticks() + vst.deferred_ticks(),
            port.time() / CPJ as u64
        );
        samples.push(vst.time_base().ticks());

        port.advance(awake as u64);
        assert_eq!(
            vst.time_base().ticks() + vst.deferred_ticks(),
            port.time() / CPJ as u64
        );
        samples.push(vst.time_base().ticks());
    }

    assert!(samples.iter().tuple_windows().all(|(a, b)| a <= b));

    let diag = vst.diagnostics();
    let stats = port.stats();
    assert_eq!(
        diag.timer_exits + diag.external_exits,
        stats.halts as u64
    );
}
