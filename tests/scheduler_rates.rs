use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use cadence::{Scheduler, StatsListener, TaskStats};

#[test]
fn tasks_fire_at_relative_rates() {
    let fast_hits = Arc::new(AtomicU32::new(0));
    let slow_hits = Arc::new(AtomicU32::new(0));

    let mut sched = Scheduler::new();
    {
        let fast_hits = Arc::clone(&fast_hits);
        sched
            .add_task(
                Some("fast"),
                move || {
                    fast_hits.fetch_add(1, Ordering::Relaxed);
                },
                60,
            )
            .unwrap();
    }
    {
        let slow_hits = Arc::clone(&slow_hits);
        sched
            .add_task(
                Some("slow"),
                move || {
                    slow_hits.fetch_add(1, Ordering::Relaxed);
                },
                20,
            )
            .unwrap();
    }

    assert!(sched.start());
    assert_eq!(sched.relative_ratios(), vec![1.0, 3.0]);

    std::thread::sleep(Duration::from_secs(1));
    sched.stop();

    let fast = fast_hits.load(Ordering::Relaxed);
    let slow = slow_hits.load(Ordering::Relaxed);
    assert!(
        (54..=66).contains(&fast),
        "fast task fired {fast} times, expected ~60"
    );
    assert!(
        (17..=23).contains(&slow),
        "slow task fired {slow} times, expected ~20"
    );
    // Long-run ratio holds much tighter than the absolute counts.
    let ratio = f64::from(fast) / f64::from(slow);
    assert!(
        (2.5..=3.5).contains(&ratio),
        "fast/slow ratio {ratio} drifted from 3.0"
    );
}

struct CollectStats(Arc<Mutex<Vec<Vec<TaskStats>>>>);

impl StatsListener for CollectStats {
    fn on_stats(&self, stats: &[TaskStats]) {
        self.0
            .lock()
            .unwrap()
            .push(stats.to_vec());
    }
}

#[test]
fn stats_windows_snapshot_and_reset() {
    let windows = Arc::new(Mutex::new(Vec::new()));

    let mut sched = Scheduler::new();
    sched.add_task(Some("steady"), || {}, 50).unwrap();
    sched.add_listener(Box::new(CollectStats(Arc::clone(&windows))));

    assert!(sched.start());
    std::thread::sleep(Duration::from_millis(2300));
    sched.stop();

    let windows = windows.lock().unwrap();
    assert!(
        windows.len() >= 2,
        "expected at least two statistics windows, got {}",
        windows.len()
    );
    for window in windows.iter() {
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].name, "steady");
        // Counters reset each window, so no window reports cumulative calls.
        assert!(
            window[0].calls <= 60,
            "window reported {} calls, counters did not reset",
            window[0].calls
        );
        assert!(window[0].avg_exec_ms >= 0.0);
    }
    // At least one full window saw the task running near its target rate.
    assert!(windows.iter().any(|w| w[0].calls >= 40));
}

#[test]
fn mid_run_task_is_counted_without_restart() {
    let late_hits = Arc::new(AtomicU32::new(0));

    let mut sched = Scheduler::new();
    sched.add_task(Some("anchor"), || {}, 100).unwrap();
    assert!(sched.start());

    {
        let late_hits = Arc::clone(&late_hits);
        sched
            .add_task(
                Some("late"),
                move || {
                    late_hits.fetch_add(1, Ordering::Relaxed);
                },
                10,
            )
            .unwrap();
    }

    std::thread::sleep(Duration::from_millis(300));
    sched.stop();

    // Stale ratio 1.0 until the next start: the late task rides every base
    // tick rather than its own 10 Hz target.
    assert!(late_hits.load(Ordering::Relaxed) > 5);

    assert!(sched.start());
    assert_eq!(sched.relative_ratios(), vec![1.0, 10.0]);
    sched.stop();
}

#[test]
fn removal_takes_effect_while_running() {
    let hits = Arc::new(AtomicU32::new(0));

    let mut sched = Scheduler::new();
    {
        let hits = Arc::clone(&hits);
        sched
            .add_task(
                Some("doomed"),
                move || {
                    hits.fetch_add(1, Ordering::Relaxed);
                },
                100,
            )
            .unwrap();
    }
    sched.add_task(Some("keeper"), || {}, 100).unwrap();

    assert!(sched.start());
    std::thread::sleep(Duration::from_millis(150));
    sched.remove_task(0).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    let after_removal = hits.load(Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(200));
    sched.stop();

    assert!(after_removal > 0);
    let final_hits = hits.load(Ordering::Relaxed);
    assert!(
        final_hits <= after_removal + 1,
        "removed task kept firing: {after_removal} -> {final_hits}"
    );
    assert_eq!(sched.task_names(), vec!["keeper"]);
}
