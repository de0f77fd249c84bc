use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::foundation::error::{CadenceError, CadenceResult};
use crate::scheduler::TaskSlot;
use crate::scheduler::task::{StatsListener, TaskFn, TaskStats};

const STATS_WINDOW: Duration = Duration::from_secs(1);

struct Shared {
    running: AtomicBool,
    tasks: Mutex<Vec<TaskSlot>>,
    listeners: Mutex<Vec<Box<dyn StatsListener>>>,
}

impl Shared {
    fn lock_tasks(&self) -> MutexGuard<'_, Vec<TaskSlot>> {
        // A panicking callback poisons the lock as it unwinds the loop
        // thread; the slots themselves stay consistent, so recover the guard
        // and keep the control surface usable.
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<Box<dyn StatsListener>>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears the running flag when the loop exits, including by panic.
struct RunningGuard(Arc<Shared>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

/// Soft real-time multi-rate task scheduler.
///
/// All registered tasks run on one dedicated background thread driven by one
/// monotonic clock. On [`start`](Scheduler::start) the task with the highest
/// target frequency becomes the base task; each task's relative ratio is
/// `base_frequency / own_frequency`, and a task with ratio R fires on average
/// once every R base ticks via a counter comparison rather than per-task
/// elapsed time, so rounding error never accumulates.
///
/// Frequencies are targets, not guarantees: a slow callback delays everything
/// behind it in the same tick.
pub struct Scheduler {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create an empty, stopped scheduler.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
                listeners: Mutex::new(Vec::new()),
            }),
            handle: None,
        }
    }

    /// Register a periodic task.
    ///
    /// `name: None` defaults to `"task {n}"`. Registration is allowed while
    /// running, but the new task keeps relative ratio 1.0 (fires every base
    /// tick) until the next [`start`](Scheduler::start) recomputes ratios.
    pub fn add_task(
        &self,
        name: Option<&str>,
        callback: impl FnMut() + Send + 'static,
        frequency: u32,
    ) -> CadenceResult<()> {
        if frequency < 1 {
            return Err(CadenceError::validation(
                "task frequency must be at least 1 Hz",
            ));
        }
        let mut tasks = self.shared.lock_tasks();
        let name = match name {
            Some(n) => n.to_owned(),
            None => format!("task {}", tasks.len() + 1),
        };
        let callback: TaskFn = Box::new(callback);
        tasks.push(TaskSlot::new(name, callback, frequency));
        Ok(())
    }

    /// Remove the task at `index` (registration order).
    ///
    /// Takes effect on the next loop iteration.
    pub fn remove_task(&self, index: usize) -> CadenceResult<()> {
        let mut tasks = self.shared.lock_tasks();
        if index >= tasks.len() {
            return Err(CadenceError::scheduling(format!(
                "task index {index} out of range ({} registered)",
                tasks.len()
            )));
        }
        tasks.remove(index);
        Ok(())
    }

    /// Register a statistics listener. Listeners are called on the loop
    /// thread once per statistics window.
    pub fn add_listener(&self, listener: Box<dyn StatsListener>) {
        self.shared.lock_listeners().push(listener);
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.shared.lock_tasks().len()
    }

    /// Task names in registration order.
    pub fn task_names(&self) -> Vec<String> {
        self.shared
            .lock_tasks()
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    /// Relative ratios in registration order, as computed by the last
    /// [`start`](Scheduler::start).
    pub fn relative_ratios(&self) -> Vec<f64> {
        self.shared
            .lock_tasks()
            .iter()
            .map(|t| t.relative_ratio)
            .collect()
    }

    /// Whether the background loop is active.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Spawn the background loop.
    ///
    /// Returns `false` (no-op) when no tasks are registered or a loop is
    /// already running. Otherwise recomputes every task's relative ratio from
    /// the current task set, zeroes window counters and returns `true`.
    pub fn start(&mut self) -> bool {
        let base_period = {
            let mut tasks = self.shared.lock_tasks();
            if tasks.is_empty() {
                return false;
            }
            if self
                .shared
                .running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return false;
            }

            let base_freq = tasks.iter().map(|t| t.frequency).max().unwrap_or(1);
            for t in tasks.iter_mut() {
                t.relative_ratio = f64::from(base_freq) / f64::from(t.frequency);
                t.reset_window();
            }
            Duration::from_nanos(1_000_000_000 / u64::from(base_freq))
        };

        // Reap a previous loop thread if one finished.
        if let Some(handle) = self.handle.take() {
            join_loop(handle);
        }

        let shared = Arc::clone(&self.shared);
        self.handle = Some(std::thread::spawn(move || run_loop(shared, base_period)));
        tracing::debug!(period_ns = base_period.as_nanos() as u64, "scheduler started");
        true
    }

    /// Signal the loop to exit and block until the thread has terminated.
    ///
    /// No-op when already stopped.
    pub fn stop(&mut self) {
        if self
            .shared
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Still reap a loop that died on its own (task panic).
            if let Some(handle) = self.handle.take() {
                join_loop(handle);
            }
            return;
        }
        if let Some(handle) = self.handle.take() {
            join_loop(handle);
        }
        tracing::debug!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_loop(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::error!("scheduler loop terminated by a task panic");
    }
}

/// Index of the highest-frequency task; first wins ties.
fn base_index(tasks: &[TaskSlot]) -> Option<usize> {
    let mut base: Option<usize> = None;
    for (i, t) in tasks.iter().enumerate() {
        match base {
            Some(b) if tasks[b].frequency >= t.frequency => {}
            _ => base = Some(i),
        }
    }
    base
}

fn run_loop(shared: Arc<Shared>, base_period: Duration) {
    let _guard = RunningGuard(Arc::clone(&shared));

    let mut base_timer = Instant::now();
    let mut seconds_timer = Instant::now();

    while shared.running.load(Ordering::Acquire) {
        if base_timer.elapsed() >= base_period {
            base_timer = Instant::now();
            fire_due_tasks(&shared);
        }

        if seconds_timer.elapsed() >= STATS_WINDOW {
            seconds_timer = Instant::now();
            publish_stats(&shared);
        }

        std::thread::yield_now();
    }
}

/// One base tick: fire every task whose counter-ratio test is due, in
/// registration order.
fn fire_due_tasks(shared: &Shared) {
    let mut tasks = shared.lock_tasks();
    let Some(base) = base_index(&tasks) else {
        return;
    };
    for i in 0..tasks.len() {
        // Read the base counter fresh each check: once the base task itself
        // has fired this tick, later tasks compare against the incremented
        // value, matching registration-order semantics.
        let base_calls = tasks[base].call_counter;
        let t = &mut tasks[i];
        let due =
            i64::from(base_calls) - (t.relative_ratio * f64::from(t.call_counter)) as i64 >= 0;
        if due {
            t.call_counter += 1;
            let started = Instant::now();
            (t.callback)();
            t.exec_accum += started.elapsed();
        }
    }
}

fn publish_stats(shared: &Shared) {
    let snapshot: Vec<TaskStats> = {
        let mut tasks = shared.lock_tasks();
        let snapshot = tasks
            .iter()
            .map(|t| TaskStats {
                name: t.name.clone(),
                calls: t.call_counter,
                avg_exec_ms: t.avg_exec_ms(),
            })
            .collect();
        for t in tasks.iter_mut() {
            t.reset_window();
        }
        snapshot
    };

    let listeners = shared.lock_listeners();
    for listener in listeners.iter() {
        listener.on_stats(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn start_without_tasks_is_refused() {
        let mut sched = Scheduler::new();
        assert!(!sched.start());
        assert!(!sched.is_running());
    }

    #[test]
    fn add_task_rejects_zero_frequency() {
        let sched = Scheduler::new();
        assert!(sched.add_task(Some("t"), || {}, 0).is_err());
    }

    #[test]
    fn unnamed_tasks_get_sequence_names() {
        let sched = Scheduler::new();
        sched.add_task(None, || {}, 10).unwrap();
        sched.add_task(Some("named"), || {}, 10).unwrap();
        sched.add_task(None, || {}, 10).unwrap();
        assert_eq!(sched.task_names(), vec!["task 1", "named", "task 3"]);
    }

    #[test]
    fn remove_task_rejects_out_of_range() {
        let sched = Scheduler::new();
        sched.add_task(Some("t"), || {}, 10).unwrap();
        let err = sched.remove_task(1).unwrap_err();
        assert!(err.to_string().contains("scheduling error:"));
        assert!(sched.remove_task(0).is_ok());
        assert_eq!(sched.task_count(), 0);
    }

    #[test]
    fn base_index_prefers_first_on_ties() {
        let tasks = vec![
            TaskSlot::new("a".into(), Box::new(|| {}), 30),
            TaskSlot::new("b".into(), Box::new(|| {}), 30),
            TaskSlot::new("c".into(), Box::new(|| {}), 10),
        ];
        assert_eq!(base_index(&tasks), Some(0));
    }

    #[test]
    fn start_recomputes_ratios_from_current_set() {
        let mut sched = Scheduler::new();
        sched.add_task(Some("fast"), || {}, 60).unwrap();
        sched.add_task(Some("slow"), || {}, 20).unwrap();
        assert!(sched.start());
        let ratios = sched.relative_ratios();
        sched.stop();
        assert_eq!(ratios, vec![1.0, 3.0]);
    }

    #[test]
    fn double_start_and_double_stop_are_noops() {
        let mut sched = Scheduler::new();
        sched.add_task(Some("t"), || {}, 100).unwrap();
        assert!(sched.start());
        assert!(!sched.start());
        sched.stop();
        assert!(!sched.is_running());
        sched.stop();
        assert!(!sched.is_running());
    }

    #[test]
    fn stop_blocks_until_loop_exits_and_tasks_fire() {
        let hits = Arc::new(AtomicU32::new(0));
        let mut sched = Scheduler::new();
        {
            let hits = Arc::clone(&hits);
            sched
                .add_task(Some("count"), move || {
                    hits.fetch_add(1, Ordering::Relaxed);
                }, 200)
                .unwrap();
        }
        assert!(sched.start());
        std::thread::sleep(Duration::from_millis(200));
        sched.stop();
        let observed = hits.load(Ordering::Relaxed);
        assert!(observed > 0, "task never fired");
        // No further firings after stop returned.
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(hits.load(Ordering::Relaxed), observed);
    }
}
