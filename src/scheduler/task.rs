use std::time::Duration;

/// Boxed periodic callback. Invoked repeatedly from the scheduler loop thread,
/// never concurrently with itself.
pub(crate) type TaskFn = Box<dyn FnMut() + Send>;

/// Internal per-task bookkeeping.
///
/// `relative_ratio` is recomputed on every `Scheduler::start` as
/// `base_frequency / frequency` and is stale for tasks added mid-run until the
/// next start. `call_counter` and `exec_accum` reset on each statistics
/// window boundary.
pub(crate) struct TaskSlot {
    pub name: String,
    pub callback: TaskFn,
    pub frequency: u32,
    pub relative_ratio: f64,
    pub call_counter: u32,
    pub exec_accum: Duration,
}

impl TaskSlot {
    pub fn new(name: String, callback: TaskFn, frequency: u32) -> Self {
        Self {
            name,
            callback,
            frequency,
            relative_ratio: 1.0,
            call_counter: 0,
            exec_accum: Duration::ZERO,
        }
    }

    pub fn reset_window(&mut self) {
        self.call_counter = 0;
        self.exec_accum = Duration::ZERO;
    }

    /// Average callback wall time over the current window, in milliseconds.
    pub fn avg_exec_ms(&self) -> f32 {
        if self.call_counter == 0 {
            return 0.0;
        }
        (self.exec_accum.as_secs_f64() * 1000.0 / f64::from(self.call_counter)) as f32
    }
}

/// One row of the per-second statistics snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskStats {
    /// Task display name.
    pub name: String,
    /// Calls completed in the elapsed window.
    pub calls: u32,
    /// Average callback wall time in milliseconds (0.0 when no calls).
    pub avg_exec_ms: f32,
}

/// Receives the per-second statistics snapshot.
///
/// Called on the scheduler loop thread; implementations must not block for
/// long or they will delay task firing.
pub trait StatsListener: Send {
    /// Deliver one window's snapshot, taken synchronously before counters
    /// reset.
    fn on_stats(&self, stats: &[TaskStats]);
}
