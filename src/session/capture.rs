use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::foundation::core::{FrameImage, FrameIndex, IndexedFrame};
use crate::foundation::error::{CadenceError, CadenceResult};
use crate::record::queue::FrameQueue;
use crate::record::writer::WriterPool;
use crate::scheduler::{Scheduler, StatsListener, TaskStats};

/// Queue occupancy that triggers an automatic drain.
const HIGH_WATER: f32 = 0.99;

/// Render/compose collaborator.
///
/// `render` composites and presents the next frame; `snapshot` returns an
/// owned copy of the last composited frame. Both are called on the scheduler
/// loop thread, never concurrently with each other.
pub trait FrameSource: Send {
    /// Composite and present the next frame.
    fn render(&mut self);
    /// Owned snapshot of the current composited frame.
    fn snapshot(&mut self) -> FrameImage;
}

/// Recording configuration consumed by [`CaptureSession`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CaptureConfig {
    /// Frame queue capacity.
    pub buffer_capacity: usize,
    /// Writer threads while recording.
    pub write_threads: usize,
    /// Writer threads during a drain; raise this if storage throughput
    /// allows, to shorten the pause.
    pub clearing_threads: usize,
    /// Output directory for numbered PNG frames (created on first use).
    pub out_dir: PathBuf,
    /// Render and recording task frequency in Hz.
    pub render_hz: u32,
}

impl CaptureConfig {
    /// Reject invalid values. Nothing is silently clamped.
    pub fn validate(&self) -> CadenceResult<()> {
        if self.buffer_capacity < 1 {
            return Err(CadenceError::validation(
                "capture buffer_capacity must be at least 1",
            ));
        }
        if self.write_threads < 1 {
            return Err(CadenceError::validation(
                "capture write_threads must be at least 1",
            ));
        }
        if self.clearing_threads < 1 {
            return Err(CadenceError::validation(
                "capture clearing_threads must be at least 1",
            ));
        }
        if self.out_dir.as_os_str().is_empty() {
            return Err(CadenceError::validation(
                "capture out_dir must not be empty",
            ));
        }
        if self.render_hz < 1 {
            return Err(CadenceError::validation(
                "capture render_hz must be at least 1",
            ));
        }
        Ok(())
    }

    /// Load and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> CadenceResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CadenceError::serde(format!("failed to read config '{}': {e}", path.display()))
        })?;
        let cfg: Self = serde_json::from_str(&text).map_err(|e| {
            CadenceError::serde(format!("failed to parse config '{}': {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Relays per-second buffer usage while recording is active.
struct BufferMonitor {
    queue: Arc<FrameQueue>,
    recording: Arc<AtomicBool>,
}

impl StatsListener for BufferMonitor {
    fn on_stats(&self, _stats: &[TaskStats]) {
        if self.recording.load(Ordering::Acquire) {
            tracing::info!("{:.1}% buffer usage", self.queue.usage() * 100.0);
        }
    }
}

/// Integrates the scheduler, frame queue and writer pool into the capture
/// and recording lifecycle.
///
/// Construction registers a render task that drives the [`FrameSource`] and
/// the global frame counter. [`start_recording`](Self::start_recording) adds
/// a recording task that snapshots each rendered frame and enqueues it under
/// blocking backpressure; when the queue nears capacity the session pauses
/// capture, drains with the clearing thread count and resumes — no frame is
/// ever dropped.
pub struct CaptureSession {
    scheduler: Scheduler,
    cfg: CaptureConfig,
    queue: Arc<FrameQueue>,
    pool: Arc<Mutex<WriterPool>>,
    source: Arc<Mutex<dyn FrameSource>>,
    frame_counter: Arc<AtomicU64>,
    recording_frames: Arc<AtomicU64>,
    recording: Arc<AtomicBool>,
}

impl CaptureSession {
    /// Build a session around `source`. The render task is registered
    /// immediately; call [`start`](Self::start) to begin ticking.
    pub fn new(cfg: CaptureConfig, source: impl FrameSource + 'static) -> CadenceResult<Self> {
        cfg.validate()?;

        let queue = Arc::new(FrameQueue::new(cfg.buffer_capacity)?);
        let pool = Arc::new(Mutex::new(WriterPool::new(
            Arc::clone(&queue),
            &cfg.out_dir,
        )?));
        let source: Arc<Mutex<dyn FrameSource>> = Arc::new(Mutex::new(source));
        let frame_counter = Arc::new(AtomicU64::new(0));
        let recording_frames = Arc::new(AtomicU64::new(0));
        let recording = Arc::new(AtomicBool::new(false));

        let scheduler = Scheduler::new();
        {
            let source = Arc::clone(&source);
            let frame_counter = Arc::clone(&frame_counter);
            scheduler.add_task(
                Some("render"),
                move || {
                    lock_source(&source).render();
                    frame_counter.fetch_add(1, Ordering::AcqRel);
                },
                cfg.render_hz,
            )?;
        }
        scheduler.add_listener(Box::new(BufferMonitor {
            queue: Arc::clone(&queue),
            recording: Arc::clone(&recording),
        }));

        Ok(Self {
            scheduler,
            cfg,
            queue,
            pool,
            source,
            frame_counter,
            recording_frames,
            recording,
        })
    }

    /// Register an additional periodic task alongside the render task.
    pub fn add_task(
        &self,
        name: Option<&str>,
        callback: impl FnMut() + Send + 'static,
        frequency: u32,
    ) -> CadenceResult<()> {
        self.scheduler.add_task(name, callback, frequency)
    }

    /// Register a per-second statistics listener.
    pub fn add_listener(&self, listener: Box<dyn StatsListener>) {
        self.scheduler.add_listener(listener);
    }

    /// Start ticking all registered tasks. `false` when already running.
    pub fn start(&mut self) -> bool {
        self.scheduler.start()
    }

    /// Stop ticking. Blocks until the loop thread has exited.
    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    /// Whether the scheduler loop is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Zero both frame counters. Only meaningful while stopped.
    pub fn reset(&self) {
        self.frame_counter.store(0, Ordering::Release);
        self.recording_frames.store(0, Ordering::Release);
    }

    /// Begin recording: start the writer pool and register the recording
    /// task, then (re)start the scheduler. Idempotent while recording.
    pub fn start_recording(&mut self) -> CadenceResult<()> {
        if self.recording.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.scheduler.stop();
        self.recording_frames.store(0, Ordering::Release);

        {
            let mut pool = lock_pool(&self.pool);
            if let Err(e) = pool.start(self.cfg.write_threads) {
                self.recording.store(false, Ordering::Release);
                return Err(e);
            }
        }

        let queue = Arc::clone(&self.queue);
        let pool = Arc::clone(&self.pool);
        let source = Arc::clone(&self.source);
        let frame_counter = Arc::clone(&self.frame_counter);
        let recording_frames = Arc::clone(&self.recording_frames);
        let write_threads = self.cfg.write_threads;
        let clearing_threads = self.cfg.clearing_threads;

        self.scheduler.add_task(
            Some("recording"),
            move || {
                let image = lock_source(&source).snapshot();
                let index = FrameIndex(frame_counter.load(Ordering::Acquire));
                // Blocks the scheduler loop when the queue is full; this is
                // the pipeline's backpressure point.
                queue.enqueue(IndexedFrame { index, image });

                if queue.usage() >= HIGH_WATER {
                    let mut pool = lock_pool(&pool);
                    tracing::info!("clearing buffer...");
                    let resumed = pool
                        .drain(clearing_threads)
                        .and_then(|()| pool.start(write_threads));
                    if let Err(e) = resumed {
                        tracing::error!(error = %e, "buffer drain failed");
                        std::process::exit(1);
                    }
                    tracing::info!("resuming");
                }

                recording_frames.fetch_add(1, Ordering::AcqRel);
            },
            self.cfg.render_hz,
        )?;

        self.scheduler.start();
        Ok(())
    }

    /// Stop recording: halt the scheduler, fully drain and persist the
    /// queue, stop the writer pool and remove the recording task. Leaves the
    /// scheduler stopped. Idempotent while not recording.
    pub fn stop_recording(&mut self) -> CadenceResult<()> {
        if !self.recording.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        self.scheduler.stop();

        tracing::info!("saving buffered frames...");
        let drained = {
            let mut pool = lock_pool(&self.pool);
            pool.drain(self.cfg.clearing_threads)
        };

        self.recording_frames.store(0, Ordering::Release);

        // Deregister the recording task before surfacing any drain failure:
        // a later start() must never tick a producer with no consumers left.
        let names = self.scheduler.task_names();
        if let Some(index) = names.iter().rposition(|n| n == "recording") {
            self.scheduler.remove_task(index)?;
        }

        drained?;
        tracing::info!("complete");
        Ok(())
    }

    /// Whether a recording is in progress.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Global frame counter: frames rendered since start (or reset).
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter.load(Ordering::Acquire)
    }

    /// Frames captured since recording started; zeroed on start and stop.
    pub fn recording_frame_counter(&self) -> u64 {
        self.recording_frames.load(Ordering::Acquire)
    }

    /// Current queue occupancy in `[0, 1]`.
    pub fn buffer_usage(&self) -> f32 {
        self.queue.usage()
    }

    /// The session configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.cfg
    }
}

fn lock_source(
    source: &Arc<Mutex<dyn FrameSource>>,
) -> std::sync::MutexGuard<'_, dyn FrameSource + 'static> {
    source.lock().unwrap_or_else(|e| e.into_inner())
}

fn lock_pool(pool: &Arc<Mutex<WriterPool>>) -> std::sync::MutexGuard<'_, WriterPool> {
    pool.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cfg() -> CaptureConfig {
        CaptureConfig {
            buffer_capacity: 8,
            write_threads: 1,
            clearing_threads: 2,
            out_dir: PathBuf::from("frames"),
            render_hz: 30,
        }
    }

    #[test]
    fn validate_rejects_zero_fields() {
        let mut cfg = base_cfg();
        cfg.buffer_capacity = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base_cfg();
        cfg.write_threads = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base_cfg();
        cfg.clearing_threads = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base_cfg();
        cfg.render_hz = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base_cfg();
        cfg.out_dir = PathBuf::new();
        assert!(cfg.validate().is_err());

        assert!(base_cfg().validate().is_ok());
    }

    #[test]
    fn config_json_round_trips() {
        let cfg = base_cfg();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: CaptureConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.buffer_capacity, cfg.buffer_capacity);
        assert_eq!(back.out_dir, cfg.out_dir);
        assert_eq!(back.render_hz, cfg.render_hz);
    }

    #[test]
    fn from_path_rejects_invalid_values() {
        let dir = std::env::temp_dir().join(format!(
            "cadence_cfg_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cfg.json");
        std::fs::write(
            &path,
            r#"{"buffer_capacity":0,"write_threads":1,"clearing_threads":1,"out_dir":"frames","render_hz":30}"#,
        )
        .unwrap();
        assert!(CaptureConfig::from_path(&path).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
