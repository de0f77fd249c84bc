use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::foundation::core::IndexedFrame;
use crate::foundation::error::{CadenceError, CadenceResult};
use crate::record::queue::FrameQueue;

/// Worker threads draining a [`FrameQueue`] to durable storage.
///
/// Each worker claims frames with a non-blocking dequeue and writes one PNG
/// per frame, named by sequence index, into the configured output directory.
/// The pool runs with either the recording thread count or, during a
/// [`drain`](Self::drain), the clearing thread count — never both.
///
/// A failed write is fatal to the process: for a deterministic frame-indexed
/// sequence, a silently skipped frame is worse than a fast, visible failure.
pub struct WriterPool {
    queue: Arc<FrameQueue>,
    out_dir: PathBuf,
    interrupt: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    handles: Vec<JoinHandle<()>>,
}

impl WriterPool {
    /// Create a stopped pool writing into `out_dir` (created on first start).
    pub fn new(queue: Arc<FrameQueue>, out_dir: impl Into<PathBuf>) -> CadenceResult<Self> {
        let out_dir = out_dir.into();
        if out_dir.as_os_str().is_empty() {
            return Err(CadenceError::validation(
                "writer pool output directory must not be empty",
            ));
        }
        Ok(Self {
            queue,
            out_dir,
            interrupt: Arc::new(AtomicBool::new(true)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            handles: Vec::new(),
        })
    }

    /// Whether worker threads are currently accepting frames.
    pub fn is_running(&self) -> bool {
        !self.interrupt.load(Ordering::Acquire)
    }

    /// Number of worker threads in the current configuration.
    pub fn thread_count(&self) -> usize {
        self.handles.len()
    }

    /// Output directory for frame files.
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Queue occupancy passthrough, in `[0, 1]`.
    pub fn usage(&self) -> f32 {
        self.queue.usage()
    }

    /// Spawn `threads` workers. Creates the output directory if absent.
    ///
    /// No-op when the pool is already running.
    pub fn start(&mut self, threads: usize) -> CadenceResult<()> {
        if self.is_running() {
            return Ok(());
        }
        if threads < 1 {
            return Err(CadenceError::validation(
                "writer pool thread count must be at least 1",
            ));
        }
        std::fs::create_dir_all(&self.out_dir).map_err(|e| {
            CadenceError::persistence(format!(
                "failed to create output directory '{}': {e}",
                self.out_dir.display()
            ))
        })?;

        // Reap any workers left from a previous run.
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }

        self.interrupt.store(false, Ordering::Release);
        for _ in 0..threads {
            let queue = Arc::clone(&self.queue);
            let out_dir = self.out_dir.clone();
            let interrupt = Arc::clone(&self.interrupt);
            let in_flight = Arc::clone(&self.in_flight);
            self.handles.push(std::thread::spawn(move || {
                run_writer(&queue, &out_dir, &interrupt, &in_flight);
            }));
        }
        tracing::debug!(threads, out_dir = %self.out_dir.display(), "writer pool started");
        Ok(())
    }

    /// Signal workers to exit and wait until all of them have.
    ///
    /// The wait polls thread liveness rather than blocking on a join, so it
    /// spins; callers should bound its use to lifecycle transitions. No-op
    /// when already stopped.
    pub fn stop(&mut self) {
        if self.interrupt.swap(true, Ordering::AcqRel) && self.handles.is_empty() {
            return;
        }
        loop {
            if self.handles.iter().all(|h| h.is_finished()) {
                break;
            }
            std::thread::yield_now();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// Empty the queue using `clearing_threads` workers, then stop.
    ///
    /// Stops the current workers, restarts with the clearing count, and polls
    /// until the queue is empty *and* every claimed frame has finished
    /// writing — a worker mid-write on the final frame is waited for, so
    /// completion really means fully persisted. Progress is logged roughly
    /// once per second. The pool is left stopped; the caller decides whether
    /// to restart it with the recording thread count.
    pub fn drain(&mut self, clearing_threads: usize) -> CadenceResult<()> {
        self.stop();
        self.start(clearing_threads)?;

        let mut timer = Instant::now();
        while !(self.queue.is_empty() && self.in_flight.load(Ordering::SeqCst) == 0) {
            if timer.elapsed() >= Duration::from_secs(1) {
                timer = Instant::now();
                tracing::info!("{:.1}% left", self.queue.usage() * 100.0);
            }
            std::thread::yield_now();
        }

        self.stop();
        Ok(())
    }
}

impl Drop for WriterPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_writer(
    queue: &FrameQueue,
    out_dir: &Path,
    interrupt: &AtomicBool,
    in_flight: &AtomicUsize,
) {
    while !interrupt.load(Ordering::Acquire) {
        // Claim accounting must precede the dequeue so an observer never
        // sees an empty queue while a claimed frame is still unwritten.
        in_flight.fetch_add(1, Ordering::SeqCst);
        match queue.try_dequeue() {
            Some(frame) => {
                persist_frame(out_dir, &frame);
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            None => {
                in_flight.fetch_sub(1, Ordering::SeqCst);
                std::thread::yield_now();
            }
        }
    }
}

/// Write one frame as `{index}.png`. Fatal on failure.
fn persist_frame(out_dir: &Path, frame: &IndexedFrame) {
    let path = out_dir.join(format!("{}.png", frame.index.0));
    let result = image::save_buffer_with_format(
        &path,
        &frame.image.data,
        frame.image.width,
        frame.image.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    );
    if let Err(e) = result {
        tracing::error!(frame = frame.index.0, path = %path.display(), error = %e, "frame write failed");
        std::process::exit(1);
    }
}
