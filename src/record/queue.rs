use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::foundation::core::IndexedFrame;
use crate::foundation::error::{CadenceError, CadenceResult};

/// Fixed-capacity FIFO of captured frames awaiting persistence.
///
/// This is the single structure mutated concurrently by producer and
/// consumers. A full queue blocks the producer in [`enqueue`](Self::enqueue)
/// rather than dropping frames; consumers use the non-blocking
/// [`try_dequeue`](Self::try_dequeue). Size never exceeds the configured
/// capacity.
pub struct FrameQueue {
    inner: Mutex<VecDeque<IndexedFrame>>,
    space: Condvar,
    capacity: usize,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames.
    pub fn new(capacity: usize) -> CadenceResult<Self> {
        if capacity < 1 {
            return Err(CadenceError::validation(
                "frame queue capacity must be at least 1",
            ));
        }
        Ok(Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            space: Condvar::new(),
            capacity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<IndexedFrame>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a frame, blocking the caller until a slot is available.
    ///
    /// This is the pipeline's sole deliberate backpressure point: when the
    /// recording task enqueues into a full queue, the scheduler loop itself
    /// stalls here until a writer frees a slot.
    pub fn enqueue(&self, frame: IndexedFrame) {
        let mut queue = self.lock();
        while queue.len() >= self.capacity {
            queue = self
                .space
                .wait(queue)
                .unwrap_or_else(|e| e.into_inner());
        }
        queue.push_back(frame);
    }

    /// Remove and return the oldest frame, or `None` when empty. Never
    /// blocks. Ownership of the frame transfers to the caller.
    pub fn try_dequeue(&self) -> Option<IndexedFrame> {
        let frame = self.lock().pop_front();
        if frame.is_some() {
            self.space.notify_one();
        }
        frame
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Occupancy as a ratio in `[0, 1]`. Advisory only: the value may be
    /// stale by the time the caller acts on it.
    pub fn usage(&self) -> f32 {
        self.len() as f32 / self.capacity as f32
    }
}
