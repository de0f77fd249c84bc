//! Cadence drives independently-timed periodic tasks from one monotonic clock
//! and couples them to a bounded frame-recording pipeline.
//!
//! The public API is session-oriented:
//!
//! - Register periodic tasks on a [`Scheduler`] (one background loop, one
//!   monotonic clock, per-second statistics to [`StatsListener`]s)
//! - Buffer captured frames through a bounded [`FrameQueue`] drained by a
//!   [`WriterPool`] of PNG writer threads
//! - Integrate both through a [`CaptureSession`], which records frames from a
//!   [`FrameSource`] under explicit backpressure and drains the buffer before
//!   resuming capture
#![forbid(unsafe_code)]

mod foundation;

pub mod record;
pub mod scheduler;
pub mod session;

pub use crate::foundation::core::{FrameImage, FrameIndex, IndexedFrame};
pub use crate::foundation::error::{CadenceError, CadenceResult};

pub use crate::record::queue::FrameQueue;
pub use crate::record::writer::WriterPool;
pub use crate::scheduler::{Scheduler, StatsListener, TaskStats};
pub use crate::session::capture::{CaptureConfig, CaptureSession, FrameSource};
