//! Bounded frame buffering and persistence.
//!
//! [`FrameQueue`](queue::FrameQueue) is the boundary between frame production
//! and disk I/O: a fixed-capacity FIFO whose `enqueue` blocks when full.
//! [`WriterPool`](writer::WriterPool) drains it with a configurable number of
//! worker threads, writing one PNG per frame named by sequence index.

pub mod queue;
pub mod writer;
