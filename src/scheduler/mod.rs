//! Multi-rate periodic task scheduling on a single monotonic clock.
//!
//! One background loop owns all registered tasks. The fastest task drives the
//! master tick; every other task fires at a rate derived from its
//! frequency-ratio to the fastest one, which keeps long-run rates drift-free
//! without per-task wall-clock bookkeeping.

mod multirate;
mod task;

pub use multirate::Scheduler;
pub use task::{StatsListener, TaskStats};

pub(crate) use task::TaskSlot;
