//! Capture lifecycle orchestration.

pub mod capture;
