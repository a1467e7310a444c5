//! Core logic: quota decisions and the enforcement loop.
//!
//! - [`quota`]: pure `should_block` decision and elapsed-time helpers
//! - [`MonitorLoop`]: the polling daemon that refreshes counters and blocks ports

pub mod monitor;
pub mod quota;

pub use monitor::{CycleReport, MonitorLoop, PortOutcome};
pub use quota::{elapsed_minutes, should_block, BYTES_PER_MB};
