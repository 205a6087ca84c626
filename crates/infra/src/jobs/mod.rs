//! Background jobs.

pub mod reclaim;

pub use reclaim::{ReclaimScheduler, ReclaimSchedulerHandle, SchedulerStats};
