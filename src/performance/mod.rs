//! Per-task performance statistics and the interval optimizer.
//!
//! The [`PerformanceTracker`] records every completed execution. After each
//! update the scheduler asks the [`IntervalOptimizer`] whether the task's
//! interval should move, always inside the task's [`IntervalBounds`].

pub mod optimizer;
pub mod tracker;

pub use optimizer::{IntervalAdjustment, IntervalBounds, IntervalOptimizer};
pub use tracker::{PerformanceRecord, PerformanceSnapshot, PerformanceTracker};
