//! Background task scheduler.
//!
//! Holds the task registry, dispatches due tasks by priority under a
//! concurrency ceiling, and records every completion in the performance
//! tracker and the action history.

pub mod history;
pub mod registry;
pub mod runner;
pub mod tasks;

pub use history::{AD_HOC, ActionEntry, ActionHistory, ActionOutcome};
pub use registry::{TaskRegistry, TriggerOutcome};
pub use runner::{RunNowOutcome, Scheduler, TaskSnapshot};
pub use tasks::{FnTask, TaskBody, TaskContext, TaskResult, TaskRunOutcome, TaskSpec};
