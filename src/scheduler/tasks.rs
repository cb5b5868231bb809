//! Task definitions.
//!
//! Defines the [`TaskSpec`] registered with the scheduler, the [`TaskBody`]
//! capability it executes, and the result/outcome types recorded after
//! each run.

use crate::error::{AutonomyError, Result};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lowest accepted priority.
pub const MIN_PRIORITY: u8 = 1;

/// Highest accepted priority.
pub const MAX_PRIORITY: u8 = 10;

/// Result returned by a task body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    /// Task completed successfully with a summary message.
    Success(String),
    /// Task had nothing to do (capability off, not enough input).
    Skipped(String),
    /// Task failed with an error message.
    Error(String),
}

impl TaskResult {
    /// Outcome recorded for this result.
    pub fn outcome(&self) -> TaskRunOutcome {
        match self {
            Self::Success(_) => TaskRunOutcome::Success,
            Self::Skipped(_) => TaskRunOutcome::Skipped,
            Self::Error(_) => TaskRunOutcome::Failure,
        }
    }

    /// Human-readable summary.
    pub fn summary(&self) -> &str {
        match self {
            Self::Success(s) | Self::Skipped(s) | Self::Error(s) => s,
        }
    }
}

impl From<AutonomyError> for TaskResult {
    fn from(e: AutonomyError) -> Self {
        Self::Error(e.to_string())
    }
}

/// Recorded outcome of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunOutcome {
    /// Body returned [`TaskResult::Success`].
    Success,
    /// Body returned [`TaskResult::Skipped`].
    Skipped,
    /// Body returned [`TaskResult::Error`] or panicked.
    Failure,
    /// Body exceeded the execution deadline.
    TimedOut,
    /// Body was cancelled by shutdown.
    Cancelled,
}

impl TaskRunOutcome {
    /// Whether the run counts as a success for performance tracking.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::Skipped)
    }
}

impl std::fmt::Display for TaskRunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failure => "failure",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Per-execution context handed to a task body.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: String,
    shutdown: CancellationToken,
}

impl TaskContext {
    /// Context for one run of `task_id`.
    pub fn new(task_id: impl Into<String>, shutdown: CancellationToken) -> Self {
        Self {
            task_id: task_id.into(),
            shutdown,
        }
    }

    /// Id of the running task.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Whether the engine is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves when the engine starts shutting down.
    pub async fn shutdown(&self) {
        self.shutdown.cancelled().await;
    }
}

/// An executable unit of background work.
///
/// Bodies should check [`TaskContext::is_shutting_down`] between steps; the
/// scheduler also drops the future outright once the shutdown grace period
/// runs out.
#[async_trait]
pub trait TaskBody: Send + Sync {
    /// Run once.
    async fn run(&self, ctx: &TaskContext) -> TaskResult;
}

type BoxedRunFn = Box<dyn Fn(TaskContext) -> BoxFuture<'static, TaskResult> + Send + Sync>;

/// [`TaskBody`] backed by an async closure.
pub struct FnTask {
    run: BoxedRunFn,
}

impl FnTask {
    /// Wrap `f`.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = TaskResult> + Send + 'static,
    {
        Self {
            run: Box::new(move |ctx| Box::pin(f(ctx))),
        }
    }
}

#[async_trait]
impl TaskBody for FnTask {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        (self.run)(ctx.clone()).await
    }
}

/// Registration-time description of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique task identifier (e.g. `"self_test"`).
    pub id: String,
    /// Human-readable task name.
    pub name: String,
    /// What the task does.
    pub description: String,
    /// Initial interval between runs.
    pub interval: Duration,
    /// Priority in `1..=10`; higher runs first.
    pub priority: u8,
    /// Whether the task starts enabled.
    pub enabled: bool,
    /// Task-specific lower bound for the optimizer.
    pub min_interval: Option<Duration>,
    /// Task-specific upper bound for the optimizer.
    pub max_interval: Option<Duration>,
}

impl TaskSpec {
    /// Create an enabled task with priority 5.
    pub fn new(id: impl Into<String>, name: impl Into<String>, interval: Duration) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            interval,
            priority: 5,
            enabled: true,
            min_interval: None,
            max_interval: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set task-specific interval bounds.
    pub fn with_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_interval = Some(min);
        self.max_interval = Some(max);
        self
    }

    /// Register the task disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Reject malformed definitions.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::InvalidTask`] for an empty id, a priority outside
    /// `1..=10`, a zero interval or `min > max`.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AutonomyError::InvalidTask("task id must not be empty".to_owned()));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(AutonomyError::InvalidTask(format!(
                "task {} priority {} outside {MIN_PRIORITY}..={MAX_PRIORITY}",
                self.id, self.priority
            )));
        }
        if self.interval.as_secs() == 0 {
            return Err(AutonomyError::InvalidTask(format!(
                "task {} interval must be at least one second",
                self.id
            )));
        }
        if matches!((self.min_interval, self.max_interval), (Some(min), Some(max)) if min > max) {
            return Err(AutonomyError::InvalidTask(format!(
                "task {} min interval exceeds max interval",
                self.id
            )));
        }
        Ok(())
    }
}

/// Truncate `text` to at most `max_chars` characters.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_owned(),
        None => text.to_owned(),
    }
}
