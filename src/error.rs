//! Error types for the autonomy engine.
//!
//! Each error variant carries a stable error code (SCREAMING_SNAKE_CASE)
//! that is included in the Display output and accessible via [`AutonomyError::code()`].

use crate::services::ServiceError;

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// A task with the same id is already registered.
    pub const DUPLICATE_TASK: &str = "DUPLICATE_TASK";

    /// No task is registered under the given id.
    pub const UNKNOWN_TASK: &str = "UNKNOWN_TASK";

    /// Task definition is malformed (priority or interval bounds).
    pub const INVALID_TASK: &str = "INVALID_TASK";

    /// A task body failed or timed out.
    pub const TASK_FAILED: &str = "TASK_FAILED";

    /// The circuit breaker short-circuited the call.
    pub const CIRCUIT_OPEN: &str = "CIRCUIT_OPEN";

    /// A decision cycle overran its deadline and was discarded.
    pub const DECISION_ABANDONED: &str = "DECISION_ABANDONED";

    /// The active goal list is full.
    pub const GOAL_LIMIT: &str = "GOAL_LIMIT";

    /// No active goal exists under the given id.
    pub const UNKNOWN_GOAL: &str = "UNKNOWN_GOAL";

    /// Goal definition is malformed (empty description, bad priority).
    pub const INVALID_GOAL: &str = "INVALID_GOAL";

    /// An external collaborator failed.
    pub const SERVICE_ERROR: &str = "SERVICE_ERROR";

    /// Invalid or unreadable configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Filesystem error.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Errors produced by the autonomy engine.
///
/// Only registry misuse ([`DuplicateTask`](Self::DuplicateTask),
/// [`UnknownTask`](Self::UnknownTask), [`InvalidTask`](Self::InvalidTask))
/// and goal misuse are surfaced to control-surface callers. Everything raised
/// inside a task or a decision cycle is contained at that boundary and turned
/// into a recorded failure.
#[derive(Debug, thiserror::Error)]
pub enum AutonomyError {
    /// A task with this id is already registered.
    #[error("[{}] task already registered: {}", error_codes::DUPLICATE_TASK, .0)]
    DuplicateTask(String),

    /// No task with this id is registered.
    #[error("[{}] unknown task: {}", error_codes::UNKNOWN_TASK, .0)]
    UnknownTask(String),

    /// Task definition rejected at registration.
    #[error("[{}] {}", error_codes::INVALID_TASK, .0)]
    InvalidTask(String),

    /// A task body failed or exceeded its deadline.
    #[error("[{}] task {task_id} failed: {reason}", error_codes::TASK_FAILED)]
    TaskExecution {
        /// Task that failed.
        task_id: String,
        /// Failure description.
        reason: String,
    },

    /// The reasoning service is short-circuited by the breaker.
    #[error("[{}] circuit open; retry after {retry_after_secs}s", error_codes::CIRCUIT_OPEN)]
    CircuitOpen {
        /// Seconds until the breaker admits a trial call (0 while a trial is in flight).
        retry_after_secs: u64,
    },

    /// A decision cycle overran and its result was discarded.
    #[error("[{}] decision cycle exceeded {timeout_secs}s", error_codes::DECISION_ABANDONED)]
    DecisionCycleAbandoned {
        /// The cycle deadline that was exceeded.
        timeout_secs: u64,
    },

    /// Too many active goals.
    #[error("[{}] at most {} active goals allowed", error_codes::GOAL_LIMIT, .0)]
    GoalLimit(usize),

    /// No active goal with this id.
    #[error("[{}] unknown goal: {}", error_codes::UNKNOWN_GOAL, .0)]
    UnknownGoal(String),

    /// Goal definition rejected at creation.
    #[error("[{}] {}", error_codes::INVALID_GOAL, .0)]
    InvalidGoal(String),

    /// An external collaborator failed.
    #[error("[{}] {}", error_codes::SERVICE_ERROR, .0)]
    Service(#[from] ServiceError),

    /// Configuration error.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// I/O error.
    #[error("[{}] {}", error_codes::IO_ERROR, .0)]
    Io(#[from] std::io::Error),
}

impl AutonomyError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateTask(_) => error_codes::DUPLICATE_TASK,
            Self::UnknownTask(_) => error_codes::UNKNOWN_TASK,
            Self::InvalidTask(_) => error_codes::INVALID_TASK,
            Self::TaskExecution { .. } => error_codes::TASK_FAILED,
            Self::CircuitOpen { .. } => error_codes::CIRCUIT_OPEN,
            Self::DecisionCycleAbandoned { .. } => error_codes::DECISION_ABANDONED,
            Self::GoalLimit(_) => error_codes::GOAL_LIMIT,
            Self::UnknownGoal(_) => error_codes::UNKNOWN_GOAL,
            Self::InvalidGoal(_) => error_codes::INVALID_GOAL,
            Self::Service(_) => error_codes::SERVICE_ERROR,
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Io(_) => error_codes::IO_ERROR,
        }
    }

    /// Returns `true` for failures that callers should treat as transient.
    ///
    /// An open circuit and collaborator timeouts/unavailability clear up on
    /// their own; registry misuse and configuration errors never do.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::CircuitOpen { .. } | Self::DecisionCycleAbandoned { .. } => true,
            Self::Service(e) => !matches!(e, ServiceError::InvalidResponse(_)),
            _ => false,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AutonomyError>;
