//! Engine status snapshot returned by `status()`.

use crate::capabilities::Capability;
use crate::circuit_breaker::BreakerSnapshot;
use crate::engine::lifecycle::LifecycleState;
use crate::goals::Goal;
use crate::learning::LearningEntry;
use crate::scheduler::{ActionEntry, TaskSnapshot};
use serde::{Deserialize, Serialize};

/// Point-in-time view of the whole engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Lifecycle state.
    pub lifecycle: LifecycleState,
    /// Every registered task with its performance snapshot.
    pub tasks: Vec<TaskSnapshot>,
    /// Breaker guarding the reasoning service.
    pub breaker: BreakerSnapshot,
    /// Most recent history entries, oldest first.
    pub recent_actions: Vec<ActionEntry>,
    /// Active goals, highest priority first.
    pub active_goals: Vec<Goal>,
    /// Number of completed goals retained.
    pub completed_goals: usize,
    /// Most recent learning log entries, oldest first.
    pub recent_learnings: Vec<LearningEntry>,
    /// Learnings recorded since the engine was built.
    pub learnings_recorded: u64,
    /// Capabilities switched on.
    pub capabilities: Vec<Capability>,
    /// Whether the optimizer may rewrite intervals.
    pub optimization_enabled: bool,
    /// Units of background work currently alive.
    pub outstanding_work: usize,
}

impl EngineStatus {
    /// Tasks currently enabled.
    pub fn enabled_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| t.enabled).count()
    }

    /// Tasks with a run in flight.
    pub fn running_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| t.running).count()
    }

    /// Failures recorded across every task.
    pub fn total_failures(&self) -> u64 {
        self.tasks
            .iter()
            .filter_map(|t| t.performance.as_ref())
            .map(|p| p.failure_count)
            .sum()
    }

    /// One-line summary for periodic logging.
    pub fn summary_line(&self) -> String {
        format!(
            "{} | tasks {}/{} enabled, {} running, {} failures | breaker {} | goals {} active, {} done",
            self.lifecycle,
            self.enabled_tasks(),
            self.tasks.len(),
            self.running_tasks(),
            self.total_failures(),
            self.breaker.state,
            self.active_goals.len(),
            self.completed_goals,
        )
    }
}
