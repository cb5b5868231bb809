//! Priority-ordered goal list.
//!
//! Goals are advanced by the `track_goals` task. Progress only moves
//! forward; reaching 100 moves a goal to the completed list.

use crate::error::{AutonomyError, Result};
use crate::learning::{LearningLog, LearningSource};
use crate::scheduler::tasks::{MAX_PRIORITY, MIN_PRIORITY, truncate_chars};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Category given to goals created through the control surface.
pub const DEFAULT_CATEGORY: &str = "general";

/// Category given to goals proposed by the reasoning service.
pub const AUTONOMOUS_CATEGORY: &str = "autonomous";

/// Progress value at which a goal is complete.
pub const COMPLETE: u8 = 100;

const MAX_STEP_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 500;
const MAX_COMPLETED: usize = 100;

/// A tracked objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    /// Unique id.
    pub id: String,
    /// What the goal is.
    pub description: String,
    /// Free-form category.
    pub category: String,
    /// Priority in `1..=10`.
    pub priority: u8,
    /// Progress in `0..=100`.
    pub progress: u8,
    /// Steps taken so far, oldest first.
    pub steps: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Completion note.
    pub outcome: Option<String>,
}

impl Goal {
    /// Whether the goal has reached 100%.
    pub fn is_complete(&self) -> bool {
        self.progress >= COMPLETE
    }
}

/// Result of [`GoalTracker::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalProgress {
    /// Progress moved to the given value.
    Advanced(u8),
    /// The goal reached 100 and was moved to the completed list.
    Completed,
}

#[derive(Debug, Default)]
struct GoalState {
    active: Vec<Goal>,
    completed: VecDeque<Goal>,
}

/// Active and completed goals.
#[derive(Debug)]
pub struct GoalTracker {
    state: Mutex<GoalState>,
    max_active: usize,
    learnings: Arc<LearningLog>,
}

impl GoalTracker {
    /// Tracker accepting at most `max_active` active goals.
    pub fn new(max_active: usize) -> Self {
        Self {
            state: Mutex::new(GoalState::default()),
            max_active: max_active.max(1),
            learnings: Arc::new(LearningLog::default()),
        }
    }

    /// Record goal creation and completion in `learnings`.
    pub fn with_learning_log(mut self, learnings: Arc<LearningLog>) -> Self {
        self.learnings = learnings;
        self
    }

    /// Log receiving goal learnings.
    pub fn learnings(&self) -> &Arc<LearningLog> {
        &self.learnings
    }

    fn lock(&self) -> MutexGuard<'_, GoalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a goal in the [`DEFAULT_CATEGORY`]. Returns its id.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::GoalLimit`] when the active list is full,
    /// [`AutonomyError::InvalidGoal`] for an empty description or a priority
    /// outside `1..=10`.
    pub fn create_goal(&self, description: &str, priority: u8) -> Result<String> {
        self.create_goal_in(description, DEFAULT_CATEGORY, priority)
    }

    /// Add a goal in `category`. Returns its id.
    ///
    /// # Errors
    ///
    /// Same as [`GoalTracker::create_goal`].
    pub fn create_goal_in(&self, description: &str, category: &str, priority: u8) -> Result<String> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AutonomyError::InvalidGoal(
                "goal description is empty".to_owned(),
            ));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(AutonomyError::InvalidGoal(format!(
                "priority {priority} outside {MIN_PRIORITY}..={MAX_PRIORITY}"
            )));
        }

        let mut state = self.lock();
        if state.active.len() >= self.max_active {
            return Err(AutonomyError::GoalLimit(self.max_active));
        }
        let goal = Goal {
            id: format!("goal-{}", uuid::Uuid::new_v4().simple()),
            description: truncate_chars(description, MAX_DESCRIPTION_CHARS),
            category: category.to_owned(),
            priority,
            progress: 0,
            steps: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            outcome: None,
        };
        let id = goal.id.clone();
        info!(goal_id = %id, priority, category, "goal created: {}", goal.description);
        self.learnings.record(
            LearningSource::Goals,
            &format!("Goal created: {}", goal.description),
        );
        state.active.push(goal);
        Ok(id)
    }

    /// Active goals, highest priority first. Equal priorities keep
    /// creation order.
    pub fn list_active(&self) -> Vec<Goal> {
        let mut active = self.lock().active.clone();
        active.sort_by(|a, b| b.priority.cmp(&a.priority));
        active
    }

    /// Completed goals, oldest completion first.
    pub fn list_completed(&self) -> Vec<Goal> {
        self.lock().completed.iter().cloned().collect()
    }

    /// The goal in focus: highest priority, earliest created.
    pub fn focus(&self) -> Option<Goal> {
        let state = self.lock();
        let mut best: Option<&Goal> = None;
        for goal in &state.active {
            if best.is_none_or(|b| goal.priority > b.priority) {
                best = Some(goal);
            }
        }
        best.cloned()
    }

    /// Number of active goals.
    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Record `step` against goal `id` and move its progress forward.
    ///
    /// With an `estimate` the new progress is the larger of the current
    /// value and the estimate; without one it grows by `step_progress`.
    /// Progress never decreases and is capped at 100.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownGoal`] if `id` is not active.
    pub fn advance(
        &self,
        id: &str,
        step: &str,
        estimate: Option<u8>,
        step_progress: u8,
    ) -> Result<GoalProgress> {
        let mut state = self.lock();
        let idx = state
            .active
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| AutonomyError::UnknownGoal(id.to_owned()))?;

        let goal = &mut state.active[idx];
        let step = step.trim();
        if !step.is_empty() {
            goal.steps.push(truncate_chars(step, MAX_STEP_CHARS));
        }
        let next = match estimate {
            Some(estimate) => goal.progress.max(estimate),
            None => goal.progress.saturating_add(step_progress),
        };
        goal.progress = next.min(COMPLETE);

        if !goal.is_complete() {
            return Ok(GoalProgress::Advanced(goal.progress));
        }
        let goal = state.active.remove(idx);
        self.finish(&mut state, goal, "achieved through autonomous work");
        Ok(GoalProgress::Completed)
    }

    /// Mark goal `id` complete regardless of its progress.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownGoal`] if `id` is not active.
    pub fn complete(&self, id: &str, outcome: &str) -> Result<()> {
        let mut state = self.lock();
        let idx = state
            .active
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| AutonomyError::UnknownGoal(id.to_owned()))?;
        let mut goal = state.active.remove(idx);
        goal.progress = COMPLETE;
        self.finish(&mut state, goal, outcome);
        Ok(())
    }

    /// Drop goal `id` from the active list without completing it.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownGoal`] if `id` is not active.
    pub fn abandon(&self, id: &str) -> Result<Goal> {
        let mut state = self.lock();
        let idx = state
            .active
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| AutonomyError::UnknownGoal(id.to_owned()))?;
        let goal = state.active.remove(idx);
        info!(goal_id = %goal.id, progress = goal.progress, "goal abandoned");
        Ok(goal)
    }

    fn finish(&self, state: &mut GoalState, mut goal: Goal, outcome: &str) {
        goal.completed_at = Some(Utc::now());
        goal.outcome = Some(outcome.to_owned());
        info!(goal_id = %goal.id, "goal completed: {}", goal.description);
        self.learnings.record(
            LearningSource::Goals,
            &format!("Goal completed: {} - {outcome}", goal.description),
        );
        if state.completed.len() == MAX_COMPLETED {
            state.completed.pop_front();
        }
        state.completed.push_back(goal);
    }
}
