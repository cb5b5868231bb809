//! Goal tracking.
//!
//! [`GoalTracker`] holds the goal list; [`TrackGoalsTask`] is the registered
//! task that advances the goal in focus on every run.

pub mod task;
pub mod tracker;

pub use task::TrackGoalsTask;
pub use tracker::{AUTONOMOUS_CATEGORY, DEFAULT_CATEGORY, Goal, GoalProgress, GoalTracker};
