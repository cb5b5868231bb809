//! The `track_goals` task.

use crate::config::GoalsConfig;
use crate::goals::tracker::{AUTONOMOUS_CATEGORY, Goal, GoalProgress, GoalTracker};
use crate::scheduler::tasks::{TaskBody, TaskContext, TaskResult};
use crate::services::GuardedReasoner;
use crate::tasks::meaningful_reply;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Priority given to goals the reasoning service proposes.
const PROPOSED_PRIORITY: u8 = 3;

/// Replies this short carry no usable step.
const MIN_REPLY_CHARS: usize = 10;

/// Advances the goal in focus by one step per run.
pub struct TrackGoalsTask {
    goals: Arc<GoalTracker>,
    reasoner: GuardedReasoner,
    config: GoalsConfig,
}

impl TrackGoalsTask {
    /// Task working on `goals` through `reasoner`.
    pub fn new(goals: Arc<GoalTracker>, reasoner: GuardedReasoner, config: GoalsConfig) -> Self {
        Self {
            goals,
            reasoner,
            config,
        }
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.config.call_timeout_secs)
    }

    async fn work_on(&self, goal: Goal) -> TaskResult {
        let prompt = progress_prompt(&goal);
        let reply = match self.reasoner.complete(&prompt, self.call_timeout()).await {
            Ok(reply) => reply,
            Err(e) => return TaskResult::Error(format!("goal assessment failed: {e}")),
        };

        let Some(step) = meaningful_reply(&reply, MIN_REPLY_CHARS) else {
            return TaskResult::Skipped(format!("no step proposed for goal {}", goal.id));
        };
        let estimate = parse_progress(step);
        let step = strip_progress(step);
        debug!(goal_id = %goal.id, ?estimate, "goal step: {step}");

        match self
            .goals
            .advance(&goal.id, &step, estimate, self.config.step_progress)
        {
            Ok(GoalProgress::Completed) => {
                TaskResult::Success(format!("goal completed: {}", goal.description))
            }
            Ok(GoalProgress::Advanced(progress)) => {
                TaskResult::Success(format!("goal {} at {progress}%: {step}", goal.id))
            }
            // Abandoned while the call was in flight.
            Err(e) => TaskResult::Skipped(e.to_string()),
        }
    }

    async fn propose(&self) -> TaskResult {
        if !self.config.propose_when_idle {
            return TaskResult::Skipped("no active goals".to_owned());
        }
        let reply = match self.reasoner.complete(PROPOSE_PROMPT, self.call_timeout()).await {
            Ok(reply) => reply,
            Err(e) => return TaskResult::Error(format!("goal proposal failed: {e}")),
        };
        let Some(description) = meaningful_reply(&reply, MIN_REPLY_CHARS) else {
            return TaskResult::Skipped("no goal proposed".to_owned());
        };
        match self
            .goals
            .create_goal_in(description, AUTONOMOUS_CATEGORY, PROPOSED_PRIORITY)
        {
            Ok(id) => {
                info!(goal_id = %id, "adopted proposed goal");
                TaskResult::Success(format!("proposed goal: {description}"))
            }
            Err(e) => TaskResult::Skipped(e.to_string()),
        }
    }
}

#[async_trait]
impl TaskBody for TrackGoalsTask {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult {
        match self.goals.focus() {
            Some(goal) => self.work_on(goal).await,
            None => self.propose().await,
        }
    }
}

const PROPOSE_PROMPT: &str = "Based on your recent activities and what you've learned, \
what's ONE goal you should pursue?\n\n\
Examples:\n\
- Learn more about a specific technology\n\
- Organize knowledge in a category\n\
- Research a topic in depth\n\n\
Respond with just the goal description (under 50 words), or \"none\".";

fn progress_prompt(goal: &Goal) -> String {
    let steps = if goal.steps.is_empty() {
        "None yet".to_owned()
    } else {
        goal.steps.join("; ")
    };
    format!(
        "You have this goal: {}\n\n\
         Current progress: {}%\n\
         Steps completed: {steps}\n\n\
         What's ONE specific action you can take right now to make progress? \
         Be brief (under 50 words). On a final line write PROGRESS: <0-100> with \
         your estimate of overall progress after that action. Reply \"none\" if \
         there is nothing to do.",
        goal.description, goal.progress
    )
}

/// Value of a `PROGRESS: n` line, capped at 100.
fn parse_progress(reply: &str) -> Option<u8> {
    reply.lines().find_map(|line| {
        let line = line.trim();
        let rest = line
            .get(..9)
            .filter(|head| head.eq_ignore_ascii_case("progress:"))
            .map(|_| &line[9..])?;
        let digits: String = rest
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse::<u32>().ok().map(|n| n.min(100) as u8)
    })
}

fn strip_progress(reply: &str) -> String {
    reply
        .lines()
        .filter(|line| parse_progress(line).is_none())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_owned()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::circuit_breaker::CircuitBreaker;
    use crate::services::ServiceError;
    use crate::test_utils::ScriptedReasoner;
    use tokio_util::sync::CancellationToken;

    fn task(goals: &Arc<GoalTracker>, reasoner: ScriptedReasoner) -> TrackGoalsTask {
        let reasoner = GuardedReasoner::new(Arc::new(reasoner), Arc::new(CircuitBreaker::default()));
        TrackGoalsTask::new(Arc::clone(goals), reasoner, GoalsConfig::default())
    }

    fn ctx() -> TaskContext {
        TaskContext::new("track_goals", CancellationToken::new())
    }

    #[test]
    fn parses_progress_lines() {
        assert_eq!(parse_progress("read chapter 3\nPROGRESS: 45"), Some(45));
        assert_eq!(parse_progress("progress:120"), Some(100));
        assert_eq!(parse_progress("no estimate here"), None);
        assert_eq!(strip_progress("read chapter 3\nPROGRESS: 45"), "read chapter 3");
    }

    #[tokio::test]
    async fn works_on_highest_priority_goal() {
        let goals = Arc::new(GoalTracker::new(10));
        goals.create_goal("low priority goal", 3).unwrap();
        let high = goals.create_goal("high priority goal", 9).unwrap();

        let reasoner = ScriptedReasoner::always("Read the async book chapter.\nPROGRESS: 30");
        let result = task(&goals, reasoner).run(&ctx()).await;

        assert!(matches!(result, TaskResult::Success(_)));
        let focus = goals.focus().unwrap();
        assert_eq!(focus.id, high);
        assert_eq!(focus.progress, 30);
        assert_eq!(focus.steps, vec!["Read the async book chapter."]);
        let low = goals.list_active().pop().unwrap();
        assert_eq!(low.progress, 0);
    }

    #[tokio::test]
    async fn reply_without_estimate_adds_step_progress() {
        let goals = Arc::new(GoalTracker::new(10));
        goals.create_goal("goal", 5).unwrap();
        let reasoner = ScriptedReasoner::always("Outline the next three chapters.");
        task(&goals, reasoner).run(&ctx()).await;
        assert_eq!(goals.focus().unwrap().progress, 10);
    }

    #[tokio::test]
    async fn service_error_leaves_goal_untouched() {
        let goals = Arc::new(GoalTracker::new(10));
        goals.create_goal("goal", 5).unwrap();
        let reasoner = ScriptedReasoner::failing(ServiceError::Timeout);
        let result = task(&goals, reasoner).run(&ctx()).await;

        assert!(matches!(result, TaskResult::Error(_)));
        let goal = goals.focus().unwrap();
        assert_eq!(goal.progress, 0);
        assert!(goal.steps.is_empty());
    }

    #[tokio::test]
    async fn completes_goal_at_100() {
        let goals = Arc::new(GoalTracker::new(10));
        goals.create_goal("goal", 5).unwrap();
        let reasoner = ScriptedReasoner::always("Publish the summary.\nPROGRESS: 100");
        let result = task(&goals, reasoner).run(&ctx()).await;

        assert!(matches!(result, TaskResult::Success(s) if s.starts_with("goal completed")));
        assert_eq!(goals.active_count(), 0);
        assert_eq!(goals.list_completed().len(), 1);
    }

    #[tokio::test]
    async fn proposes_goal_when_idle() {
        let goals = Arc::new(GoalTracker::new(10));
        let reasoner = ScriptedReasoner::always("Learn how tokio schedules tasks");
        let result = task(&goals, reasoner).run(&ctx()).await;

        assert!(matches!(result, TaskResult::Success(_)));
        let goal = goals.focus().unwrap();
        assert_eq!(goal.category, AUTONOMOUS_CATEGORY);
        assert_eq!(goal.priority, PROPOSED_PRIORITY);
    }

    #[tokio::test]
    async fn declined_proposal_is_skipped() {
        let goals = Arc::new(GoalTracker::new(10));
        let result = task(&goals, ScriptedReasoner::always("none")).run(&ctx()).await;
        assert!(matches!(result, TaskResult::Skipped(_)));
        assert_eq!(goals.active_count(), 0);
    }
}
