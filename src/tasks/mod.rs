//! Built-in background tasks.
//!
//! Each task is a [`TaskBody`] that reaches the outside world only through
//! the collaborators bundled in [`TaskServices`]. Reasoning calls always go
//! through the shared breaker.

pub mod consolidate;
pub mod monitor;
pub mod research;
pub mod suggestions;

use crate::capabilities::{Capabilities, Capability};
use crate::config::TasksConfig;
use crate::learning::LearningLog;
use crate::scheduler::history::ActionHistory;
use crate::scheduler::tasks::{TaskBody, TaskResult, TaskSpec};
use crate::services::{FactStore, GuardedReasoner, NotificationSink};
use std::sync::Arc;
use std::time::Duration;

pub use consolidate::ConsolidateKnowledgeTask;
pub use monitor::{HttpProbe, ProbeTask};
pub use research::ResearchTopicsTask;
pub use self_test::{SelfTestCheck, SelfTestReport, SelfTestTask};
pub use suggestions::OfferSuggestionsTask;

// ---------------------------------------------------------------------------
// Well-known task ids
// ---------------------------------------------------------------------------

/// Research a topic and record one fact about it.
pub const TASK_RESEARCH_TOPICS: &str = "research_topics";

/// Review recent facts for duplicates.
pub const TASK_CONSOLIDATE_KNOWLEDGE: &str = "consolidate_knowledge";

/// Check collaborators and engine health.
pub const TASK_SELF_TEST: &str = "self_test";

/// Offer the user one suggestion based on recent activity.
pub const TASK_OFFER_SUGGESTIONS: &str = "offer_suggestions";

/// Run the network probe.
pub const TASK_MONITOR_NETWORK: &str = "monitor_network";

/// Advance the goal in focus.
pub const TASK_TRACK_GOALS: &str = "track_goals";

/// Collaborators shared by the built-in tasks.
#[derive(Clone)]
pub struct TaskServices {
    /// Breaker-guarded reasoning service.
    pub reasoner: GuardedReasoner,
    /// Fact store.
    pub facts: Arc<dyn FactStore>,
    /// Notification sink (best effort).
    pub sink: Arc<dyn NotificationSink>,
    /// Capability switches.
    pub capabilities: Arc<Capabilities>,
    /// Action history, read by suggestions and self-test.
    pub history: Arc<ActionHistory>,
    /// Learning log, written by self-test, consolidation and probes.
    pub learnings: Arc<LearningLog>,
    /// Task settings.
    pub config: TasksConfig,
}

impl TaskServices {
    /// Deadline for ordinary reasoning calls.
    pub fn call_timeout(&self) -> Duration {
        self.config.call_timeout()
    }

    /// `Some(skipped)` when `capability` is off.
    pub(crate) fn require(&self, capability: Capability) -> Option<TaskResult> {
        (!self.capabilities.is_enabled(capability))
            .then(|| TaskResult::Skipped(format!("{capability} capability disabled")))
    }
}

/// The built-in tasks that need no external probe, with their default
/// schedules. `self_test` is passed in so its caller can read back the last
/// report. `track_goals` is built separately since the engine owns the goal
/// tracker.
pub fn builtin_tasks(
    services: &TaskServices,
    self_test: Arc<SelfTestTask>,
) -> Vec<(TaskSpec, Arc<dyn TaskBody>)> {
    vec![
        (
            TaskSpec::new(TASK_RESEARCH_TOPICS, "Research Topics", Duration::from_secs(1800))
                .with_description("Research an interesting topic and remember one fact")
                .with_priority(3),
            Arc::new(ResearchTopicsTask::new(services.clone())),
        ),
        (
            TaskSpec::new(
                TASK_CONSOLIDATE_KNOWLEDGE,
                "Consolidate Knowledge",
                Duration::from_secs(3600),
            )
            .with_description("Look for duplicate facts among recent learnings")
            .with_priority(2),
            Arc::new(ConsolidateKnowledgeTask::new(services.clone())),
        ),
        (
            TaskSpec::new(TASK_SELF_TEST, "Self Test", Duration::from_secs(7200))
                .with_description("Check the reasoning service, fact store and breaker")
                .with_priority(1),
            self_test,
        ),
        (
            TaskSpec::new(TASK_OFFER_SUGGESTIONS, "Offer Suggestions", Duration::from_secs(900))
                .with_description("Offer one suggestion based on recent activity")
                .with_priority(3),
            Arc::new(OfferSuggestionsTask::new(services.clone())),
        ),
    ]
}

/// Trimmed reply, or `None` when it is at most `min_chars` long or
/// declines with "none".
pub(crate) fn meaningful_reply(reply: &str, min_chars: usize) -> Option<&str> {
    let reply = reply.trim();
    if reply.chars().count() <= min_chars || reply.to_lowercase().starts_with("none") {
        None
    } else {
        Some(reply)
    }
}
