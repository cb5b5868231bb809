//! `research_topics`: pick a topic, learn one fact about it.

use crate::capabilities::Capability;
use crate::scheduler::tasks::{TaskBody, TaskContext, TaskResult, truncate_chars};
use crate::tasks::{TaskServices, meaningful_reply};
use async_trait::async_trait;
use tracing::info;

/// Category under which researched facts are stored.
pub const RESEARCH_CATEGORY: &str = "autonomous_research";

const TOPIC_PROMPT: &str = "What's one interesting topic related to AI, technology, or science \
you'd like to learn more about right now?\n\nAnswer with just the topic name, nothing else.";

const MAX_TOPIC_CHARS: usize = 100;

/// Asks the reasoning service for a topic, then for one fact about it.
pub struct ResearchTopicsTask {
    services: TaskServices,
}

impl ResearchTopicsTask {
    /// New task over `services`.
    pub fn new(services: TaskServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl TaskBody for ResearchTopicsTask {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        if let Some(skipped) = self.services.require(Capability::Research) {
            return skipped;
        }
        let timeout = self.services.call_timeout();

        let topic = match self.services.reasoner.complete(TOPIC_PROMPT, timeout).await {
            Ok(reply) => reply,
            Err(e) => return TaskResult::Error(format!("topic selection failed: {e}")),
        };
        let Some(topic) = meaningful_reply(&topic, 5) else {
            return TaskResult::Skipped("no topic worth researching".to_owned());
        };
        let topic = truncate_chars(topic, MAX_TOPIC_CHARS);
        info!(topic = %topic, "researching");

        if ctx.is_shutting_down() {
            return TaskResult::Skipped("shutdown requested".to_owned());
        }
        let prompt = format!(
            "I'm researching '{topic}'. What's one interesting, accurate fact I should \
             remember about it? Keep it under 50 words."
        );
        let fact = match self.services.reasoner.complete(&prompt, timeout).await {
            Ok(reply) => reply,
            Err(e) => return TaskResult::Error(format!("research on {topic} failed: {e}")),
        };
        let Some(fact) = meaningful_reply(&fact, 10) else {
            return TaskResult::Skipped(format!("nothing learned about {topic}"));
        };

        if let Err(e) = self.services.facts.record_fact(fact, RESEARCH_CATEGORY).await {
            return TaskResult::Error(format!("failed to store fact: {e}"));
        }
        TaskResult::Success(format!("learned about {topic}: {fact}"))
    }
}
