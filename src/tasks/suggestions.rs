//! `offer_suggestions`: turn recent activity into one proactive message.

use crate::capabilities::Capability;
use crate::scheduler::history::AD_HOC;
use crate::scheduler::tasks::{TaskBody, TaskContext, TaskResult, truncate_chars};
use crate::services::notify_best_effort;
use crate::tasks::{TaskServices, meaningful_reply};
use async_trait::async_trait;

const RECENT_ACTIONS: usize = 10;
const MAX_SUGGESTION_CHARS: usize = 300;

/// Asks the reasoning service for one suggestion and sends it to the sink.
pub struct OfferSuggestionsTask {
    services: TaskServices,
}

impl OfferSuggestionsTask {
    /// New task over `services`.
    pub fn new(services: TaskServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl TaskBody for OfferSuggestionsTask {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        if let Some(skipped) = self.services.require(Capability::Message) {
            return skipped;
        }
        // Our own earlier suggestions are not activity worth reacting to.
        let recent: Vec<_> = self
            .services
            .history
            .recent(RECENT_ACTIONS)
            .into_iter()
            .filter(|e| e.actor != ctx.task_id() && e.actor != AD_HOC)
            .collect();
        if recent.is_empty() {
            return TaskResult::Skipped("no recent activity".to_owned());
        }

        let activity = recent
            .iter()
            .map(|e| format!("- {} ({}): {}", e.actor, e.outcome, e.summary))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Here is what you have been doing in the background recently:\n{activity}\n\n\
             Offer ONE brief, genuinely helpful suggestion for the user based on this \
             (under 40 words), or reply \"none\" if there is nothing worth saying."
        );

        let reply = match self
            .services
            .reasoner
            .complete(&prompt, self.services.call_timeout())
            .await
        {
            Ok(reply) => reply,
            Err(e) => return TaskResult::Error(format!("suggestion failed: {e}")),
        };
        let Some(suggestion) = meaningful_reply(&reply, 10) else {
            return TaskResult::Skipped("nothing worth suggesting".to_owned());
        };
        let suggestion = truncate_chars(suggestion, MAX_SUGGESTION_CHARS);

        if notify_best_effort(self.services.sink.as_ref(), &suggestion).await {
            TaskResult::Success(format!("suggested: {suggestion}"))
        } else {
            TaskResult::Success(format!("suggestion not delivered: {suggestion}"))
        }
    }
}
