//! `consolidate_knowledge`: flag duplicate facts among recent learnings.

use crate::capabilities::Capability;
use crate::learning::LearningSource;
use crate::scheduler::tasks::{TaskBody, TaskContext, TaskResult, truncate_chars};
use crate::tasks::TaskServices;
use async_trait::async_trait;
use tracing::debug;

/// Reviews the most recent facts with the reasoning service.
pub struct ConsolidateKnowledgeTask {
    services: TaskServices,
}

impl ConsolidateKnowledgeTask {
    /// New task over `services`.
    pub fn new(services: TaskServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl TaskBody for ConsolidateKnowledgeTask {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult {
        if let Some(skipped) = self.services.require(Capability::Learn) {
            return skipped;
        }
        let facts = match self.services.facts.list_facts().await {
            Ok(facts) => facts,
            Err(e) => return TaskResult::Error(format!("failed to list facts: {e}")),
        };
        let min = self.services.config.consolidate_min_facts;
        if facts.len() < min {
            return TaskResult::Skipped(format!(
                "not enough facts to consolidate ({} < {min})",
                facts.len()
            ));
        }

        let window = self.services.config.consolidate_window.max(1);
        let recent = &facts[facts.len().saturating_sub(window)..];
        let listing = recent
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{}. {}", i + 1, f.text))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Analyze these learned facts and identify any duplicates or highly similar items:\n\n\
             {listing}\n\n\
             List the numbers of duplicate/similar facts (e.g. \"3 and 7 are duplicates\"). \
             If there are no duplicates, say \"none\"."
        );

        let analysis = match self
            .services
            .reasoner
            .complete(&prompt, self.services.call_timeout())
            .await
        {
            Ok(reply) => reply,
            Err(e) => return TaskResult::Error(format!("consolidation failed: {e}")),
        };
        let analysis = analysis.trim();
        debug!(reviewed = recent.len(), "consolidation analysis: {analysis}");

        let summary = if analysis.is_empty() || analysis.to_lowercase().starts_with("none") {
            format!("no duplicates among {} facts", recent.len())
        } else {
            format!("reviewed {} facts: {}", recent.len(), truncate_chars(analysis, 150))
        };
        self.services
            .learnings
            .record(LearningSource::Knowledge, &format!("Consolidated knowledge: {summary}"));
        TaskResult::Success(summary)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::services::FactStore;
    use crate::tasks::fixtures::{ctx, harness};
    use crate::test_utils::ScriptedReasoner;

    #[tokio::test]
    async fn too_few_facts_is_skipped() {
        let reasoner = ScriptedReasoner::always("none");
        let h = harness(reasoner);
        for i in 0..3 {
            h.facts.record_fact(&format!("fact {i}"), "t").await.unwrap();
        }
        let result = ConsolidateKnowledgeTask::new(h.services.clone())
            .run(&ctx("consolidate_knowledge"))
            .await;
        assert!(matches!(result, TaskResult::Skipped(s) if s.contains("3 < 10")));
        assert!(h.services.learnings.is_empty());
    }

    #[tokio::test]
    async fn reviews_only_recent_window() {
        let h = harness(ScriptedReasoner::always("3 and 7 are duplicates"));
        for i in 0..25 {
            h.facts.record_fact(&format!("fact number {i}"), "t").await.unwrap();
        }
        let result = ConsolidateKnowledgeTask::new(h.services.clone())
            .run(&ctx("consolidate_knowledge"))
            .await;

        assert!(matches!(result, TaskResult::Success(s) if s.contains("reviewed 20 facts")));
        let learned = h.services.learnings.recent(1).pop().unwrap();
        assert_eq!(learned.source, LearningSource::Knowledge);
        assert!(learned.summary.starts_with("Consolidated knowledge: reviewed 20 facts"));
        let prompt = h.reasoner.prompts().pop().unwrap();
        assert!(prompt.contains("1. fact number 5\n"));
        assert!(prompt.contains("20. fact number 24\n"));
    }

    #[tokio::test]
    async fn none_reply_means_no_duplicates() {
        let h = harness(ScriptedReasoner::always("None found."));
        for i in 0..10 {
            h.facts.record_fact(&format!("fact {i}"), "t").await.unwrap();
        }
        let result = ConsolidateKnowledgeTask::new(h.services.clone())
            .run(&ctx("consolidate_knowledge"))
            .await;
        assert_eq!(result, TaskResult::Success("no duplicates among 10 facts".to_owned()));
    }
}
