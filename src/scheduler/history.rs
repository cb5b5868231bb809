//! Bounded action history.
//!
//! Every task completion and every decision cycle appends one entry. The
//! log is capped; the oldest entries are evicted first.

use crate::scheduler::tasks::{TaskRunOutcome, truncate_chars};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Actor recorded for work that did not come from a registered task.
pub const AD_HOC: &str = "ad-hoc";

/// Default number of retained entries.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Longest summary kept per entry (characters).
const MAX_SUMMARY_CHARS: usize = 200;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Task run succeeded.
    Success,
    /// Task run had nothing to do.
    Skipped,
    /// Task run or decision call failed.
    Failure,
    /// Task run exceeded its deadline.
    TimedOut,
    /// Task run was cancelled by shutdown.
    Cancelled,
    /// Decision loop triggered a registered task.
    Triggered,
    /// Decision loop recorded an ad-hoc action.
    Decided,
    /// Decision loop found nothing urgent.
    Idle,
}

impl From<TaskRunOutcome> for ActionOutcome {
    fn from(outcome: TaskRunOutcome) -> Self {
        match outcome {
            TaskRunOutcome::Success => Self::Success,
            TaskRunOutcome::Skipped => Self::Skipped,
            TaskRunOutcome::Failure => Self::Failure,
            TaskRunOutcome::TimedOut => Self::TimedOut,
            TaskRunOutcome::Cancelled => Self::Cancelled,
        }
    }
}

impl std::fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failure => "failure",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Triggered => "triggered",
            Self::Decided => "decided",
            Self::Idle => "idle",
        };
        f.write_str(s)
    }
}

/// One history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEntry {
    /// When the action finished.
    pub at: DateTime<Utc>,
    /// Task id, or [`AD_HOC`].
    pub actor: String,
    /// Result.
    pub outcome: ActionOutcome,
    /// Short description.
    pub summary: String,
}

impl ActionEntry {
    /// Entry stamped now, summary truncated.
    pub fn new(actor: impl Into<String>, outcome: ActionOutcome, summary: &str) -> Self {
        Self {
            at: Utc::now(),
            actor: actor.into(),
            outcome,
            summary: truncate_chars(summary.trim(), MAX_SUMMARY_CHARS),
        }
    }

    /// Entry attributed to [`AD_HOC`].
    pub fn ad_hoc(outcome: ActionOutcome, summary: &str) -> Self {
        Self::new(AD_HOC, outcome, summary)
    }
}

/// Shared append-only log.
#[derive(Debug)]
pub struct ActionHistory {
    entries: Mutex<VecDeque<ActionEntry>>,
    capacity: usize,
}

impl Default for ActionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ActionHistory {
    /// Log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full.
    pub fn record(&self, entry: ActionEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ActionEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let history = ActionHistory::new(2);
        history.record(ActionEntry::new("a", ActionOutcome::Success, "one"));
        history.record(ActionEntry::new("b", ActionOutcome::Failure, "two"));
        history.record(ActionEntry::ad_hoc(ActionOutcome::Idle, "three"));

        let actors: Vec<_> = history.recent(10).into_iter().map(|e| e.actor).collect();
        assert_eq!(actors, vec!["b".to_owned(), AD_HOC.to_owned()]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let history = ActionHistory::default();
        for i in 0..10 {
            history.record(ActionEntry::new("t", ActionOutcome::Success, &format!("run {i}")));
        }
        let tail: Vec<_> = history.recent(3).into_iter().map(|e| e.summary).collect();
        assert_eq!(tail, vec!["run 7", "run 8", "run 9"]);
    }

    #[test]
    fn summaries_are_truncated() {
        let long = "x".repeat(500);
        let entry = ActionEntry::new("t", ActionOutcome::Success, &long);
        assert_eq!(entry.summary.chars().count(), 200);
    }

    #[test]
    fn run_outcomes_convert() {
        assert_eq!(ActionOutcome::from(TaskRunOutcome::TimedOut), ActionOutcome::TimedOut);
        assert_eq!(ActionOutcome::from(TaskRunOutcome::Skipped), ActionOutcome::Skipped);
    }
}
