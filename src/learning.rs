//! Bounded learning log.
//!
//! Records what the engine learned about itself and its goals: goals
//! created and completed, self-test results, knowledge consolidation and
//! probe checks. Separate from the action history, which records every
//! run whether or not anything was learned.

use crate::scheduler::tasks::truncate_chars;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of retained entries.
pub const DEFAULT_LEARNING_CAPACITY: usize = 1000;

const MAX_SUMMARY_CHARS: usize = 200;

/// Subsystem that produced a learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningSource {
    /// Goal created or completed.
    Goals,
    /// Knowledge consolidation.
    Knowledge,
    /// Self-test run.
    SelfTest,
    /// Monitoring probe.
    Monitoring,
}

impl std::fmt::Display for LearningSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Goals => "goal_system",
            Self::Knowledge => "knowledge_system",
            Self::SelfTest => "self_test",
            Self::Monitoring => "monitoring",
        };
        f.write_str(s)
    }
}

/// One learning record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningEntry {
    /// When it was recorded.
    pub at: DateTime<Utc>,
    /// Where it came from.
    pub source: LearningSource,
    /// Short description, at most 200 characters.
    pub summary: String,
}

/// Shared, capped learning log. The oldest entries are evicted first.
#[derive(Debug)]
pub struct LearningLog {
    entries: Mutex<VecDeque<LearningEntry>>,
    capacity: usize,
    recorded: AtomicU64,
}

impl Default for LearningLog {
    fn default() -> Self {
        Self::new(DEFAULT_LEARNING_CAPACITY)
    }
}

impl LearningLog {
    /// Log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            recorded: AtomicU64::new(0),
        }
    }

    /// Append a learning, evicting the oldest entry when full.
    pub fn record(&self, source: LearningSource, summary: &str) {
        let entry = LearningEntry {
            at: Utc::now(),
            source,
            summary: truncate_chars(summary.trim(), MAX_SUMMARY_CHARS),
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        self.recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LearningEntry> {
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

    /// Learnings recorded since the log was created, evicted ones included.
    pub fn total_recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }
}
