//! Rolling per-task execution statistics.

use crate::scheduler::tasks::TaskRunOutcome;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Default number of recent durations kept per task.
pub const DEFAULT_DURATION_HISTORY: usize = 20;

/// Statistics for one task.
///
/// `total == success_count + failure_count` always holds, and at most
/// `capacity` durations are retained (oldest evicted first).
#[derive(Debug, Clone)]
pub struct PerformanceRecord {
    success_count: u64,
    failure_count: u64,
    durations: VecDeque<Duration>,
    capacity: usize,
    current_interval: Duration,
    last_outcome: Option<TaskRunOutcome>,
}

impl PerformanceRecord {
    /// Empty record for a task currently running every `interval`.
    pub fn new(capacity: usize, interval: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            success_count: 0,
            failure_count: 0,
            durations: VecDeque::with_capacity(capacity),
            capacity,
            current_interval: interval,
            last_outcome: None,
        }
    }

    /// Record one completed execution.
    pub fn record(&mut self, outcome: TaskRunOutcome, duration: Duration) {
        if outcome.is_success() {
            self.success_count = self.success_count.saturating_add(1);
        } else {
            self.failure_count = self.failure_count.saturating_add(1);
        }
        if self.durations.len() == self.capacity {
            self.durations.pop_front();
        }
        self.durations.push_back(duration);
        self.last_outcome = Some(outcome);
    }

    /// Successful executions.
    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    /// Failed or timed-out executions.
    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    /// All recorded executions.
    pub fn total(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// `success / max(total, 1)` over the full history.
    pub fn success_rate(&self) -> f64 {
        self.success_count as f64 / self.total().max(1) as f64
    }

    /// Mean of the retained durations, `None` before the first execution.
    pub fn mean_duration(&self) -> Option<Duration> {
        if self.durations.is_empty() {
            return None;
        }
        let sum: Duration = self.durations.iter().sum();
        Some(sum / self.durations.len() as u32)
    }

    /// Retained durations, oldest first.
    pub fn durations(&self) -> impl Iterator<Item = Duration> + '_ {
        self.durations.iter().copied()
    }

    /// Interval the task is currently scheduled with.
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    pub(crate) fn set_current_interval(&mut self, interval: Duration) {
        self.current_interval = interval;
    }

    /// Outcome of the most recent execution.
    pub fn last_outcome(&self) -> Option<TaskRunOutcome> {
        self.last_outcome
    }

    /// Serializable view for `status()`.
    pub fn snapshot(&self) -> PerformanceSnapshot {
        PerformanceSnapshot {
            success_count: self.success_count,
            failure_count: self.failure_count,
            total: self.total(),
            success_rate: self.success_rate(),
            mean_duration_ms: self.mean_duration().map(|d| d.as_millis() as u64),
            current_interval_secs: self.current_interval.as_secs(),
            last_outcome: self.last_outcome,
        }
    }
}

/// Serializable performance summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    /// Successful executions.
    pub success_count: u64,
    /// Failed executions (timeouts included).
    pub failure_count: u64,
    /// All executions.
    pub total: u64,
    /// Success ratio in `[0, 1]`.
    pub success_rate: f64,
    /// Mean of the recent durations.
    pub mean_duration_ms: Option<u64>,
    /// Interval currently in effect.
    pub current_interval_secs: u64,
    /// Most recent outcome.
    pub last_outcome: Option<TaskRunOutcome>,
}

/// Records keyed by task id.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    records: HashMap<String, PerformanceRecord>,
    capacity: usize,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DURATION_HISTORY)
    }
}

impl PerformanceTracker {
    /// Tracker keeping `capacity` durations per task.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: HashMap::new(),
            capacity,
        }
    }

    /// Record an execution of `task_id`, creating its record on first use.
    pub fn record(
        &mut self,
        task_id: &str,
        outcome: TaskRunOutcome,
        duration: Duration,
        interval: Duration,
    ) -> &mut PerformanceRecord {
        let capacity = self.capacity;
        let record = self
            .records
            .entry(task_id.to_owned())
            .or_insert_with(|| PerformanceRecord::new(capacity, interval));
        record.record(outcome, duration);
        record
    }

    /// Record for `task_id`, if it has ever completed.
    pub fn get(&self, task_id: &str) -> Option<&PerformanceRecord> {
        self.records.get(task_id)
    }

    /// Drop the record of a removed task.
    pub fn forget(&mut self, task_id: &str) {
        self.records.remove(task_id);
    }

    /// Number of tasks with at least one recorded execution.
    pub fn tracked_tasks(&self) -> usize {
        self.records.len()
    }
}
