//! Task registry.
//!
//! Holds registered tasks with their scheduling metadata and runtime
//! state. The registry is only ever touched under the scheduler's state
//! lock, so it is a plain data structure.

use crate::error::{AutonomyError, Result};
use crate::performance::IntervalBounds;
use crate::scheduler::tasks::{TaskBody, TaskRunOutcome, TaskSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Result of an out-of-schedule trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// Task marked due; it will be dispatched on the next tick.
    Triggered,
    /// A run of the task is already in flight; nothing changed.
    AlreadyRunning,
    /// Task is disabled; nothing changed.
    Disabled,
}

/// A registered task.
pub(crate) struct TaskEntry {
    pub(crate) spec: TaskSpec,
    pub(crate) body: Arc<dyn TaskBody>,
    pub(crate) interval: Duration,
    pub(crate) bounds: IntervalBounds,
    /// Registration order, the final dispatch tie-breaker.
    pub(crate) seq: u64,
    pub(crate) last_run: Option<Instant>,
    pub(crate) last_run_at: Option<DateTime<Utc>>,
    pub(crate) next_run: Instant,
    pub(crate) running: bool,
    pub(crate) last_outcome: Option<TaskRunOutcome>,
    /// Removed while a run was in flight. Kept until that run settles so the
    /// id cannot be dispatched again underneath it.
    removed: bool,
}

/// A task claimed for execution. Its `running` flag is set until the
/// scheduler completes or releases the claim.
pub(crate) struct Claim {
    pub(crate) id: String,
    /// Registration sequence of the claimed entry. Completion is matched on
    /// this, not on the id, so a re-registered task never receives the
    /// outcome of its predecessor's run.
    pub(crate) seq: u64,
    pub(crate) body: Arc<dyn TaskBody>,
}

/// Registered tasks in registration order.
#[derive(Default)]
pub struct TaskRegistry {
    entries: Vec<TaskEntry>,
    next_seq: u64,
}

impl TaskRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task, due immediately.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::DuplicateTask`] if the id is taken, or
    /// [`AutonomyError::InvalidTask`] if the spec is malformed.
    pub(crate) fn register(
        &mut self,
        spec: TaskSpec,
        body: Arc<dyn TaskBody>,
        bounds: IntervalBounds,
        now: Instant,
    ) -> Result<()> {
        spec.validate()?;
        if self.contains(&spec.id) {
            return Err(AutonomyError::DuplicateTask(spec.id));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(TaskEntry {
            interval: bounds.clamp(spec.interval),
            spec,
            body,
            bounds,
            seq,
            last_run: None,
            last_run_at: None,
            next_run: now,
            running: false,
            last_outcome: None,
            removed: false,
        });
        Ok(())
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    /// Whether no task is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn get(&self, id: &str) -> Option<&TaskEntry> {
        self.entries().find(|e| e.spec.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut TaskEntry> {
        self.entries
            .iter_mut()
            .find(|e| !e.removed && e.spec.id == id)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &TaskEntry> {
        self.entries.iter().filter(|e| !e.removed)
    }

    /// Whether a run of a removed task with this id is still in flight.
    fn orphan_running(&self, id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.removed && e.running && e.spec.id == id)
    }

    fn require_mut(&mut self, id: &str) -> Result<&mut TaskEntry> {
        self.get_mut(id)
            .ok_or_else(|| AutonomyError::UnknownTask(id.to_owned()))
    }

    /// Enable or disable a task. An in-flight run is not interrupted.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownTask`] if absent.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        self.require_mut(id)?.spec.enabled = enabled;
        Ok(())
    }

    /// Remove a task. An in-flight run finishes but is not rescheduled.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownTask`] if absent.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        let index = self
            .entries
            .iter()
            .position(|e| !e.removed && e.spec.id == id)
            .ok_or_else(|| AutonomyError::UnknownTask(id.to_owned()))?;
        if self.entries[index].running {
            self.entries[index].removed = true;
        } else {
            self.entries.remove(index);
        }
        Ok(())
    }

    /// Make a task due at `now`.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownTask`] if absent.
    pub(crate) fn mark_due(&mut self, id: &str, now: Instant) -> Result<TriggerOutcome> {
        let orphan = self.orphan_running(id);
        let entry = self.require_mut(id)?;
        if !entry.spec.enabled {
            return Ok(TriggerOutcome::Disabled);
        }
        if entry.running || orphan {
            return Ok(TriggerOutcome::AlreadyRunning);
        }
        entry.next_run = now;
        Ok(TriggerOutcome::Triggered)
    }

    /// Number of runs currently in flight.
    pub fn in_flight(&self) -> usize {
        self.entries.iter().filter(|e| e.running).count()
    }

    /// Ids of enabled, idle tasks whose next run is at or before `now`, in
    /// dispatch order: priority descending, then earliest next run, then
    /// registration order.
    pub fn due_ids(&self, now: Instant) -> Vec<String> {
        self.due_order(now)
            .into_iter()
            .map(|i| self.entries[i].spec.id.clone())
            .collect()
    }

    fn due_order(&self, now: Instant) -> Vec<usize> {
        let mut due: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                !e.removed
                    && e.spec.enabled
                    && !e.running
                    && e.next_run <= now
                    && !self.orphan_running(&e.spec.id)
            })
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| {
            let e = &self.entries[i];
            (Reverse(e.spec.priority), e.next_run, e.seq)
        });
        due
    }

    /// Claim up to `limit` due tasks in dispatch order. Tasks beyond the
    /// limit stay due for the next tick.
    pub(crate) fn claim_due(&mut self, now: Instant, limit: usize) -> Vec<Claim> {
        let order = self.due_order(now);
        order
            .into_iter()
            .take(limit)
            .map(|i| {
                let entry = &mut self.entries[i];
                entry.running = true;
                Claim {
                    id: entry.spec.id.clone(),
                    seq: entry.seq,
                    body: Arc::clone(&entry.body),
                }
            })
            .collect()
    }

    /// Claim one task regardless of its schedule.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownTask`] if absent.
    pub(crate) fn claim(&mut self, id: &str) -> Result<std::result::Result<Claim, TriggerOutcome>> {
        let orphan = self.orphan_running(id);
        let entry = self.require_mut(id)?;
        if !entry.spec.enabled {
            return Ok(Err(TriggerOutcome::Disabled));
        }
        if entry.running || orphan {
            return Ok(Err(TriggerOutcome::AlreadyRunning));
        }
        entry.running = true;
        Ok(Ok(Claim {
            id: entry.spec.id.clone(),
            seq: entry.seq,
            body: Arc::clone(&entry.body),
        }))
    }

    /// Settle the run claimed from entry `seq`: clear its running flag and
    /// return it for rescheduling. Returns `None` when the entry was removed
    /// while the run was in flight; the entry is dropped then.
    pub(crate) fn settle(&mut self, seq: u64) -> Option<&mut TaskEntry> {
        let index = self.entries.iter().position(|e| e.seq == seq)?;
        if self.entries[index].removed {
            self.entries.remove(index);
            return None;
        }
        let entry = &mut self.entries[index];
        entry.running = false;
        Some(entry)
    }

    /// Clear the running flag of entry `seq` without touching the schedule.
    pub(crate) fn release(&mut self, seq: u64) {
        let _ = self.settle(seq);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::scheduler::tasks::{FnTask, TaskResult};

    fn body() -> Arc<dyn TaskBody> {
        Arc::new(FnTask::new(|_| async { TaskResult::Success("ok".into()) }))
    }

    fn bounds(interval: Duration) -> IntervalBounds {
        IntervalBounds::for_task(
            interval,
            None,
            None,
            Duration::from_secs(60),
            Duration::from_secs(86_400),
        )
    }

    fn add(registry: &mut TaskRegistry, id: &str, priority: u8, now: Instant) {
        let spec = TaskSpec::new(id, id, Duration::from_secs(10)).with_priority(priority);
        let b = bounds(spec.interval);
        registry.register(spec, body(), b, now).unwrap();
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let now = Instant::now();
        let mut registry = TaskRegistry::new();
        add(&mut registry, "a", 5, now);
        let spec = TaskSpec::new("a", "again", Duration::from_secs(10));
        let b = bounds(spec.interval);
        let err = registry.register(spec, body(), b, now).unwrap_err();
        assert!(matches!(err, AutonomyError::DuplicateTask(id) if id == "a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let mut registry = TaskRegistry::new();
        assert!(matches!(
            registry.set_enabled("ghost", true),
            Err(AutonomyError::UnknownTask(_))
        ));
        assert!(matches!(registry.remove("ghost"), Err(AutonomyError::UnknownTask(_))));
        assert!(matches!(
            registry.mark_due("ghost", Instant::now()),
            Err(AutonomyError::UnknownTask(_))
        ));
    }

    #[test]
    fn due_order_is_priority_then_next_run_then_registration() {
        let now = Instant::now();
        let mut registry = TaskRegistry::new();
        add(&mut registry, "low", 2, now);
        add(&mut registry, "high_late", 8, now);
        add(&mut registry, "high_early", 8, now);
        add(&mut registry, "mid", 5, now);
        add(&mut registry, "high_first", 8, now);

        registry.get_mut("high_late").unwrap().next_run = now;
        registry.get_mut("high_early").unwrap().next_run = now - Duration::from_secs(5);
        registry.get_mut("high_first").unwrap().next_run = now;

        assert_eq!(
            registry.due_ids(now),
            vec!["high_early", "high_late", "high_first", "mid", "low"]
        );
    }

    #[test]
    fn claim_respects_limit_and_leaves_rest_due() {
        let now = Instant::now();
        let mut registry = TaskRegistry::new();
        add(&mut registry, "a", 5, now);
        add(&mut registry, "b", 8, now);

        let claims = registry.claim_due(now, 1);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].id, "b");
        assert_eq!(registry.in_flight(), 1);
        assert_eq!(registry.due_ids(now), vec!["a"]);
    }

    #[test]
    fn running_task_is_never_claimed_twice() {
        let now = Instant::now();
        let mut registry = TaskRegistry::new();
        add(&mut registry, "a", 5, now);

        assert_eq!(registry.claim_due(now, 10).len(), 1);
        assert!(registry.claim_due(now, 10).is_empty());
        assert!(matches!(registry.claim("a").unwrap(), Err(TriggerOutcome::AlreadyRunning)));
        assert_eq!(registry.mark_due("a", now).unwrap(), TriggerOutcome::AlreadyRunning);

        let seq = registry.get("a").unwrap().seq;
        registry.release(seq);
        assert!(registry.claim("a").unwrap().is_ok());
    }

    #[test]
    fn disabled_tasks_are_not_due() {
        let now = Instant::now();
        let mut registry = TaskRegistry::new();
        add(&mut registry, "a", 5, now);
        registry.set_enabled("a", false).unwrap();

        assert!(registry.due_ids(now).is_empty());
        assert_eq!(registry.mark_due("a", now).unwrap(), TriggerOutcome::Disabled);
        assert!(matches!(registry.claim("a").unwrap(), Err(TriggerOutcome::Disabled)));
    }

    #[test]
    fn future_tasks_are_not_due_until_triggered() {
        let now = Instant::now();
        let mut registry = TaskRegistry::new();
        add(&mut registry, "a", 5, now);
        registry.get_mut("a").unwrap().next_run = now + Duration::from_secs(600);

        assert!(registry.due_ids(now).is_empty());
        assert_eq!(registry.mark_due("a", now).unwrap(), TriggerOutcome::Triggered);
        assert_eq!(registry.due_ids(now), vec!["a"]);
    }

    #[test]
    fn remove_drops_task() {
        let now = Instant::now();
        let mut registry = TaskRegistry::new();
        add(&mut registry, "a", 5, now);
        registry.remove("a").unwrap();
        assert!(registry.is_empty());
        assert!(!registry.contains("a"));
    }

    #[test]
    fn reregistered_id_waits_for_removed_run() {
        let now = Instant::now();
        let mut registry = TaskRegistry::new();
        add(&mut registry, "a", 5, now);
        let old = registry.claim_due(now, 10).pop().unwrap();

        registry.remove("a").unwrap();
        assert!(!registry.contains("a"));
        assert_eq!(registry.in_flight(), 1);
        add(&mut registry, "a", 5, now);
        assert_eq!(registry.len(), 1);

        // The fresh entry is not dispatched while the old run is in flight.
        assert!(registry.due_ids(now).is_empty());
        assert!(registry.claim_due(now, 10).is_empty());
        assert_eq!(registry.mark_due("a", now).unwrap(), TriggerOutcome::AlreadyRunning);
        assert!(matches!(registry.claim("a").unwrap(), Err(TriggerOutcome::AlreadyRunning)));

        // Settling the old claim drops the removed entry and leaves the new
        // one untouched.
        assert!(registry.settle(old.seq).is_none());
        assert_eq!(registry.in_flight(), 0);
        let fresh = registry.get("a").unwrap();
        assert_ne!(fresh.seq, old.seq);
        assert!(fresh.last_outcome.is_none());
        assert_eq!(registry.due_ids(now), vec!["a"]);
    }
}
