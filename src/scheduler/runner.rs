//! Scheduler background loop.
//!
//! On every tick the scheduler claims due tasks (priority first, up to the
//! concurrency ceiling) and spawns each execution into the engine's
//! [`WorkGroup`]. The loop never waits for an execution to finish. Each
//! completion is recorded in the performance tracker, handed to the
//! interval optimizer and appended to the action history.

use crate::config::{OptimizerConfig, SchedulerConfig};
use crate::engine::WorkGroup;
use crate::error::Result;
use crate::performance::{
    IntervalAdjustment, IntervalBounds, IntervalOptimizer, PerformanceSnapshot, PerformanceTracker,
};
use crate::scheduler::history::{ActionEntry, ActionHistory};
use crate::scheduler::registry::{Claim, TaskRegistry, TriggerOutcome};
use crate::scheduler::tasks::{TaskBody, TaskContext, TaskResult, TaskRunOutcome, TaskSpec};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Public per-task view used by `status()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Priority in `1..=10`.
    pub priority: u8,
    /// Whether the task is enabled.
    pub enabled: bool,
    /// Whether a run is in flight.
    pub running: bool,
    /// Interval currently in effect.
    pub interval_secs: u64,
    /// Optimizer lower bound.
    pub min_interval_secs: u64,
    /// Optimizer upper bound.
    pub max_interval_secs: u64,
    /// Wall-clock time of the last completed run.
    pub last_run: Option<DateTime<Utc>>,
    /// Seconds until the task is next eligible (0 when due).
    pub next_run_in_secs: u64,
    /// Outcome of the last run.
    pub last_outcome: Option<TaskRunOutcome>,
    /// Rolling statistics, once the task has completed at least once.
    pub performance: Option<PerformanceSnapshot>,
}

/// Result of [`Scheduler::run_now`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunNowOutcome {
    /// The task ran to completion (or timed out / was cancelled).
    Completed(TaskRunOutcome),
    /// Another run of the task is in flight.
    AlreadyRunning,
    /// The task is disabled.
    Disabled,
}

/// How an execution ended.
enum Execution {
    Finished(TaskResult),
    TimedOut(Duration),
    Cancelled,
}

impl Execution {
    fn outcome(&self) -> TaskRunOutcome {
        match self {
            Self::Finished(result) => result.outcome(),
            Self::TimedOut(_) => TaskRunOutcome::TimedOut,
            Self::Cancelled => TaskRunOutcome::Cancelled,
        }
    }

    fn summary(&self) -> String {
        match self {
            Self::Finished(result) => result.summary().to_owned(),
            Self::TimedOut(limit) => format!("exceeded {}s timeout", limit.as_secs()),
            Self::Cancelled => "cancelled by shutdown".to_owned(),
        }
    }
}

struct SchedulerState {
    registry: TaskRegistry,
    tracker: PerformanceTracker,
}

/// Background scheduler that runs registered tasks.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    config: SchedulerConfig,
    optimizer: IntervalOptimizer,
    optimization: AtomicBool,
    min_interval_floor: Duration,
    max_interval_ceiling: Duration,
    history: Arc<ActionHistory>,
    wake: Notify,
}

impl Scheduler {
    /// Create a scheduler with no tasks.
    pub fn new(
        config: &SchedulerConfig,
        optimizer: &OptimizerConfig,
        history: Arc<ActionHistory>,
    ) -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                registry: TaskRegistry::new(),
                tracker: PerformanceTracker::new(optimizer.duration_history),
            }),
            config: config.clone(),
            optimizer: IntervalOptimizer::new(optimizer),
            optimization: AtomicBool::new(optimizer.enabled),
            min_interval_floor: Duration::from_secs(optimizer.min_interval_floor_secs),
            max_interval_ceiling: Duration::from_secs(optimizer.max_interval_ceiling_secs),
            history,
            wake: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a task. It becomes due immediately.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::DuplicateTask`](crate::AutonomyError::DuplicateTask)
    /// or [`AutonomyError::InvalidTask`](crate::AutonomyError::InvalidTask).
    pub fn register(&self, spec: TaskSpec, body: Arc<dyn TaskBody>) -> Result<()> {
        let bounds = IntervalBounds::for_task(
            spec.interval,
            spec.min_interval,
            spec.max_interval,
            self.min_interval_floor,
            self.max_interval_ceiling,
        );
        let id = spec.id.clone();
        let interval_secs = spec.interval.as_secs();
        let priority = spec.priority;
        self.lock()
            .registry
            .register(spec, body, bounds, Instant::now())?;
        info!(task_id = %id, interval_secs, priority, "task registered");
        self.wake.notify_one();
        Ok(())
    }

    /// Enable a task.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownTask`](crate::AutonomyError::UnknownTask) if absent.
    pub fn enable(&self, id: &str) -> Result<()> {
        self.lock().registry.set_enabled(id, true)?;
        info!(task_id = %id, "task enabled");
        self.wake.notify_one();
        Ok(())
    }

    /// Disable a task. A run already in flight completes but the task is not
    /// dispatched again until re-enabled.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownTask`](crate::AutonomyError::UnknownTask) if absent.
    pub fn disable(&self, id: &str) -> Result<()> {
        self.lock().registry.set_enabled(id, false)?;
        info!(task_id = %id, "task disabled");
        Ok(())
    }

    /// Remove a task and its statistics.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownTask`](crate::AutonomyError::UnknownTask) if absent.
    pub fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.registry.remove(id)?;
        state.tracker.forget(id);
        drop(state);
        info!(task_id = %id, "task removed");
        Ok(())
    }

    /// Make a task due now and wake the loop. Never dispatches a task that
    /// is already in flight.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownTask`](crate::AutonomyError::UnknownTask) if absent.
    pub fn trigger(&self, id: &str) -> Result<TriggerOutcome> {
        let outcome = self.lock().registry.mark_due(id, Instant::now())?;
        debug!(task_id = %id, ?outcome, "task triggered");
        if outcome == TriggerOutcome::Triggered {
            self.wake.notify_one();
        }
        Ok(outcome)
    }

    /// Turn interval optimization on or off. Statistics keep being recorded
    /// either way.
    pub fn set_optimization(&self, enabled: bool) {
        self.optimization.store(enabled, Ordering::Relaxed);
        info!(enabled, "interval optimization toggled");
    }

    /// Whether the optimizer may rewrite intervals.
    pub fn optimization_enabled(&self) -> bool {
        self.optimization.load(Ordering::Relaxed)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().registry.contains(id)
    }

    /// `(id, name)` of every enabled task, in registration order.
    pub fn enabled_tasks(&self) -> Vec<(String, String)> {
        self.lock()
            .registry
            .entries()
            .filter(|e| e.spec.enabled)
            .map(|e| (e.spec.id.clone(), e.spec.name.clone()))
            .collect()
    }

    /// Number of executions in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().registry.in_flight()
    }

    /// Number of tasks with recorded statistics.
    pub fn tracked_tasks(&self) -> usize {
        self.lock().tracker.tracked_tasks()
    }

    /// Interval currently in effect for `id`.
    pub fn interval_of(&self, id: &str) -> Option<Duration> {
        self.lock().registry.get(id).map(|e| e.interval)
    }

    /// Snapshot of one task.
    pub fn task_snapshot(&self, id: &str) -> Option<TaskSnapshot> {
        let state = self.lock();
        let now = Instant::now();
        state
            .registry
            .get(id)
            .map(|e| snapshot_entry(e, &state.tracker, now))
    }

    /// Snapshot of every task, in registration order.
    pub fn task_snapshots(&self) -> Vec<TaskSnapshot> {
        let state = self.lock();
        let now = Instant::now();
        state
            .registry
            .entries()
            .map(|e| snapshot_entry(e, &state.tracker, now))
            .collect()
    }

    /// Run the loop until `work` is shut down.
    pub async fn run(self: Arc<Self>, work: WorkGroup) {
        info!(
            tasks = self.lock().registry.len(),
            tick_secs = self.config.tick_secs,
            max_concurrent = self.config.max_concurrent,
            "scheduler started"
        );
        let mut interval = tokio::time::interval(self.config.tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = work.shutdown_token().cancelled() => break,
                _ = interval.tick() => {}
                _ = self.wake.notified() => {}
            }
            self.tick(&work);
        }
        info!("scheduler loop stopped");
    }

    /// Execute one scheduler tick: claim due tasks and spawn them.
    ///
    /// Returns the ids dispatched, in dispatch order.
    pub(crate) fn tick(self: &Arc<Self>, work: &WorkGroup) -> Vec<String> {
        if work.is_shutting_down() {
            return Vec::new();
        }
        let claims = {
            let mut state = self.lock();
            let free = self
                .config
                .max_concurrent
                .saturating_sub(state.registry.in_flight());
            state.registry.claim_due(Instant::now(), free)
        };

        let mut dispatched = Vec::with_capacity(claims.len());
        for claim in claims {
            debug!(task_id = %claim.id, "dispatching task");
            dispatched.push(claim.id.clone());
            let scheduler = Arc::clone(self);
            let group = work.clone();
            work.spawn(async move {
                scheduler.execute(claim, &group).await;
            });
        }
        dispatched
    }

    /// Run `id` immediately on the caller's task, outside its schedule.
    ///
    /// Goes through the same claim, timeout and completion path as a
    /// scheduled dispatch, so it never overlaps a scheduled run.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownTask`](crate::AutonomyError::UnknownTask) if absent.
    pub async fn run_now(self: &Arc<Self>, id: &str, work: &WorkGroup) -> Result<RunNowOutcome> {
        let claim = match self.lock().registry.claim(id)? {
            Ok(claim) => claim,
            Err(TriggerOutcome::AlreadyRunning) => return Ok(RunNowOutcome::AlreadyRunning),
            Err(_) => return Ok(RunNowOutcome::Disabled),
        };
        info!(task_id = %id, "running task on demand");
        Ok(RunNowOutcome::Completed(self.execute(claim, work).await))
    }

    async fn execute(&self, claim: Claim, work: &WorkGroup) -> TaskRunOutcome {
        let mut guard = ClaimGuard {
            scheduler: self,
            seq: claim.seq,
            armed: true,
        };
        let started = Instant::now();
        let timeout = self.config.task_timeout();
        let ctx = TaskContext::new(claim.id.as_str(), work.shutdown_token().clone());
        let body = Arc::clone(&claim.body);
        let run = AssertUnwindSafe(async move { body.run(&ctx).await }).catch_unwind();

        let execution = tokio::select! {
            _ = work.abort_token().cancelled() => Execution::Cancelled,
            res = tokio::time::timeout(timeout, run) => match res {
                Ok(Ok(result)) => Execution::Finished(result),
                Ok(Err(panic)) => {
                    let msg = panic_message(panic.as_ref());
                    error!(task_id = %claim.id, "task panicked: {msg}");
                    Execution::Finished(TaskResult::Error(format!("task panicked: {msg}")))
                }
                Err(_) => Execution::TimedOut(timeout),
            },
        };

        guard.armed = false;
        self.complete(&claim, &execution, started.elapsed())
    }

    /// Record a finished execution and reschedule the task.
    fn complete(&self, claim: &Claim, execution: &Execution, elapsed: Duration) -> TaskRunOutcome {
        let id = claim.id.as_str();
        let outcome = execution.outcome();
        let summary = execution.summary();
        let now = Instant::now();
        let optimize = self.optimization_enabled();

        {
            let mut guard = self.lock();
            let SchedulerState { registry, tracker } = &mut *guard;
            let Some(entry) = registry.settle(claim.seq) else {
                debug!(task_id = %id, "completed task was removed, not rescheduling");
                drop(guard);
                self.history.record(ActionEntry::new(id, outcome.into(), &summary));
                return outcome;
            };

            if outcome != TaskRunOutcome::Cancelled {
                let record = tracker.record(id, outcome, elapsed, entry.interval);
                if optimize {
                    match self.optimizer.adjust(record, entry.interval, entry.bounds) {
                        IntervalAdjustment::Tightened { from, to } => {
                            info!(
                                task_id = %id,
                                from_secs = from.as_secs(),
                                to_secs = to.as_secs(),
                                "task interval tightened"
                            );
                            entry.interval = to;
                        }
                        IntervalAdjustment::Loosened { from, to } => {
                            info!(
                                task_id = %id,
                                from_secs = from.as_secs(),
                                to_secs = to.as_secs(),
                                "task interval loosened"
                            );
                            entry.interval = to;
                        }
                        IntervalAdjustment::Unchanged => {}
                    }
                }
                record.set_current_interval(entry.interval);
            }

            entry.last_run = Some(now);
            entry.last_run_at = Some(Utc::now());
            entry.next_run = now + entry.interval;
            entry.last_outcome = Some(outcome);
        }

        match outcome {
            TaskRunOutcome::Success | TaskRunOutcome::Skipped => {
                debug!(task_id = %id, %outcome, elapsed_ms = elapsed.as_millis() as u64, "task completed");
            }
            TaskRunOutcome::Cancelled => {
                info!(task_id = %id, "task cancelled by shutdown");
            }
            TaskRunOutcome::Failure | TaskRunOutcome::TimedOut => {
                warn!(task_id = %id, %outcome, elapsed_ms = elapsed.as_millis() as u64, "task failed: {summary}");
            }
        }
        self.history.record(ActionEntry::new(id, outcome.into(), &summary));
        outcome
    }
}

/// Releases the running flag if an execution future is dropped before it
/// reaches completion.
struct ClaimGuard<'a> {
    scheduler: &'a Scheduler,
    seq: u64,
    armed: bool,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.scheduler.lock().registry.release(self.seq);
        }
    }
}

fn snapshot_entry(
    entry: &crate::scheduler::registry::TaskEntry,
    tracker: &PerformanceTracker,
    now: Instant,
) -> TaskSnapshot {
    TaskSnapshot {
        id: entry.spec.id.clone(),
        name: entry.spec.name.clone(),
        description: entry.spec.description.clone(),
        priority: entry.spec.priority,
        enabled: entry.spec.enabled,
        running: entry.running,
        interval_secs: entry.interval.as_secs(),
        min_interval_secs: entry.bounds.min().as_secs(),
        max_interval_secs: entry.bounds.max().as_secs(),
        last_run: entry.last_run_at,
        next_run_in_secs: entry.next_run.saturating_duration_since(now).as_secs(),
        last_outcome: entry.last_outcome,
        performance: tracker.get(&entry.spec.id).map(|r| r.snapshot()),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
