//! The autonomy engine: wiring, lifecycle and the outward control surface.

use crate::capabilities::{Capabilities, Capability};
use crate::circuit_breaker::CircuitBreaker;
use crate::config::AutonomyConfig;
use crate::decision::{CycleOutcome, DecisionLoop};
use crate::engine::lifecycle::{LifecycleState, ShutdownReport, WorkGroup};
use crate::engine::status::EngineStatus;
use crate::error::{AutonomyError, Result};
use crate::goals::{Goal, GoalTracker, TrackGoalsTask};
use crate::learning::LearningLog;
use crate::scheduler::{
    ActionHistory, RunNowOutcome, Scheduler, TaskBody, TaskSpec, TriggerOutcome,
};
use crate::services::{FactStore, GuardedReasoner, NotificationSink, Probe, ReasoningService};
use crate::tasks::{
    ProbeTask, SelfTestReport, SelfTestTask, TASK_SELF_TEST, TASK_TRACK_GOALS, TaskServices,
    builtin_tasks,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// History entries included in [`EngineStatus::recent_actions`].
const STATUS_RECENT_ACTIONS: usize = 10;

/// Learning entries included in [`EngineStatus::recent_learnings`].
const STATUS_RECENT_LEARNINGS: usize = 10;

#[derive(Debug)]
struct Runtime {
    state: LifecycleState,
    work: Option<WorkGroup>,
    /// Group of the last completed run, kept so callers can audit it.
    last_work: Option<WorkGroup>,
}

/// Self-tuning background task engine.
///
/// Owns the scheduler, the decision loop, the goal tracker and the shared
/// circuit breaker. `start()` spawns both loops into a fresh [`WorkGroup`];
/// `stop()` winds that group down and waits until nothing is left.
pub struct AutonomyEngine {
    config: AutonomyConfig,
    scheduler: Arc<Scheduler>,
    decision: Arc<DecisionLoop>,
    reasoner: GuardedReasoner,
    history: Arc<ActionHistory>,
    goals: Arc<GoalTracker>,
    capabilities: Arc<Capabilities>,
    services: TaskServices,
    self_test: Arc<SelfTestTask>,
    start_lock: tokio::sync::Mutex<()>,
    runtime: Mutex<Runtime>,
}

impl AutonomyEngine {
    /// Build a stopped engine with no tasks.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::Config`](crate::AutonomyError::Config) if `config`
    /// does not validate.
    pub fn new(
        config: AutonomyConfig,
        reasoner: Arc<dyn ReasoningService>,
        facts: Arc<dyn FactStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        config.validate()?;

        let history = Arc::new(ActionHistory::new(config.history.capacity));
        let breaker = Arc::new(CircuitBreaker::new((&config.breaker).into()));
        let reasoner = GuardedReasoner::new(reasoner, breaker);
        let capabilities = Arc::new(Capabilities::from_config(&config.capabilities));
        let scheduler = Arc::new(Scheduler::new(
            &config.scheduler,
            &config.optimizer,
            Arc::clone(&history),
        ));
        let learnings = Arc::new(LearningLog::new(config.history.learning_capacity));
        let goals = Arc::new(
            GoalTracker::new(config.goals.max_active).with_learning_log(Arc::clone(&learnings)),
        );
        let services = TaskServices {
            reasoner: reasoner.clone(),
            facts,
            sink,
            capabilities: Arc::clone(&capabilities),
            history: Arc::clone(&history),
            learnings,
            config: config.tasks.clone(),
        };
        let decision = Arc::new(DecisionLoop::new(
            Arc::clone(&scheduler),
            reasoner.clone(),
            Arc::clone(&history),
            Arc::clone(&capabilities),
            config.decision.clone(),
        ));
        let self_test = Arc::new(SelfTestTask::new(services.clone()));

        Ok(Self {
            config,
            scheduler,
            decision,
            reasoner,
            history,
            goals,
            capabilities,
            services,
            self_test,
            start_lock: tokio::sync::Mutex::new(()),
            runtime: Mutex::new(Runtime {
                state: LifecycleState::Stopped,
                work: None,
                last_work: None,
            }),
        })
    }

    /// Register the built-in tasks, including `track_goals`.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::DuplicateTask`](crate::AutonomyError::DuplicateTask)
    /// if any of them is already registered.
    pub fn with_builtin_tasks(self) -> Result<Self> {
        for (spec, body) in builtin_tasks(&self.services, Arc::clone(&self.self_test)) {
            self.scheduler.register(spec, body)?;
        }
        let track_goals = TrackGoalsTask::new(
            Arc::clone(&self.goals),
            self.reasoner.clone(),
            self.config.goals.clone(),
        );
        self.scheduler.register(
            TaskSpec::new(TASK_TRACK_GOALS, "Track Goals", Duration::from_secs(1800))
                .with_description("Advance the highest-priority active goal")
                .with_priority(5),
            Arc::new(track_goals),
        )?;
        Ok(self)
    }

    /// Register a monitoring task running `probe`.
    ///
    /// # Errors
    ///
    /// Registration errors, as for [`AutonomyEngine::register`].
    pub fn with_probe(
        self,
        id: &str,
        probe: Arc<dyn Probe>,
        interval: Duration,
        priority: u8,
    ) -> Result<Self> {
        let name = format!("Monitor {}", probe.name());
        let spec = TaskSpec::new(id, name, interval)
            .with_description(format!("Run the {} probe", probe.name()))
            .with_priority(priority);
        let body = ProbeTask::new(probe, self.services.clone());
        self.scheduler.register(spec, Arc::new(body))?;
        Ok(self)
    }

    /// Register a task. Allowed while running; the task is due at once.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::DuplicateTask`](crate::AutonomyError::DuplicateTask)
    /// or [`AutonomyError::InvalidTask`](crate::AutonomyError::InvalidTask).
    pub fn register(&self, spec: TaskSpec, body: Arc<dyn TaskBody>) -> Result<()> {
        self.scheduler.register(spec, body)
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start the scheduler and decision loops.
    ///
    /// Returns `false` without doing anything when the engine is already
    /// running.
    pub async fn start(&self) -> bool {
        let _start = self.start_lock.lock().await;
        {
            let mut rt = self.runtime();
            if rt.state != LifecycleState::Stopped {
                debug!(state = %rt.state, "start ignored, engine not stopped");
                return false;
            }
            rt.state = LifecycleState::Starting;
        }

        let work = WorkGroup::new();
        work.spawn(Arc::clone(&self.scheduler).run(work.clone()));
        if self.config.decision.enabled {
            work.spawn(Arc::clone(&self.decision).run(work.clone()));
        }

        let mut rt = self.runtime();
        rt.work = Some(work);
        rt.state = LifecycleState::Running;
        info!(
            tasks = self.scheduler.task_snapshots().len(),
            decision_loop = self.config.decision.enabled,
            "autonomy engine started"
        );
        true
    }

    /// Stop both loops and every in-flight execution.
    ///
    /// Signals shutdown, waits up to the grace period, then force-cancels
    /// whatever is left. When this returns with anything but
    /// [`ShutdownReport::Incomplete`], no background work from this engine
    /// remains.
    pub async fn stop(&self) -> ShutdownReport {
        let _start = self.start_lock.lock().await;
        let work = {
            let mut rt = self.runtime();
            if rt.state != LifecycleState::Running {
                return ShutdownReport::NotRunning;
            }
            rt.state = LifecycleState::Stopping;
            rt.work.take()
        };
        let Some(work) = work else {
            self.runtime().state = LifecycleState::Stopped;
            return ShutdownReport::NotRunning;
        };

        info!("autonomy engine stopping");
        let report = work
            .shut_down(
                Duration::from_secs(self.config.lifecycle.shutdown_grace_secs),
                Duration::from_secs(self.config.lifecycle.force_cancel_secs),
            )
            .await;
        match report {
            ShutdownReport::Incomplete { outstanding } => {
                warn!(outstanding, "autonomy engine stopped with work outstanding");
            }
            _ => info!(?report, "autonomy engine stopped"),
        }

        let mut rt = self.runtime();
        rt.state = LifecycleState::Stopped;
        rt.last_work = Some(work);
        report
    }

    /// Current lifecycle state.
    pub fn lifecycle_state(&self) -> LifecycleState {
        self.runtime().state
    }

    /// Units of background work alive in the current (or last) run.
    pub fn outstanding_work(&self) -> usize {
        let rt = self.runtime();
        rt.work
            .as_ref()
            .or(rt.last_work.as_ref())
            .map_or(0, WorkGroup::outstanding)
    }

    // -----------------------------------------------------------------------
    // Control surface
    // -----------------------------------------------------------------------

    /// Snapshot of tasks, breaker, history, goals and switches.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            lifecycle: self.lifecycle_state(),
            tasks: self.scheduler.task_snapshots(),
            breaker: self.reasoner.breaker_snapshot(),
            recent_actions: self.history.recent(STATUS_RECENT_ACTIONS),
            active_goals: self.goals.list_active(),
            completed_goals: self.goals.list_completed().len(),
            recent_learnings: self.services.learnings.recent(STATUS_RECENT_LEARNINGS),
            learnings_recorded: self.services.learnings.total_recorded(),
            capabilities: self.capabilities.enabled(),
            optimization_enabled: self.scheduler.optimization_enabled(),
            outstanding_work: self.outstanding_work(),
        }
    }

    /// Enable a task.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownTask`](crate::AutonomyError::UnknownTask).
    pub fn enable(&self, id: &str) -> Result<()> {
        self.scheduler.enable(id)
    }

    /// Disable a task; an in-flight run completes.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownTask`](crate::AutonomyError::UnknownTask).
    pub fn disable(&self, id: &str) -> Result<()> {
        self.scheduler.disable(id)
    }

    /// Remove a task; an in-flight run completes but is not rescheduled.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownTask`](crate::AutonomyError::UnknownTask).
    pub fn remove(&self, id: &str) -> Result<()> {
        self.scheduler.remove(id)
    }

    /// Make a task due now.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownTask`](crate::AutonomyError::UnknownTask).
    pub fn trigger(&self, id: &str) -> Result<TriggerOutcome> {
        self.scheduler.trigger(id)
    }

    /// Allow or forbid the optimizer to rewrite intervals.
    pub fn set_optimization(&self, enabled: bool) {
        self.scheduler.set_optimization(enabled);
    }

    /// Switch a capability by name (`research`, `learn`, `message`,
    /// `monitor`, or the aliases `web` and `screen`).
    ///
    /// # Errors
    ///
    /// [`AutonomyError::Config`](crate::AutonomyError::Config) for an
    /// unknown name.
    pub fn set_capability(&self, name: &str, enabled: bool) -> Result<Capability> {
        let capability: Capability = name.parse()?;
        self.capabilities.set(capability, enabled);
        info!(%capability, enabled, "capability toggled");
        Ok(capability)
    }

    /// Create a goal. Returns its id.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::GoalLimit`](crate::AutonomyError::GoalLimit) or
    /// [`AutonomyError::InvalidGoal`](crate::AutonomyError::InvalidGoal).
    pub fn create_goal(&self, description: &str, priority: u8) -> Result<String> {
        self.goals.create_goal(description, priority)
    }

    /// Drop an active goal.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::UnknownGoal`](crate::AutonomyError::UnknownGoal).
    pub fn abandon_goal(&self, id: &str) -> Result<Goal> {
        self.goals.abandon(id)
    }

    /// Run the self-test now and return its report.
    ///
    /// Goes through the scheduler when `self_test` is registered and
    /// enabled, so the run is recorded like any other. Returns `Ok(None)`
    /// when a scheduled self-test is already in flight; the report of that
    /// run lands in [`SelfTestTask::last_report`] when it finishes.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::TaskExecution`] when the run times out, fails or is
    /// cancelled by shutdown. A report from an earlier run is never returned
    /// in its place.
    pub async fn run_self_test_now(&self) -> Result<Option<SelfTestReport>> {
        if !self.scheduler.contains(TASK_SELF_TEST) {
            return Ok(Some(self.self_test.check_all().await));
        }
        let work = self.runtime().work.clone().unwrap_or_default();
        let outcome = match self.scheduler.run_now(TASK_SELF_TEST, &work).await? {
            RunNowOutcome::Completed(outcome) => outcome,
            RunNowOutcome::AlreadyRunning => return Ok(None),
            RunNowOutcome::Disabled => return Ok(Some(self.self_test.check_all().await)),
        };
        if !outcome.is_success() {
            return Err(AutonomyError::TaskExecution {
                task_id: TASK_SELF_TEST.to_owned(),
                reason: format!("on-demand self-test ended {outcome}"),
            });
        }
        match self.self_test.last_report() {
            Some(report) => Ok(Some(report)),
            None => Err(AutonomyError::TaskExecution {
                task_id: TASK_SELF_TEST.to_owned(),
                reason: "self-test finished without a report".to_owned(),
            }),
        }
    }

    /// Run one decision cycle now, outside the decision clock.
    pub async fn run_decision_cycle(&self) -> CycleOutcome {
        self.decision.run_cycle().await
    }

    /// The goal tracker.
    pub fn goals(&self) -> &Arc<GoalTracker> {
        &self.goals
    }

    /// The shared action history.
    pub fn history(&self) -> &Arc<ActionHistory> {
        &self.history
    }

    /// The learning log.
    pub fn learnings(&self) -> &Arc<LearningLog> {
        &self.services.learnings
    }

    /// The breaker guarding the reasoning service.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.reasoner.breaker()
    }

    /// Engine configuration.
    pub fn config(&self) -> &AutonomyConfig {
        &self.config
    }
}

impl Drop for AutonomyEngine {
    fn drop(&mut self) {
        let rt = self.runtime.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(work) = rt.work.take() {
            warn!("autonomy engine dropped while running, cancelling background work");
            work.begin_shutdown();
            work.force_cancel();
            work.close();
        }
    }
}
