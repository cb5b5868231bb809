//! Decision loop.
//!
//! Runs on its own clock. Each cycle snapshots recent history, asks the
//! breaker-guarded reasoning service what to do and acts on the
//! [`Decision`](super::Decision): trigger a registered task, record a note,
//! or record that nothing was urgent. At most one cycle is in flight; a
//! clock tick that finds the lock held is skipped.

use crate::capabilities::Capabilities;
use crate::config::DecisionConfig;
use crate::decision::policy::{DecisionContext, ProposedAction, build_prompt, interpret};
use crate::engine::WorkGroup;
use crate::error::AutonomyError;
use crate::scheduler::history::{ActionEntry, ActionHistory, ActionOutcome};
use crate::scheduler::registry::TriggerOutcome;
use crate::scheduler::runner::Scheduler;
use crate::services::GuardedReasoner;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// How one decision cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The named task was made due.
    Triggered(String),
    /// The named task was chosen but could not be triggered.
    NotTriggered(String, TriggerOutcome),
    /// A free-form action was recorded.
    Noted(String),
    /// Nothing urgent.
    Idle,
    /// No enabled tasks; the service was not consulted.
    NoTasks,
    /// The reasoning call failed or the circuit was open.
    Failed(String),
    /// The cycle overran its deadline and was discarded.
    Abandoned,
    /// Another cycle held the decision lock.
    Skipped,
}

/// The independently clocked decision loop.
pub struct DecisionLoop {
    scheduler: Arc<Scheduler>,
    reasoner: GuardedReasoner,
    history: Arc<ActionHistory>,
    capabilities: Arc<Capabilities>,
    config: DecisionConfig,
    lock: Mutex<()>,
}

impl DecisionLoop {
    /// Build a loop acting on `scheduler`.
    pub fn new(
        scheduler: Arc<Scheduler>,
        reasoner: GuardedReasoner,
        history: Arc<ActionHistory>,
        capabilities: Arc<Capabilities>,
        config: DecisionConfig,
    ) -> Self {
        Self {
            scheduler,
            reasoner,
            history,
            capabilities,
            config,
            lock: Mutex::new(()),
        }
    }

    /// Run until `work` is shut down. Each cycle is spawned into `work` so
    /// a slow cycle never delays the clock.
    pub async fn run(self: Arc<Self>, work: WorkGroup) {
        info!(interval_secs = self.config.interval_secs, "decision loop started");
        let mut clock = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; give the scheduler a head start.
        clock.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = work.shutdown_token().cancelled() => break,
                _ = clock.tick() => {}
            }
            let this = Arc::clone(&self);
            let shutdown = work.shutdown_token().clone();
            work.spawn(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => debug!("decision cycle interrupted by shutdown"),
                    _ = this.run_cycle() => {}
                }
            });
        }
        info!("decision loop stopped");
    }

    /// Run one cycle now, unless another is in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.lock.try_lock() else {
            debug!("decision cycle skipped, previous cycle still in flight");
            return CycleOutcome::Skipped;
        };

        let deadline = Duration::from_secs(self.config.cycle_timeout_secs);
        match tokio::time::timeout(deadline, self.decide()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let err = AutonomyError::DecisionCycleAbandoned {
                    timeout_secs: deadline.as_secs(),
                };
                warn!(code = err.code(), "{err}");
                CycleOutcome::Abandoned
            }
        }
    }

    fn context(&self) -> DecisionContext {
        DecisionContext {
            now: Utc::now(),
            recent: self.history.recent(self.config.recent_actions),
            capabilities: self.capabilities.enabled(),
            tasks: self.scheduler.enabled_tasks(),
        }
    }

    async fn decide(&self) -> CycleOutcome {
        let ctx = self.context();
        if ctx.tasks.is_empty() {
            debug!("no enabled tasks, skipping decision");
            return CycleOutcome::NoTasks;
        }

        let prompt = build_prompt(&ctx);
        let timeout = Duration::from_secs(self.config.call_timeout_secs);
        let reply = match self.reasoner.complete(&prompt, timeout).await {
            Ok(reply) => reply,
            Err(e) => {
                let summary = format!("decision failed: {e}");
                if e.is_transient() {
                    debug!(code = e.code(), "{summary}");
                } else {
                    warn!(code = e.code(), "{summary}");
                }
                self.history
                    .record(ActionEntry::ad_hoc(ActionOutcome::Failure, &summary));
                return CycleOutcome::Failed(summary);
            }
        };

        let decision = interpret(&reply, &ctx.tasks);
        match decision.action {
            ProposedAction::RunTask(id) => match self.scheduler.trigger(&id) {
                Ok(TriggerOutcome::Triggered) => {
                    info!(task_id = %id, "decision loop triggered task");
                    self.history.record(ActionEntry::ad_hoc(
                        ActionOutcome::Triggered,
                        &format!("triggered {id}: {}", decision.rationale),
                    ));
                    CycleOutcome::Triggered(id)
                }
                Ok(other) => {
                    let reason = match other {
                        TriggerOutcome::AlreadyRunning => "already running",
                        TriggerOutcome::Disabled => "disabled",
                        TriggerOutcome::Triggered => "triggered",
                    };
                    debug!(task_id = %id, reason, "decision target not triggered");
                    self.history.record(ActionEntry::ad_hoc(
                        ActionOutcome::Skipped,
                        &format!("chose {id} but it is {reason}: {}", decision.rationale),
                    ));
                    CycleOutcome::NotTriggered(id, other)
                }
                // Removed between the snapshot and the trigger.
                Err(e) => {
                    debug!(task_id = %id, "decision target vanished: {e}");
                    CycleOutcome::Idle
                }
            },
            ProposedAction::Note(note) => {
                info!("decided: {note}");
                self.history
                    .record(ActionEntry::ad_hoc(ActionOutcome::Decided, &note));
                CycleOutcome::Noted(note)
            }
            ProposedAction::Nothing => {
                debug!("nothing urgent");
                self.history
                    .record(ActionEntry::ad_hoc(ActionOutcome::Idle, "nothing urgent"));
                CycleOutcome::Idle
            }
        }
    }
}
