//! End-to-end scheduling scenarios through the public engine API.

use async_trait::async_trait;
use autonomy::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use autonomy::scheduler::{TaskBody, TaskContext, TaskResult, TaskSpec};
use autonomy::services::{GuardedReasoner, InMemoryFactStore, ServiceError};
use autonomy::tasks::TASK_TRACK_GOALS;
use autonomy::test_utils::{ConcurrencyGauge, CountingTask, RecordingSink, ScriptedReasoner};
use autonomy::{AutonomyConfig, AutonomyEngine, AutonomyError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn engine_with(config: AutonomyConfig, reasoner: ScriptedReasoner) -> AutonomyEngine {
    AutonomyEngine::new(
        config,
        Arc::new(reasoner),
        Arc::new(InMemoryFactStore::new()),
        Arc::new(RecordingSink::new()),
    )
    .expect("valid config")
}

fn config_without_decisions() -> AutonomyConfig {
    let mut config = AutonomyConfig::default();
    config.decision.enabled = false;
    config
}

/// Appends its task id to a shared log, then holds for a second.
struct OrderRecorder {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl TaskBody for OrderRecorder {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        self.log.lock().unwrap().push(ctx.task_id().to_owned());
        tokio::time::sleep(Duration::from_secs(1)).await;
        TaskResult::Success("recorded".to_owned())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Priority ordering
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_higher_priority_dispatches_first_under_ceiling_of_one() {
    let mut config = config_without_decisions();
    config.scheduler.max_concurrent = 1;
    let engine = engine_with(config, ScriptedReasoner::always("x"));

    let log = Arc::new(Mutex::new(Vec::new()));
    for (id, priority) in [("a", 5), ("b", 8)] {
        engine
            .register(
                TaskSpec::new(id, id.to_uppercase(), Duration::from_secs(10)).with_priority(priority),
                Arc::new(OrderRecorder {
                    log: Arc::clone(&log),
                }),
            )
            .unwrap();
    }

    engine.start().await;
    tokio::time::sleep(Duration::from_secs(8)).await;
    engine.stop().await;

    let order = log.lock().unwrap().clone();
    assert_eq!(&order[..2], ["b", "a"]);
}

// ────────────────────────────────────────────────────────────────────────────
// Circuit breaker
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_after_threshold_and_fails_fast() {
    let service = Arc::new(ScriptedReasoner::failing(ServiceError::Unavailable(
        "connection refused".to_owned(),
    )));
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 5,
        cooldown: Duration::from_secs(300),
    }));
    let guarded = GuardedReasoner::new(service.clone(), Arc::clone(&breaker));

    for _ in 0..5 {
        let err = guarded.complete("hi", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, AutonomyError::Service(_)));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let err = guarded.complete("hi", Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, AutonomyError::CircuitOpen { .. }));
    assert_eq!(service.call_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_recovers_through_single_trial() {
    let service = Arc::new(
        ScriptedReasoner::sequence(vec![
            Err(ServiceError::Timeout),
            Err(ServiceError::Timeout),
            Ok("back online".to_owned()),
        ])
        .with_delay(Duration::from_secs(1)),
    );
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 2,
        cooldown: Duration::from_secs(60),
    }));
    let guarded = GuardedReasoner::new(service.clone(), Arc::clone(&breaker));

    for _ in 0..2 {
        assert!(guarded.complete("hi", Duration::from_secs(5)).await.is_err());
    }
    tokio::time::sleep(Duration::from_secs(61)).await;

    let (first, second) = tokio::join!(
        guarded.complete("hi", Duration::from_secs(5)),
        guarded.complete("hi", Duration::from_secs(5)),
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|r| matches!(r, Err(AutonomyError::CircuitOpen { .. })))
            .count(),
        1
    );
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(service.call_count(), 3);
}

// ────────────────────────────────────────────────────────────────────────────
// Goals
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_track_goals_works_on_highest_priority_goal() {
    let engine = engine_with(
        config_without_decisions(),
        ScriptedReasoner::always("Read the scheduler design notes.\nPROGRESS: 40"),
    )
    .with_builtin_tasks()
    .unwrap();
    let high = engine.create_goal("understand the scheduler", 9).unwrap();
    let low = engine.create_goal("tidy the fact store", 3).unwrap();

    engine.start().await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    engine.stop().await;

    let goals = engine.goals().list_active();
    let progress_of = |id: &str| goals.iter().find(|g| g.id == id).unwrap().progress;
    assert_eq!(progress_of(&high), 40);
    assert_eq!(progress_of(&low), 0);

    let track = engine
        .status()
        .tasks
        .into_iter()
        .find(|t| t.id == TASK_TRACK_GOALS)
        .unwrap();
    assert_eq!(track.performance.unwrap().success_count, 1);
}

// ────────────────────────────────────────────────────────────────────────────
// Interval optimizer
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_fast_reliable_task_tightens_down_to_its_minimum() {
    let engine = engine_with(config_without_decisions(), ScriptedReasoner::always("x"));
    let task = Arc::new(CountingTask::succeeding().with_delay(Duration::from_secs(2)));
    engine
        .register(
            TaskSpec::new("fast", "Fast", Duration::from_secs(100))
                .with_bounds(Duration::from_secs(80), Duration::from_secs(200)),
            task.clone(),
        )
        .unwrap();

    engine.start().await;
    let mut seen = Vec::new();
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_secs(60)).await;
        let snap = engine.status().tasks.pop().unwrap();
        seen.push(snap.interval_secs);
        assert!(snap.next_run_in_secs <= snap.interval_secs);
    }
    engine.stop().await;

    assert!(task.runs() >= 20);
    assert!(seen.iter().all(|s| (80..=200).contains(s)));
    assert_eq!(*seen.last().unwrap(), 80);
    // 100 * 0.8 lands exactly on the minimum.
    assert!(seen.iter().all(|s| *s == 100 || *s == 80));
}

#[tokio::test(start_paused = true)]
async fn test_failing_task_backs_off_to_its_maximum() {
    let engine = engine_with(config_without_decisions(), ScriptedReasoner::always("x"));
    let task = Arc::new(CountingTask::failing());
    engine
        .register(
            TaskSpec::new("flaky", "Flaky", Duration::from_secs(60))
                .with_bounds(Duration::from_secs(60), Duration::from_secs(300)),
            task.clone(),
        )
        .unwrap();

    engine.start().await;
    tokio::time::sleep(Duration::from_secs(3600)).await;
    engine.stop().await;

    let snap = engine.status().tasks.pop().unwrap();
    assert_eq!(snap.interval_secs, 300);
    assert_eq!(snap.performance.unwrap().success_rate, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_optimization_switch_freezes_intervals() {
    let engine = engine_with(config_without_decisions(), ScriptedReasoner::always("x"));
    engine.set_optimization(false);
    engine
        .register(
            TaskSpec::new("flaky", "Flaky", Duration::from_secs(60)),
            Arc::new(CountingTask::failing()),
        )
        .unwrap();

    engine.start().await;
    tokio::time::sleep(Duration::from_secs(1800)).await;
    engine.stop().await;

    assert_eq!(engine.status().tasks[0].interval_secs, 60);
}

// ────────────────────────────────────────────────────────────────────────────
// No concurrent re-dispatch
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_triggers_never_overlap_a_running_task() {
    let mut config = config_without_decisions();
    config.scheduler.max_concurrent = 4;
    let engine = engine_with(config, ScriptedReasoner::always("x"));
    let gauge = Arc::new(ConcurrencyGauge::new(Duration::from_secs(30)));
    for id in ["one", "two"] {
        engine
            .register(
                TaskSpec::new(id, id, Duration::from_secs(10)),
                gauge.clone() as Arc<dyn TaskBody>,
            )
            .unwrap();
    }

    engine.start().await;
    for _ in 0..120 {
        let _ = engine.trigger("one");
        let _ = engine.trigger("two");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    engine.stop().await;

    assert_eq!(gauge.max_overlap(), 1);
    assert!(gauge.total_runs() >= 4);
}
