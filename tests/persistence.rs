//! Config files and the JSON-lines fact store across engine restarts.

use autonomy::services::{FactStore, JsonlFactStore};
use autonomy::tasks::research::RESEARCH_CATEGORY;
use autonomy::test_utils::{RecordingSink, ScriptedReasoner};
use autonomy::{AutonomyConfig, AutonomyEngine, AutonomyError};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_saved_config_builds_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = AutonomyConfig::default();
    config.scheduler.max_concurrent = 1;
    config.decision.enabled = false;
    config.capabilities.message = false;
    config.facts.path = Some(dir.path().join("facts.jsonl"));
    config.save_to_file(&path).unwrap();

    let loaded = AutonomyConfig::from_file(&path).unwrap();
    assert_eq!(loaded.scheduler.max_concurrent, 1);
    assert!(!loaded.capabilities.message);
    assert_eq!(loaded.facts.path, config.facts.path);

    let engine = AutonomyEngine::new(
        loaded,
        Arc::new(ScriptedReasoner::always("x")),
        Arc::new(JsonlFactStore::new(dir.path().join("facts.jsonl"))),
        Arc::new(RecordingSink::new()),
    )
    .unwrap();
    assert!(!engine.status().capabilities.is_empty());
}

#[test]
fn test_partial_config_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[breaker]\nfailure_threshold = 2\n").unwrap();

    let config = AutonomyConfig::from_file(&path).unwrap();
    assert_eq!(config.breaker.failure_threshold, 2);
    assert_eq!(config.breaker.cooldown_secs, 300);
    assert_eq!(config.scheduler.tick_secs, 5);
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[optimizer]\ndecrease_factor = 1.5\n").unwrap();

    let err = AutonomyConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, AutonomyError::Config(_)));
}

#[tokio::test]
async fn test_researched_facts_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let facts_path = dir.path().join("facts.jsonl");

    let mut config = AutonomyConfig::default();
    config.decision.enabled = false;
    let engine = AutonomyEngine::new(
        config,
        Arc::new(ScriptedReasoner::always(
            "Rust's borrow checker rules out data races at compile time.",
        )),
        Arc::new(JsonlFactStore::new(facts_path.clone())),
        Arc::new(RecordingSink::new()),
    )
    .unwrap()
    .with_builtin_tasks()
    .unwrap();

    engine.start().await;
    let reopened = JsonlFactStore::new(facts_path);
    let mut facts = Vec::new();
    for _ in 0..50 {
        facts = reopened.list_facts().await.unwrap();
        if !facts.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    engine.stop().await;

    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].category, RESEARCH_CATEGORY);
    assert!(facts[0].text.contains("borrow checker"));
}
