//! Configuration types for the autonomy engine.

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{AutonomyError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the autonomy engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyConfig {
    /// Scheduler loop settings.
    pub scheduler: SchedulerConfig,
    /// Circuit breaker guarding the reasoning service.
    pub breaker: BreakerConfig,
    /// Interval optimizer policy.
    pub optimizer: OptimizerConfig,
    /// Decision loop settings.
    pub decision: DecisionConfig,
    /// Goal tracker settings.
    pub goals: GoalsConfig,
    /// Built-in task settings.
    pub tasks: TasksConfig,
    /// Start/stop behaviour.
    pub lifecycle: LifecycleConfig,
    /// Action history settings.
    pub history: HistoryConfig,
    /// Reasoning service endpoint.
    pub reasoner: ReasonerConfig,
    /// Fact store location.
    pub facts: FactsConfig,
    /// Initial capability switches.
    pub capabilities: CapabilitiesConfig,
}

/// Scheduler loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks.
    pub tick_secs: u64,
    /// Maximum number of task executions in flight at once.
    pub max_concurrent: usize,
    /// Upper bound on a single task execution (seconds).
    pub task_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 5,
            max_concurrent: 3,
            task_timeout_secs: 120,
        }
    }
}

impl SchedulerConfig {
    /// Tick period.
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Per-execution deadline.
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Seconds spent Open before a trial call is admitted.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: crate::circuit_breaker::DEFAULT_FAILURE_THRESHOLD,
            cooldown_secs: crate::circuit_breaker::DEFAULT_COOLDOWN_SECS,
        }
    }
}

impl From<&BreakerConfig> for CircuitBreakerConfig {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            cooldown: Duration::from_secs(config.cooldown_secs),
        }
    }
}

/// Interval optimizer policy.
///
/// A task that succeeds at least `high_success_rate` of the time with a mean
/// duration under `fast_threshold_ms` is run more often (interval multiplied
/// by `decrease_factor`). A task below `low_success_rate` is backed off
/// (interval multiplied by `increase_factor`). Everything in between is left
/// alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Whether the optimizer may rewrite intervals at start-up.
    pub enabled: bool,
    /// Executions required before any adjustment is made.
    pub min_samples: u64,
    /// Mean duration below which a task counts as fast (milliseconds).
    pub fast_threshold_ms: u64,
    /// Success rate at or above which fast tasks are tightened.
    pub high_success_rate: f64,
    /// Success rate below which tasks are backed off.
    pub low_success_rate: f64,
    /// Multiplier applied when tightening (0 < f < 1).
    pub decrease_factor: f64,
    /// Multiplier applied when backing off (f > 1).
    pub increase_factor: f64,
    /// No task interval is ever tightened below this (seconds).
    pub min_interval_floor_secs: u64,
    /// No task interval is ever loosened beyond this (seconds).
    pub max_interval_ceiling_secs: u64,
    /// Number of recent durations kept per task.
    pub duration_history: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_samples: 5,
            fast_threshold_ms: 5_000,
            high_success_rate: 0.7,
            low_success_rate: 0.5,
            decrease_factor: 0.8,
            increase_factor: 1.5,
            min_interval_floor_secs: 60,
            max_interval_ceiling_secs: 86_400,
            duration_history: 20,
        }
    }
}

/// Decision loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Whether the decision loop runs at all.
    pub enabled: bool,
    /// Seconds between decision cycles.
    pub interval_secs: u64,
    /// Upper bound on one whole cycle (seconds).
    pub cycle_timeout_secs: u64,
    /// Deadline handed to the reasoning call (seconds).
    pub call_timeout_secs: u64,
    /// Recent action-history entries included in the prompt.
    pub recent_actions: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            cycle_timeout_secs: 30,
            call_timeout_secs: 25,
            recent_actions: 5,
        }
    }
}

/// Goal tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalsConfig {
    /// Maximum number of simultaneously active goals.
    pub max_active: usize,
    /// Ask the reasoning service for a new goal when none is active.
    pub propose_when_idle: bool,
    /// Deadline for goal-related reasoning calls (seconds).
    pub call_timeout_secs: u64,
    /// Progress added per productive step when the reply carries no estimate.
    pub step_progress: u8,
}

impl Default for GoalsConfig {
    fn default() -> Self {
        Self {
            max_active: 10,
            propose_when_idle: true,
            call_timeout_secs: 25,
            step_progress: 10,
        }
    }
}

/// Built-in task configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Deadline for reasoning calls made by built-in tasks (seconds).
    pub call_timeout_secs: u64,
    /// Deadline for the self-test reasoning probe (seconds).
    pub self_test_timeout_secs: u64,
    /// Facts required before consolidation does anything.
    pub consolidate_min_facts: usize,
    /// Most recent facts reviewed per consolidation run.
    pub consolidate_window: usize,
    /// URL checked by `monitor_network`. The task is not registered when unset.
    pub monitor_url: Option<String>,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 20,
            self_test_timeout_secs: 10,
            consolidate_min_facts: 10,
            consolidate_window: 20,
            monitor_url: None,
        }
    }
}

impl TasksConfig {
    /// Reasoning call deadline as a [`Duration`].
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Start/stop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Seconds `stop()` waits for in-flight work to finish on its own.
    pub shutdown_grace_secs: u64,
    /// Seconds `stop()` waits after force-cancelling remaining work.
    pub force_cancel_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 30,
            force_cancel_secs: 5,
        }
    }
}

/// Action history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Entries retained before the oldest are evicted.
    pub capacity: usize,
    /// Learning log entries retained before the oldest are evicted.
    pub learning_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            learning_capacity: 1000,
        }
    }
}

/// Reasoning service endpoint (Ollama-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    /// Server base URL.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_owned(),
            model: "llama3.2".to_owned(),
            temperature: 0.5,
        }
    }
}

/// Fact store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FactsConfig {
    /// JSON-lines file backing the store. In-memory when `None`.
    pub path: Option<PathBuf>,
}

/// Initial capability switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitiesConfig {
    /// Autonomous research.
    pub research: bool,
    /// Knowledge consolidation.
    pub learn: bool,
    /// Proactive messages to the notification sink.
    pub message: bool,
    /// Monitoring probes.
    pub monitor: bool,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            research: true,
            learn: true,
            message: true,
            monitor: true,
        }
    }
}

impl AutonomyConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| AutonomyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AutonomyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/autonomy/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("autonomy").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("autonomy")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/autonomy-config/config.toml")
        }
    }

    /// Reject settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`AutonomyError::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(AutonomyError::Config(msg.to_owned()));

        if self.scheduler.tick_secs == 0 {
            return fail("scheduler.tick_secs must be greater than zero");
        }
        if self.scheduler.max_concurrent == 0 {
            return fail("scheduler.max_concurrent must be greater than zero");
        }
        if self.scheduler.task_timeout_secs == 0 {
            return fail("scheduler.task_timeout_secs must be greater than zero");
        }
        if self.breaker.failure_threshold == 0 {
            return fail("breaker.failure_threshold must be greater than zero");
        }

        let opt = &self.optimizer;
        if !(opt.decrease_factor > 0.0 && opt.decrease_factor < 1.0) {
            return fail("optimizer.decrease_factor must be in (0, 1)");
        }
        if !(opt.increase_factor > 1.0 && opt.increase_factor.is_finite()) {
            return fail("optimizer.increase_factor must be greater than 1");
        }
        if !(0.0..=1.0).contains(&opt.low_success_rate)
            || !(0.0..=1.0).contains(&opt.high_success_rate)
            || opt.low_success_rate > opt.high_success_rate
        {
            return fail("optimizer success rates must satisfy 0 <= low <= high <= 1");
        }
        if opt.min_interval_floor_secs == 0 {
            return fail("optimizer.min_interval_floor_secs must be greater than zero");
        }
        if opt.min_interval_floor_secs > opt.max_interval_ceiling_secs {
            return fail("optimizer.min_interval_floor_secs exceeds max_interval_ceiling_secs");
        }
        if opt.duration_history == 0 {
            return fail("optimizer.duration_history must be greater than zero");
        }

        if self.decision.interval_secs == 0 || self.decision.cycle_timeout_secs == 0 {
            return fail("decision.interval_secs and cycle_timeout_secs must be greater than zero");
        }
        if self.goals.step_progress == 0 || self.goals.step_progress > 100 {
            return fail("goals.step_progress must be in 1..=100");
        }
        if self.tasks.call_timeout_secs == 0 || self.tasks.self_test_timeout_secs == 0 {
            return fail("tasks call timeouts must be greater than zero");
        }
        if self.history.capacity == 0 || self.history.learning_capacity == 0 {
            return fail("history.capacity and learning_capacity must be greater than zero");
        }
        Ok(())
    }
}
