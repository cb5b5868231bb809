//! Circuit breaker guarding the reasoning service.
//!
//! One breaker is shared by every caller of the reasoning service. After
//! `failure_threshold` consecutive failures the circuit opens and calls fail
//! fast. Once the cooldown has elapsed a single trial call is admitted; its
//! outcome decides whether the circuit closes again or re-opens.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  N failures   ┌────────┐  cooldown   ┌──────────┐
//! │ Closed ├──────────────►│  Open  ├────────────►│ HalfOpen │
//! └───▲────┘               └───▲────┘             └────┬─────┘
//!     │                        │   trial failure       │
//!     │                        └───────────────────────┤
//!     │              trial success                     │
//!     └────────────────────────────────────────────────┘
//! ```
//!
//! While a trial is in flight every other caller is rejected exactly as if
//! the circuit were still open.

use crate::error::{AutonomyError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Default number of consecutive failures before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default cooldown before a trial call is admitted (seconds).
pub const DEFAULT_COOLDOWN_SECS: u64 = 300;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Dependency is healthy; calls pass through.
    Closed,
    /// Dependency failed repeatedly; calls fail fast until cooldown expires.
    Open,
    /// Cooldown elapsed; one trial call is probing recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time spent Open before a trial call is admitted.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
        }
    }
}

/// Point-in-time view of the breaker for `status()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// Configured threshold.
    pub failure_threshold: u32,
    /// Seconds until a trial call will be admitted (0 unless Open).
    pub retry_after_secs: u64,
    /// How many times the circuit has opened since creation.
    pub times_opened: u64,
    /// Whether a HalfOpen trial is currently running.
    pub trial_in_flight: bool,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    trial_in_flight: bool,
    times_opened: u64,
}

/// How a call was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// Shared circuit breaker.
///
/// All mutation goes through one [`Mutex`]; the lock is never held across
/// an `.await`.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                trial_in_flight: false,
                times_opened: 0,
            }),
        }
    }

    /// Breaker configuration.
    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Run `op` through the breaker.
    ///
    /// Returns [`AutonomyError::CircuitOpen`] without invoking `op` while the
    /// circuit is open or a trial is already in flight.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<AutonomyError>,
    {
        let admission = self.admit()?;
        let mut trial = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };

        let outcome = op().await;
        trial.armed = false;

        match outcome {
            Ok(value) => {
                self.record_success(admission);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(admission);
                Err(e.into())
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Snapshot for observability.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            retry_after_secs: self.retry_after_secs(&inner),
            times_opened: inner.times_opened,
            trial_in_flight: inner.trial_in_flight,
        }
    }

    /// Force the breaker closed and clear its counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure_at = None;
        inner.trial_in_flight = false;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn retry_after_secs(&self, inner: &BreakerInner) -> u64 {
        if inner.state != CircuitState::Open {
            return 0;
        }
        let Some(last) = inner.last_failure_at else {
            return 0;
        };
        let remaining = self.config.cooldown.saturating_sub(last.elapsed());
        // Round up so "0s" is only reported once a trial would be admitted.
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    fn admit(&self) -> Result<Admission> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure_at
                    .is_none_or(|t| t.elapsed() >= self.config.cooldown);
                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!("circuit breaker half-open, admitting trial call");
                    Ok(Admission::Trial)
                } else {
                    Err(AutonomyError::CircuitOpen {
                        retry_after_secs: self.retry_after_secs(&inner),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(AutonomyError::CircuitOpen {
                        retry_after_secs: 0,
                    })
                } else {
                    inner.trial_in_flight = true;
                    Ok(Admission::Trial)
                }
            }
        }
    }

    fn record_success(&self, admission: Admission) {
        let mut inner = self.lock();
        match admission {
            Admission::Trial => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.trial_in_flight = false;
                info!("circuit breaker closed after successful trial");
            }
            // A call admitted before the circuit opened says nothing about
            // recovery; only the trial may close it.
            Admission::Normal => {
                if inner.state == CircuitState::Closed {
                    inner.consecutive_failures = 0;
                }
            }
        }
    }

    fn record_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match admission {
            Admission::Trial => {
                inner.trial_in_flight = false;
                self.open(&mut inner);
                warn!("circuit breaker trial failed, re-opening");
            }
            Admission::Normal => {
                if inner.state == CircuitState::Closed
                    && inner.consecutive_failures >= self.config.failure_threshold
                {
                    self.open(&mut inner);
                    warn!(
                        consecutive_failures = inner.consecutive_failures,
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "circuit breaker opened"
                    );
                }
            }
        }
    }

    fn open(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.last_failure_at = Some(Instant::now());
        inner.times_opened = inner.times_opened.saturating_add(1);
    }
}

/// Re-opens the circuit if a trial call is dropped before it completes
/// (cancelled by shutdown or by an outer timeout).
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.record_failure(Admission::Trial);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::services::ServiceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_breaker(threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(cooldown_secs),
        })
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<()> {
        breaker
            .call(|| async { Err::<(), _>(ServiceError::Unavailable("down".to_owned())) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<()> {
        breaker.call(|| async { Ok::<_, ServiceError>(()) }).await
    }

    #[tokio::test]
    async fn initial_state_is_closed() {
        let breaker = make_breaker(5, 300);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(succeed(&breaker).await.is_ok());
    }

    #[tokio::test]
    async fn opens_after_exactly_threshold_failures() {
        let breaker = make_breaker(5, 300);
        for _ in 0..4 {
            let _ = fail(&breaker).await;
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().times_opened, 1);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures() {
        let breaker = make_breaker(3, 300);
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn open_fails_fast_without_invoking_operation() {
        let breaker = make_breaker(5, 300);
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }

        let counter = AtomicUsize::new(0);
        let invoked = &counter;
        let result = breaker
            .call(move || async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ServiceError>(())
            })
            .await;

        assert!(matches!(result, Err(AutonomyError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn trial_success_closes_circuit() {
        let breaker = make_breaker(2, 60);
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(61)).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn trial_failure_reopens_and_restarts_cooldown() {
        let breaker = make_breaker(1, 60);
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().times_opened, 2);

        // The cooldown clock restarted at the trial failure.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(matches!(
            succeed(&breaker).await,
            Err(AutonomyError::CircuitOpen { .. })
        ));
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(succeed(&breaker).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_concurrent_trial_is_admitted() {
        let breaker = make_breaker(1, 60);
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let counter = AtomicUsize::new(0);
        let invoked = &counter;
        let calls = (0..8).map(|_| {
            breaker.call(move || async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, ServiceError>(())
            })
        });
        let results = futures_util::future::join_all(calls).await;

        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(AutonomyError::CircuitOpen { .. })))
                .count(),
            7
        );
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_reopens_circuit() {
        let breaker = make_breaker(1, 60);
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let trial = breaker.call(|| async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok::<_, ServiceError>(())
        });
        let timed_out = tokio::time::timeout(Duration::from_secs(1), trial).await;
        assert!(timed_out.is_err());

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert!(!snapshot.trial_in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_counts_down() {
        let breaker = make_breaker(1, 300);
        let _ = fail(&breaker).await;
        assert_eq!(breaker.snapshot().retry_after_secs, 300);
        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(breaker.snapshot().retry_after_secs, 200);
    }

    #[tokio::test]
    async fn reset_closes_circuit() {
        let breaker = make_breaker(1, 300);
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(succeed(&breaker).await.is_ok());
    }

    #[test]
    fn default_config_values() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.cooldown, Duration::from_secs(300));
    }
}
