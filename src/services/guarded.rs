//! Breaker-guarded access to the reasoning service.

use crate::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use crate::error::Result;
use crate::services::{ReasoningService, ServiceError};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The only path through which tasks and the decision loop reach the
/// reasoning service.
///
/// Every call is bounded by `timeout` and routed through the shared
/// [`CircuitBreaker`]; an elapsed deadline counts as a breaker failure.
#[derive(Clone)]
pub struct GuardedReasoner {
    inner: Arc<dyn ReasoningService>,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedReasoner {
    /// Wrap `inner` with `breaker`.
    pub fn new(inner: Arc<dyn ReasoningService>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    /// Complete `prompt` through the breaker.
    ///
    /// # Errors
    ///
    /// [`AutonomyError::CircuitOpen`](crate::AutonomyError::CircuitOpen) when
    /// short-circuited, [`AutonomyError::Service`](crate::AutonomyError::Service)
    /// when the service fails or the deadline passes.
    pub async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String> {
        let inner = Arc::clone(&self.inner);
        self.breaker
            .call(|| async move {
                match tokio::time::timeout(timeout, inner.complete(prompt, timeout)).await {
                    Ok(Ok(text)) => Ok(text),
                    Ok(Err(e)) => Err(e),
                    Err(_) => {
                        debug!(timeout_ms = timeout.as_millis() as u64, "reasoning call timed out");
                        Err(ServiceError::Timeout)
                    }
                }
            })
            .await
    }

    /// Shared breaker.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Breaker snapshot for status reporting.
    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }
}
