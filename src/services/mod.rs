//! External collaborators consumed by the engine.
//!
//! The engine never talks to a model, a database or a chat platform directly.
//! It depends on the narrow traits below, and the daemon binary wires in the
//! concrete adapters ([`OllamaReasoner`], [`JsonlFactStore`], [`TracingSink`]).

pub mod fact_store;
pub mod guarded;
pub mod ollama;
pub mod sink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use fact_store::{InMemoryFactStore, JsonlFactStore};
pub use guarded::GuardedReasoner;
pub use ollama::OllamaReasoner;
pub use sink::{TracingSink, notify_best_effort};

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The call did not finish within its deadline.
    #[error("service call timed out")]
    Timeout,
    /// The service could not be reached or refused the call.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// The service answered with something that could not be used.
    #[error("invalid service response: {0}")]
    InvalidResponse(String),
}

/// Reasoning/completion backend (an LLM).
///
/// Calls must be safe to retry: the breaker's HalfOpen trial may resend a
/// prompt that previously failed.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Complete `prompt`, giving up after `timeout`.
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ServiceError>;
}

/// A learned fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// Fact text.
    pub text: String,
    /// Free-form category (e.g. `"autonomous_research"`).
    pub category: String,
    /// When the fact was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl Fact {
    /// Create a fact stamped with the current time.
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: category.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Persistent fact/learning store.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Store one fact.
    async fn record_fact(&self, text: &str, category: &str) -> Result<(), ServiceError>;
    /// Return every stored fact, oldest first.
    async fn list_facts(&self) -> Result<Vec<Fact>, ServiceError>;
}

/// Reporting/messaging sink used to surface status to a human.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver `text`.
    async fn notify(&self, text: &str) -> Result<(), ServiceError>;
}

/// A monitoring probe (network activity, screen content, ...).
#[async_trait]
pub trait Probe: Send + Sync {
    /// Short probe name used in log lines and summaries.
    fn name(&self) -> &str;
    /// Run one check. `Ok(Some(finding))` means something needs attention.
    async fn check(&self) -> Result<Option<String>, ServiceError>;
}
