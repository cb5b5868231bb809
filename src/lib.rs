//! Autonomy: a self-tuning background task engine for long-running agents.
//!
//! The engine runs registered tasks on adaptive intervals, asks a reasoning
//! service what to do next, tracks goals, and protects every reasoning call
//! with a shared circuit breaker.
//!
//! # Architecture
//!
//! - **Scheduler**: dispatches due tasks by priority under a concurrency
//!   ceiling and records every completion
//! - **Performance**: rolling per-task statistics and the interval optimizer
//! - **Decision loop**: periodic reasoning about which task to trigger
//! - **Goals**: active and completed goals, advanced by `track_goals`
//! - **Learning log**: bounded record of goal, self-test and knowledge events
//! - **Engine**: lifecycle (`start`/`stop`) and the control surface
//!
//! External collaborators (reasoning, fact store, notifications, probes) are
//! traits in [`services`]; the `autonomyd` binary wires in concrete adapters.

pub mod capabilities;
pub mod circuit_breaker;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod goals;
pub mod learning;
pub mod performance;
pub mod scheduler;
pub mod services;
pub mod tasks;

#[doc(hidden)]
pub mod test_utils;

pub use config::AutonomyConfig;
pub use engine::{AutonomyEngine, EngineStatus, LifecycleState, ShutdownReport};
pub use error::{AutonomyError, Result};
