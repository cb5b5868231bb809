//! Engine lifecycle and control surface.

pub mod control;
pub mod lifecycle;
pub mod status;

pub use control::AutonomyEngine;
pub use lifecycle::{LifecycleState, ShutdownReport, WorkGroup};
pub use status::EngineStatus;
