//! Decision loop and its pure decision policy.

pub mod policy;
pub mod runner;

pub use policy::{Decision, DecisionContext, ProposedAction, build_prompt, interpret};
pub use runner::{CycleOutcome, DecisionLoop};
