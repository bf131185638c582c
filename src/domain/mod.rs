//! Domain layer for the repair orchestrator
//!
//! Pure models, the error taxonomy, and the port traits that external
//! collaborators (VCS, suite executor, fix proposer) implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ExhaustionReason, RepairError, RepairResult};
