//! Deterministic in-memory adapters for the VCS, suite executor and fix
//! proposer ports.

pub mod fix_proposer;
pub mod suite_executor;
pub mod vcs;

pub use fix_proposer::{ProposerCall, ScriptedFixProposer, ScriptedReply};
pub use suite_executor::{FailureRule, ScriptedSuiteExecutor};
pub use vcs::{make_patch, FilePatch, InMemoryVcs, Tree};
