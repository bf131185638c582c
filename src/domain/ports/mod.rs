//! Port traits for the external collaborators of a repair session.

pub mod fix_proposer;
pub mod suite_executor;
pub mod vcs;

pub use fix_proposer::{FixProposer, Proposal, ProposerError};
pub use suite_executor::{ExecutorError, SuiteExecution, SuiteExecutor};
pub use vcs::{Checkout, VcsError, VcsProvider, VcsResult};
