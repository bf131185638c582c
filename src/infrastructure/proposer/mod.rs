//! Fix proposers backed by external tools.

pub mod command_proposer;

pub use command_proposer::CommandFixProposer;
