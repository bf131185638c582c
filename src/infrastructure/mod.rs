//! Infrastructure layer module
//!
//! Concrete adapters behind the domain ports plus the ambient plumbing:
//! - Configuration loading (figment)
//! - Logging (tracing) and secret scrubbing
//! - Durable state: snapshots, suite logs, session reports
//! - Git VCS provider
//! - Shell suite executor
//! - Command-line fix proposer
//! - Process-group cleanup for both

pub mod config;
pub mod logging;
pub(crate) mod process;
pub mod proposer;
pub mod storage;
pub mod suites;
pub mod vcs;
