//! mender - test-regression repair orchestrator
//!
//! Given a repository whose tests fail, mender snapshots the pending
//! changes, finds the nearest state where the fast suite passes, runs a
//! bounded propose-apply-verify loop, and re-validates any accepted fix
//! against every configured suite in parallel. The working tree always
//! ends either holding a verified fix or bit-for-bit as it started.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, error taxonomy, port traits
//! - **Service Layer** (`services`): backup, locate, fix loop, suite runs, recovery
//! - **Adapters** (`adapters`): deterministic in-memory ports for tests and embedding
//! - **Infrastructure Layer** (`infrastructure`): git, shell suites, proposer command, config, logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use mender::services::{RepairOrchestrator, RepairPorts};
//!
//! let orchestrator = RepairOrchestrator::new(ports, &config)?;
//! let report = orchestrator.run(&CancellationToken::new()).await?;
//! std::process::exit(report.exit_code);
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{ExhaustionReason, RepairError, RepairResult};
pub use domain::models::{
    Config, FixAttempt, ReferenceState, RepairReport, RepairSession, SessionOutcome, Snapshot,
    SuiteRun,
};
pub use domain::ports::{FixProposer, SuiteExecutor, VcsProvider};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{RepairOrchestrator, RepairPorts};
