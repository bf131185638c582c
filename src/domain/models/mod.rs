//! Domain models for repair sessions.

pub mod attempt;
pub mod config;
pub mod diagnostics;
pub mod reference;
pub mod report;
pub mod session;
pub mod snapshot;
pub mod suite;

pub use attempt::{FixAttempt, Verification};
pub use config::{Config, LoggingConfig, ProposerConfig, RotationPolicy, SuiteConfig};
pub use diagnostics::Diagnostics;
pub use reference::{ReferenceKind, ReferenceState, ReferenceStatus};
pub use report::{RecoveryReport, RepairReport};
pub use session::{RepairSession, SessionOutcome};
pub use snapshot::Snapshot;
pub use suite::{
    AggregateReport, EvaluatedScope, ResultFormat, SuiteCost, SuiteRun, SuiteStatus,
    Termination, Verdict, CRASH_EXIT_CODE, TIMEOUT_EXIT_CODE,
};
