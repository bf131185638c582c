pub mod backup_manager;
pub mod diagnostics;
pub mod fix_controller;
pub mod log_parser;
pub mod orchestrator;
pub mod recovery;
pub mod reference_locator;
pub mod result_aggregator;
pub mod suite_runner;
pub mod workspace;

pub use backup_manager::BackupManager;
pub use diagnostics::DiagnosticsCollector;
pub use fix_controller::{classify, FixIterationController, LoopState};
pub use log_parser::parse_failure_count;
pub use orchestrator::{RepairOrchestrator, RepairPorts};
pub use recovery::RecoveryHandler;
pub use reference_locator::{LocateReport, ReferenceLocator};
pub use result_aggregator::ResultAggregator;
pub use suite_runner::{run_suite, ParallelSuiteRunner, SuiteBatch, KILL_GRACE};
pub use workspace::{AppliedChange, Workspace};
