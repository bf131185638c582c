//! Suite executors backed by real processes.

pub mod shell_executor;

pub use shell_executor::ShellSuiteExecutor;
