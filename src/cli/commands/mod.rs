//! CLI command implementations.
//!
//! Each command returns its process exit code; errors are mapped by
//! [`crate::cli::exit_code_for`].

pub mod locate;
pub mod repair;
pub mod snapshot;
pub mod verify;

use std::path::PathBuf;

use crate::domain::models::Config;

/// Everything a command needs besides its own arguments.
pub struct CommandContext {
    pub root: PathBuf,
    pub config: Config,
    pub json: bool,
}
