//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - Programmatic defaults
//! - `.mender/config.yaml` and `.mender/local.yaml`
//! - `MENDER_*` environment overrides
//! - Validation into typed errors

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
