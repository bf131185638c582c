use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No suites configured. Add at least one entry under `suites`")]
    NoSuites,

    #[error("Suite id cannot be empty")]
    EmptySuiteId,

    #[error("Duplicate suite id: {0}")]
    DuplicateSuiteId(String),

    #[error("Suite '{0}' command cannot be empty")]
    EmptySuiteCommand(String),

    #[error("fast_suite '{0}' does not name a configured suite")]
    UnknownFastSuite(String),

    #[error("Invalid suite_timeout_secs: {0}. Must be positive")]
    InvalidSuiteTimeout(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Fix proposer command cannot be empty. Set `proposer.command`")]
    MissingProposer,

    #[error("Invalid proposer timeout_secs: {0}. Must be positive")]
    InvalidProposerTimeout(u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the repository rooted at `root`
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. <root>/.mender/config.yaml (project config)
    /// 3. <root>/.mender/local.yaml (untracked local overrides)
    /// 4. Environment variables (MENDER_* prefix, `__` separates nested keys)
    pub fn load(root: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(root.join(".mender/config.yaml")))
            .merge(Yaml::file(root.join(".mender/local.yaml")))
            .merge(Env::prefixed("MENDER_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("MENDER_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// An empty suite list is accepted here; commands that run suites call
    /// [`ConfigLoader::require_suites`].
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for suite in &config.suites {
            if suite.id.trim().is_empty() {
                return Err(ConfigError::EmptySuiteId);
            }
            if !seen.insert(suite.id.as_str()) {
                return Err(ConfigError::DuplicateSuiteId(suite.id.clone()));
            }
            if suite.command.trim().is_empty() {
                return Err(ConfigError::EmptySuiteCommand(suite.id.clone()));
            }
        }

        if let Some(fast) = &config.fast_suite {
            if config.suite(fast).is_none() {
                return Err(ConfigError::UnknownFastSuite(fast.clone()));
            }
        }

        if config.suite_timeout_secs == 0 {
            return Err(ConfigError::InvalidSuiteTimeout(0));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }

    pub fn require_suites(config: &Config) -> Result<(), ConfigError> {
        if config.suites.is_empty() {
            return Err(ConfigError::NoSuites);
        }
        Ok(())
    }

    pub fn require_proposer(config: &Config) -> Result<(), ConfigError> {
        if config.proposer.command.trim().is_empty() {
            return Err(ConfigError::MissingProposer);
        }
        if config.proposer.timeout_secs == 0 {
            return Err(ConfigError::InvalidProposerTimeout(0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::SuiteConfig;
    use crate::domain::models::{ResultFormat, SuiteCost};
    use std::fs;

    fn suite(id: &str, command: &str) -> SuiteConfig {
        SuiteConfig {
            id: id.to_string(),
            command: command.to_string(),
            cost: SuiteCost::Cheap,
            format: ResultFormat::Auto,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.upstream_base, "origin/main");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
        assert!(matches!(
            ConfigLoader::require_suites(&config),
            Err(ConfigError::NoSuites)
        ));
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
max_attempts: 3
fast_suite: unit
suite_timeout_secs: 60
suites:
  - id: unit
    command: cargo test --lib
    cost: cheap
    format: cargo
  - id: integration
    command: cargo test --test '*'
proposer:
  command: ./propose
logging:
  level: debug
  format: json
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.suites.len(), 2);
        assert_eq!(config.suites[1].cost, SuiteCost::Expensive);
        assert_eq!(config.fast_suite_id(), Some("unit"));
        ConfigLoader::validate(&config).expect("Parsed config should be valid");
        ConfigLoader::require_proposer(&config).expect("proposer configured");
    }

    #[test]
    fn test_validate_duplicate_suite() {
        let config = Config {
            suites: vec![suite("unit", "a"), suite("unit", "b")],
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::DuplicateSuiteId(id)) if id == "unit"
        ));
    }

    #[test]
    fn test_validate_empty_command() {
        let config = Config {
            suites: vec![suite("unit", "  ")],
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptySuiteCommand(_))
        ));
    }

    #[test]
    fn test_validate_unknown_fast_suite() {
        let config = Config {
            fast_suite: Some("smoke".to_string()),
            suites: vec![suite("unit", "true")],
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::UnknownFastSuite(_))
        ));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = Config {
            suite_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidSuiteTimeout(0))
        ));
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogFormat(format)) => assert_eq!(format, "xml"),
            other => panic!("Expected InvalidLogFormat error, got {other:?}"),
        }
    }

    #[test]
    fn test_require_proposer() {
        let config = Config::default();
        assert!(matches!(
            ConfigLoader::require_proposer(&config),
            Err(ConfigError::MissingProposer)
        ));
    }

    #[test]
    fn test_load_merges_local_and_env() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".mender")).unwrap();
        fs::write(
            dir.path().join(".mender/config.yaml"),
            "max_attempts: 4\nsuites:\n  - id: unit\n    command: 'true'\n",
        )
        .unwrap();
        fs::write(dir.path().join(".mender/local.yaml"), "max_attempts: 7\n").unwrap();

        let config = temp_env::with_vars(
            [
                ("MENDER_SUITE_TIMEOUT_SECS", Some("42")),
                ("MENDER_LOGGING__LEVEL", Some("warn")),
            ],
            || ConfigLoader::load(dir.path()),
        )
        .unwrap();

        assert_eq!(config.max_attempts, 7);
        assert_eq!(config.suite_timeout_secs, 42);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.suites[0].id, "unit");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        fs::write(&path, "upstream_base: upstream/develop\n").unwrap();
        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.upstream_base, "upstream/develop");
    }
}
