//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::poll::PollTiming;

/// Polling defaults derived from environment variables and configuration
/// files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CONVERGE",
    discovery(
        app_name = "converge",
        env_var = "CONVERGE_CONFIG_PATH",
        config_file_name = "converge.toml",
        dotfile_name = ".converge.toml",
        project_file_name = "converge.toml"
    )
)]
pub struct PollConfig {
    /// Minimum number of seconds between two refreshes. Defaults to 10.
    #[ortho_config(default = 10)]
    pub min_interval_secs: u64,
    /// Overall number of seconds a wait may take. Defaults to 30 minutes.
    #[ortho_config(default = 1800)]
    pub timeout_secs: u64,
    /// Consecutive target observations required before success.
    #[ortho_config(default = 1)]
    pub continuous_target_occurrences: u32,
    /// Seconds to wait before the first refresh.
    #[ortho_config(default = 0)]
    pub delay_secs: u64,
    /// Optional limit on consecutive not-found observations while pending.
    pub not_found_checks: Option<u32>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl PollConfig {
    fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must be greater than zero: set {} or add {} to converge.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("converge")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and configuration key that control the offending value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_positive(
            self.timeout_secs,
            &FieldMetadata::new("wait timeout", "CONVERGE_TIMEOUT_SECS", "timeout_secs"),
        )?;
        Self::require_positive(
            u64::from(self.continuous_target_occurrences),
            &FieldMetadata::new(
                "continuous target occurrences",
                "CONVERGE_CONTINUOUS_TARGET_OCCURRENCES",
                "continuous_target_occurrences",
            ),
        )?;
        Ok(())
    }

    /// Projects the configuration into poller timing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when validation fails.
    pub fn timing(&self) -> Result<PollTiming, ConfigError> {
        self.validate()?;
        Ok(PollTiming {
            min_interval: Duration::from_secs(self.min_interval_secs),
            continuous_target_occurrences: self.continuous_target_occurrences,
            delay: Duration::from_secs(self.delay_secs),
            not_found_checks: self.not_found_checks,
        })
    }

    /// Overall time budget for a wait.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
