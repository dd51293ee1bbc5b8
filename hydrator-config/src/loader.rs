//! Configuration loading and environment variable handling

use crate::domains::HydratorConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "HYDRATOR".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<HydratorConfig> {
        let content = std::fs::read_to_string(path)?;
        self.from_yaml_str(&content)
    }

    /// Load configuration from a YAML document with environment overrides
    pub fn from_yaml_str(&self, content: &str) -> ConfigResult<HydratorConfig> {
        let mut config: HydratorConfig = serde_yaml::from_str(content)?;
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<HydratorConfig> {
        let mut config = HydratorConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&self, config: &mut HydratorConfig) -> ConfigResult<()> {
        if let Some(value) = self.var("FUNCTION_PATH") {
            config.execution.function_path = value;
        }

        if let Some(value) = self.var("CONCURRENCY") {
            config.execution.concurrency = parse(&value, "CONCURRENCY")?;
        }

        if let Some(value) = self.var("TASK_TIMEOUT_MS") {
            config.execution.task_timeout =
                Duration::from_millis(parse(&value, "TASK_TIMEOUT_MS")?);
        }

        if let Some(value) = self.var("TERMINATION_GRACE_MS") {
            config.execution.termination_grace =
                Duration::from_millis(parse(&value, "TERMINATION_GRACE_MS")?);
        }

        if let Some(value) = self.var("LOG_LEVEL") {
            config.logging.level = value
                .parse()
                .map_err(|e: String| ConfigError::EnvError(e))?;
        }

        Ok(())
    }

    fn var(&self, name: &str) -> Option<String> {
        std::env::var(format!("{}_{}", self.prefix, name))
            .ok()
            .filter(|value| !value.is_empty())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse<T: FromStr>(value: &str, name: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ConfigError::EnvError(format!("invalid {}: {}", name, e)))
}
