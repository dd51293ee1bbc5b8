//! Domain-specific configuration modules

pub mod execution;
pub mod http;
pub mod logging;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main hydrator configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HydratorConfig {
    /// Task execution configuration
    #[serde(default)]
    pub execution: execution::ExecutionConfig,

    /// Callback HTTP client configuration
    #[serde(default)]
    pub http: http::HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl HydratorConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.execution.validate()?;
        self.http.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_requires_function_path() {
        // Everything defaults except the user function entry point.
        let config = HydratorConfig::default();
        assert!(config.validate_all().is_err());

        let mut config = HydratorConfig::default();
        config.execution.function_path = "hydraters/pdf".to_string();
        assert!(config.validate_all().is_ok());
    }
}
