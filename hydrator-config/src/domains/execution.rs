//! Task execution configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::time::Duration;

/// Task execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Entry point of the user-supplied hydration logic, forwarded to
    /// workers on every request.
    pub function_path: String,

    /// Opaque configuration forwarded verbatim to the hydration function.
    pub function_config: JsonValue,

    /// Maximum tasks in flight; the external queue enforces this bound.
    pub concurrency: usize,

    /// Hard per-task execution budget.
    #[serde(with = "crate::domains::utils::serde_duration_ms")]
    pub task_timeout: Duration,

    /// Wait between a graceful terminate and the forced kill.
    #[serde(with = "crate::domains::utils::serde_duration_ms")]
    pub termination_grace: Duration,

    /// Worker executable; the current binary when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_program: Option<PathBuf>,

    /// Worker argv; the standard worker-mode flag when empty.
    pub worker_args: Vec<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            function_path: String::new(),
            function_config: JsonValue::Null,
            concurrency: default_concurrency(),
            task_timeout: default_task_timeout(),
            termination_grace: default_termination_grace(),
            worker_program: None,
            worker_args: Vec::new(),
        }
    }
}

impl Validatable for ExecutionConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.function_path, "function_path", self.domain_name())?;

        validate_positive(self.concurrency, "concurrency", self.domain_name())?;

        validate_positive(
            self.task_timeout.as_millis(),
            "task_timeout",
            self.domain_name(),
        )?;

        validate_positive(
            self.termination_grace.as_millis(),
            "termination_grace",
            self.domain_name(),
        )?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "execution"
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_task_timeout() -> Duration {
    Duration::from_millis(60_000)
}

fn default_termination_grace() -> Duration {
    Duration::from_millis(500)
}
