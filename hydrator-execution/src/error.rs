//! Execution error types

use thiserror::Error;

/// Engine-side failures for one task attempt.
///
/// Every variant is transient and retryable by the upstream queue.
/// Terminal hydration failures never surface here; they are rendered
/// into the change-set instead.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A worker process could not be started
    #[error("failed to spawn worker process: {0}")]
    Spawn(String),

    /// The worker process exited before delivering a reply
    #[error("worker process exited with code {code}")]
    WorkerExited { code: i32 },

    /// The worker process was killed by a signal
    #[error("worker process terminated by signal")]
    WorkerSignaled,

    /// Reading from or writing to the worker failed
    #[error("worker communication failed: {0}")]
    Communication(String),

    /// The user hydration logic reported a transient failure
    #[error("hydration failed: {0}")]
    Task(String),

    /// Protocol-level failure on the worker channel
    #[error("IPC error: {0}")]
    Ipc(#[from] hydrator_ipc::IpcError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_error_mentions_code() {
        let error = ExecutionError::WorkerExited { code: 1 };
        assert!(error.to_string().contains("code 1"));
    }
}
