//! Terminal hydration failure kind

use thiserror::Error;

/// Terminal "this file cannot be hydrated" error.
///
/// Distinct from every transient failure: a task ending in a
/// `HydrationError` is rendered into the change-set as data and is never
/// retried upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HydrationError {
    pub message: String,
}

impl HydrationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
