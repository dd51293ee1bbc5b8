//! Delivery error types

use thiserror::Error;

/// Errors raised while delivering a change-set to a callback endpoint.
///
/// None of these alter a task's classification; the dispatcher logs them
/// and moves on. Delivery is never retried inside the engine.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The endpoint could not be reached
    #[error("callback unreachable ({url}): {error}")]
    Network { url: String, error: String },

    /// The endpoint answered with a status outside the accepted set
    #[error("callback {url} rejected the update with status {status}")]
    Rejected { url: String, status: u16 },

    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    ClientConstruction(String),
}
