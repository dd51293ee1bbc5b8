//! The seam for user-supplied hydration logic

use async_trait::async_trait;
use hydrator_core::{ChangeSet, DocumentSnapshot, HydrationError};
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

use hydrator_ipc::HydrationRequest;

/// Everything a hydration function may inspect for one task.
#[derive(Debug, Clone)]
pub struct HydrationContext {
    /// Entry point identifier the coordinator was configured with.
    pub function_path: String,

    /// Queue priority of the task.
    pub priority: i64,

    /// Location of the downloaded file.
    pub file_path: Url,

    /// Snapshot of the document as known at enqueue time.
    pub document: DocumentSnapshot,

    /// Full callback URI, for out-of-band delivery by the function itself.
    pub url_callback: Url,

    /// Scheme and host of the callback endpoint.
    pub api_url: String,

    /// Opaque configuration forwarded from the coordinator.
    pub config: JsonValue,
}

impl From<HydrationRequest> for HydrationContext {
    fn from(request: HydrationRequest) -> Self {
        Self {
            function_path: request.function_path,
            priority: request.priority,
            file_path: request.file_path,
            document: request.document,
            url_callback: request.options.url_callback,
            api_url: request.options.api_url,
            config: request.config,
        }
    }
}

/// Why a hydration attempt produced no usable change-set.
#[derive(Debug, Error)]
pub enum HydrateFailure {
    /// The file can never be hydrated; reported as data, never retried.
    #[error(transparent)]
    Unhydratable(#[from] HydrationError),

    /// Anything else; the attempt may be retried upstream.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// User-supplied hydration logic, invoked once per task.
///
/// `Ok(None)` defers the hydration deliberately: the document is left
/// untouched and the task is not considered failed.
#[async_trait]
pub trait Hydrater: Send + Sync {
    async fn hydrate(&self, context: HydrationContext) -> Result<Option<ChangeSet>, HydrateFailure>;
}
