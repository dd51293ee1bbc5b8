//! Worker process main loop
//!
//! Stdout carries protocol messages only; all logging goes to stderr,
//! where the coordinator captures it for the task window.

use std::sync::Arc;
use tracing::{debug, error, info};

use hydrator_ipc::{
    CoordinatorMessage, HydrationReply, IpcError, IpcTransport, MessageEnvelope, StdioTransport,
    WorkerFault, WorkerMessage, WORKER_PROCESS_FLAG,
};

use crate::hydrater::{HydrateFailure, Hydrater, HydrationContext};

/// Run the worker loop when the process was started in worker mode.
///
/// Checks argv for the worker flag; when present this call never
/// returns — the loop runs until shutdown and the process exits.
pub async fn run_if_worker(hydrater: Arc<dyn Hydrater>) {
    if std::env::args().any(|arg| arg == WORKER_PROCESS_FLAG) {
        let code = match worker_main(hydrater).await {
            Ok(()) => 0,
            Err(e) => {
                error!("worker loop failed: {}", e);
                1
            }
        };
        std::process::exit(code);
    }
}

/// Worker process entry point.
pub async fn worker_main(hydrater: Arc<dyn Hydrater>) -> Result<(), IpcError> {
    let worker_id = format!("hydration-worker-{}", std::process::id());
    info!(worker = %worker_id, "worker process starting");

    let mut worker = Worker::new(worker_id.clone(), hydrater);
    worker.send_ready().await?;
    worker.run().await?;

    info!(worker = %worker_id, "worker process shutting down");
    Ok(())
}

/// Worker-side loop: exactly one reply per request, clean exit on
/// shutdown or channel close.
pub struct Worker {
    worker_id: String,
    transport: StdioTransport,
    hydrater: Arc<dyn Hydrater>,
}

impl Worker {
    pub fn new(worker_id: String, hydrater: Arc<dyn Hydrater>) -> Self {
        Self {
            worker_id,
            transport: StdioTransport::new(),
            hydrater,
        }
    }

    /// Announce readiness to the coordinator.
    async fn send_ready(&mut self) -> Result<(), IpcError> {
        self.send(CoordinatorMessage::Ready {
            worker_id: self.worker_id.clone(),
        })
        .await
    }

    /// Main worker loop
    pub async fn run(&mut self) -> Result<(), IpcError> {
        loop {
            let envelope: MessageEnvelope<WorkerMessage> = match self.transport.receive().await {
                Ok(envelope) => envelope,
                Err(IpcError::ConnectionClosed) => {
                    debug!(worker = %self.worker_id, "coordinator closed the channel");
                    return Ok(());
                }
                Err(IpcError::Deserialization(e)) => {
                    let fault = WorkerFault::MessageParseError { error: e };
                    self.send(CoordinatorMessage::Fault {
                        correlation_id: None,
                        fault,
                    })
                    .await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match envelope.message {
                WorkerMessage::Hydrate {
                    request,
                    correlation_id,
                } => {
                    let reply = self.hydrate(request.into()).await;
                    self.send(CoordinatorMessage::HydrationResult {
                        correlation_id,
                        reply,
                    })
                    .await?;
                }
                WorkerMessage::Shutdown => {
                    info!(worker = %self.worker_id, "shutdown requested");
                    return Ok(());
                }
            }
        }
    }

    /// Run the user function and fold its result into the reply shape.
    async fn hydrate(&self, context: HydrationContext) -> HydrationReply {
        debug!(worker = %self.worker_id, file = %context.file_path, "hydrating");

        match self.hydrater.hydrate(context).await {
            Ok(changes) => HydrationReply::success(changes),
            Err(HydrateFailure::Unhydratable(e)) => HydrationReply::unhydratable(e.message),
            Err(HydrateFailure::Failed(e)) => HydrationReply::failed(e.to_string()),
        }
    }

    async fn send(&mut self, message: CoordinatorMessage) -> Result<(), IpcError> {
        self.transport.send(&MessageEnvelope::new(message)).await
    }
}
