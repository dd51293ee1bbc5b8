//! Inter-process communication for the hydrator engine
//!
//! This crate provides the protocol and transport abstractions used for
//! communication between the coordinating dispatcher and the isolated
//! worker processes.

pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use error::IpcError;
pub use protocol::{
    CoordinatorMessage, HydrationReply, HydrationRequest, MessageEnvelope, ReplyError,
    RequestOptions, WorkerFault, WorkerMessage, IPC_PROTOCOL_VERSION, WORKER_PROCESS_FLAG,
};
pub use transport::{ChildProcessTransport, IpcTransport, StdioTransport};
