//! IPC protocol definitions and message types

use chrono::{DateTime, Utc};
use hydrator_core::{ChangeSet, DocumentSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use url::Url;
use uuid::Uuid;

/// IPC protocol version for compatibility checking
pub const IPC_PROTOCOL_VERSION: u32 = 1;

/// Argv flag a host binary is re-invoked with to run in worker mode.
pub const WORKER_PROCESS_FLAG: &str = "--hydration-worker";

/// Message envelope for all IPC communications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub protocol_version: u32,
    pub timestamp: DateTime<Utc>,
    pub message: T,
}

impl<T> MessageEnvelope<T> {
    /// Create a new message envelope
    pub fn new(message: T) -> Self {
        Self {
            protocol_version: IPC_PROTOCOL_VERSION,
            timestamp: Utc::now(),
            message,
        }
    }

    /// Check if protocol version is compatible
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == IPC_PROTOCOL_VERSION
    }
}

/// One hydration request, sent to a worker once per task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydrationRequest {
    /// Entry point of the user-supplied hydration logic.
    pub function_path: String,

    /// Queue priority, forwarded verbatim.
    pub priority: i64,

    /// Location of the downloaded file to hydrate.
    pub file_path: Url,

    /// Snapshot of the document as known at enqueue time.
    pub document: DocumentSnapshot,

    /// Seed change-set the user function fills in; always empty on send.
    pub changes: ChangeSet,

    /// Delivery endpoints for out-of-band use by the user function.
    pub options: RequestOptions,

    /// Opaque user configuration forwarded verbatim.
    pub config: JsonValue,
}

/// Callback endpoints handed to the user function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Full callback URI for the task.
    pub url_callback: Url,

    /// Scheme and host of the callback, for API-relative calls.
    pub api_url: String,
}

impl RequestOptions {
    /// Derive the option set for a task callback.
    pub fn for_callback(callback: &Url) -> Self {
        Self {
            url_callback: callback.clone(),
            api_url: api_base(callback),
        }
    }
}

/// Scheme and host portion of a callback URI.
fn api_base(callback: &Url) -> String {
    let mut base = format!(
        "{}://{}",
        callback.scheme(),
        callback.host_str().unwrap_or_default()
    );
    if let Some(port) = callback.port() {
        base.push(':');
        base.push_str(&port.to_string());
    }
    base
}

/// Messages sent from the dispatcher to worker processes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Run one hydration
    Hydrate {
        request: HydrationRequest,
        correlation_id: Uuid,
    },

    /// Shutdown signal
    Shutdown,
}

/// Messages sent from worker processes back to the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorMessage {
    /// Worker ready for work
    Ready { worker_id: String },

    /// Outcome of one hydration request
    HydrationResult {
        correlation_id: Uuid,
        reply: HydrationReply,
    },

    /// Worker-side infrastructure fault
    Fault {
        correlation_id: Option<Uuid>,
        fault: WorkerFault,
    },
}

/// Worker reply for one task: an optional error plus the proposed changes.
///
/// `changes: None` means the hydration was deliberately deferred; the
/// dispatcher treats it as a skip, not a failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HydrationReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeSet>,
}

impl HydrationReply {
    /// Reply for a completed attempt, with or without changes.
    pub fn success(changes: Option<ChangeSet>) -> Self {
        Self {
            error: None,
            changes,
        }
    }

    /// Reply for a terminal failure: the file cannot be hydrated.
    pub fn unhydratable(message: impl Into<String>) -> Self {
        Self {
            error: Some(ReplyError::Hydration {
                message: message.into(),
            }),
            changes: None,
        }
    }

    /// Reply for a transient failure; the attempt may be retried upstream.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(ReplyError::Task {
                message: message.into(),
            }),
            changes: None,
        }
    }
}

/// Error carried on a worker reply, classified at the protocol boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyError {
    /// Terminal: the file cannot be hydrated, do not retry.
    Hydration { message: String },

    /// Transient: the attempt failed for reasons unrelated to the file.
    Task { message: String },
}

impl ReplyError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplyError::Hydration { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            ReplyError::Hydration { message } | ReplyError::Task { message } => message,
        }
    }
}

/// Worker-side fault types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "fault_type", rename_all = "snake_case")]
pub enum WorkerFault {
    /// Worker initialization failed
    InitializationFailed { error: String },

    /// Communication error
    CommunicationError { error: String },

    /// Message parse error
    MessageParseError { error: String },
}

impl fmt::Display for WorkerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerFault::InitializationFailed { error } => {
                write!(f, "Worker initialization failed: {}", error)
            }
            WorkerFault::CommunicationError { error } => {
                write!(f, "Communication error: {}", error)
            }
            WorkerFault::MessageParseError { error } => {
                write!(f, "Message parse error: {}", error)
            }
        }
    }
}

impl std::error::Error for WorkerFault {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_base_derivation() {
        let callback = Url::parse("https://api.example.com/documents/42").unwrap();
        assert_eq!(api_base(&callback), "https://api.example.com");

        let with_port = Url::parse("http://localhost:8000/documents/42?x=1").unwrap();
        assert_eq!(api_base(&with_port), "http://localhost:8000");
    }

    #[test]
    fn test_request_options_carry_full_callback() {
        let callback = Url::parse("http://api.example.com/documents/42").unwrap();
        let options = RequestOptions::for_callback(&callback);

        assert_eq!(options.url_callback, callback);
        assert_eq!(options.api_url, "http://api.example.com");
    }

    #[test]
    fn test_reply_error_tagging() {
        let terminal = ReplyError::Hydration {
            message: "Corrupted file".to_string(),
        };
        assert!(terminal.is_terminal());
        assert_eq!(
            serde_json::to_value(&terminal).unwrap(),
            json!({"kind": "hydration", "message": "Corrupted file"})
        );

        let transient = ReplyError::Task {
            message: "disk full".to_string(),
        };
        assert!(!transient.is_terminal());
        assert_eq!(transient.message(), "disk full");
    }

    #[test]
    fn test_reply_with_absent_fields() {
        let reply: HydrationReply = serde_json::from_value(json!({})).unwrap();
        assert!(reply.error.is_none());
        assert!(reply.changes.is_none());

        let serialized = serde_json::to_value(HydrationReply::success(None)).unwrap();
        assert_eq!(serialized, json!({}));
    }

    #[test]
    fn test_message_envelope_round_trip() {
        let message = WorkerMessage::Shutdown;
        let envelope = MessageEnvelope::new(message);
        assert!(envelope.is_compatible());

        let json = serde_json::to_string(&envelope).unwrap();
        let deserialized: MessageEnvelope<WorkerMessage> = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.protocol_version, IPC_PROTOCOL_VERSION);
        assert!(matches!(deserialized.message, WorkerMessage::Shutdown));
    }

    #[test]
    fn test_hydration_result_wire_shape() {
        let correlation_id = Uuid::new_v4();
        let message = CoordinatorMessage::HydrationResult {
            correlation_id,
            reply: HydrationReply::unhydratable("Corrupted file"),
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "hydration_result");
        assert_eq!(value["reply"]["error"]["kind"], "hydration");
        assert!(value["reply"].get("changes").is_none());
    }
}
