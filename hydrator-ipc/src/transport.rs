//! IPC transport implementations

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::IpcError;
use crate::protocol::{MessageEnvelope, IPC_PROTOCOL_VERSION};

/// IPC transport over newline-delimited JSON messages.
#[async_trait]
pub trait IpcTransport: Send + Sync {
    /// Send a message to the other end
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError>;

    /// Receive a message from the other end
    async fn receive<T: for<'de> Deserialize<'de> + Send>(
        &mut self,
    ) -> Result<MessageEnvelope<T>, IpcError>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), IpcError>;
}

fn encode<T: Serialize>(message: &MessageEnvelope<T>) -> Result<String, IpcError> {
    let json = serde_json::to_string(message)?;
    Ok(format!("{}\n", json))
}

fn decode<T: for<'de> Deserialize<'de>>(line: &str) -> Result<MessageEnvelope<T>, IpcError> {
    let envelope: MessageEnvelope<T> = serde_json::from_str(line.trim_end())?;
    if !envelope.is_compatible() {
        return Err(IpcError::ProtocolVersionMismatch {
            expected: IPC_PROTOCOL_VERSION,
            actual: envelope.protocol_version,
        });
    }
    Ok(envelope)
}

/// Stdin/stdout transport for the worker side of the channel.
pub struct StdioTransport {
    stdin: BufReader<tokio::io::Stdin>,
    stdout: tokio::io::Stdout,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            stdin: BufReader::new(tokio::io::stdin()),
            stdout: tokio::io::stdout(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IpcTransport for StdioTransport {
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError> {
        let line = encode(message)?;
        self.stdout.write_all(line.as_bytes()).await?;
        self.stdout.flush().await?;
        Ok(())
    }

    async fn receive<T: for<'de> Deserialize<'de> + Send>(
        &mut self,
    ) -> Result<MessageEnvelope<T>, IpcError> {
        let mut line = String::new();
        let read = self.stdin.read_line(&mut line).await?;
        if read == 0 {
            return Err(IpcError::ConnectionClosed);
        }
        decode(&line)
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        // Stdin/stdout don't need explicit closing
        Ok(())
    }
}

/// Parent-side transport over a child process's piped stdio.
pub struct ChildProcessTransport {
    stdin: Option<tokio::process::ChildStdin>,
    stdout: Option<BufReader<tokio::process::ChildStdout>>,
}

impl ChildProcessTransport {
    pub fn new(stdin: tokio::process::ChildStdin, stdout: tokio::process::ChildStdout) -> Self {
        Self {
            stdin: Some(stdin),
            stdout: Some(BufReader::new(stdout)),
        }
    }
}

#[async_trait]
impl IpcTransport for ChildProcessTransport {
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| IpcError::Io("stdin already closed".to_string()))?;

        let line = encode(message)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn receive<T: for<'de> Deserialize<'de> + Send>(
        &mut self,
    ) -> Result<MessageEnvelope<T>, IpcError> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| IpcError::Io("stdout already closed".to_string()))?;

        let mut line = String::new();
        let read = stdout.read_line(&mut line).await?;
        if read == 0 {
            return Err(IpcError::ConnectionClosed);
        }
        decode(&line)
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        // Take ownership and drop to close
        let _ = self.stdin.take();
        let _ = self.stdout.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WorkerMessage;

    #[test]
    fn test_encode_appends_newline() {
        let envelope = MessageEnvelope::new(WorkerMessage::Shutdown);
        let line = encode(&envelope).unwrap();
        assert!(line.ends_with('\n'));
        assert!(!line[..line.len() - 1].contains('\n'));
    }

    #[test]
    fn test_decode_round_trip() {
        let envelope = MessageEnvelope::new(WorkerMessage::Shutdown);
        let line = encode(&envelope).unwrap();

        let decoded: MessageEnvelope<WorkerMessage> = decode(&line).unwrap();
        assert!(matches!(decoded.message, WorkerMessage::Shutdown));
    }

    #[test]
    fn test_decode_rejects_incompatible_version() {
        let line = r#"{"protocol_version":99,"timestamp":"2024-01-01T00:00:00Z","message":{"type":"shutdown"}}"#;
        let result = decode::<WorkerMessage>(line);
        assert!(matches!(
            result,
            Err(IpcError::ProtocolVersionMismatch {
                expected: IPC_PROTOCOL_VERSION,
                actual: 99
            })
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = decode::<WorkerMessage>("not a protocol line");
        assert!(matches!(result, Err(IpcError::Deserialization(_))));
    }
}
