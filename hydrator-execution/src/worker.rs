//! Worker process handles
//!
//! Each handle owns one OS-level process running the worker loop, with
//! newline-delimited JSON over the child's stdio. Raw (non-protocol)
//! stdout and stderr are captured into buffers for the surrounding task
//! window and flushed to logs by the dispatcher after finalization.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

use hydrator_ipc::{
    CoordinatorMessage, HydrationReply, MessageEnvelope, WorkerFault, WorkerMessage,
    WORKER_PROCESS_FLAG,
};

use crate::error::ExecutionError;

/// How worker processes are launched.
#[derive(Debug, Clone, Default)]
pub struct WorkerSpawnConfig {
    /// Program to execute; the current executable when unset.
    pub program: Option<PathBuf>,

    /// Arguments; the standard worker-mode flag when empty.
    pub args: Vec<String>,
}

impl WorkerSpawnConfig {
    /// Launch settings from the execution configuration.
    pub fn from_execution(config: &hydrator_config::ExecutionConfig) -> Self {
        Self {
            program: config.worker_program.clone(),
            args: config.worker_args.clone(),
        }
    }
}

/// Signals surfaced by a worker during one task window.
#[derive(Debug)]
pub enum WorkerEvent {
    /// The worker announced readiness
    Ready { worker_id: String },

    /// Reply for one hydration request
    Reply {
        correlation_id: Uuid,
        reply: HydrationReply,
    },

    /// Worker-side infrastructure fault
    Fault {
        correlation_id: Option<Uuid>,
        fault: WorkerFault,
    },

    /// The worker process exited
    Exited(std::process::ExitStatus),

    /// Reading or writing the worker's pipes failed
    IoFailed(String),
}

/// Handle to one isolated worker process.
///
/// Owned by the pool while idle; moved out to exactly one dispatcher for
/// the duration of a task.
#[derive(Debug)]
pub struct WorkerProcess {
    id: String,
    pid: Option<u32>,
    busy: bool,
    stdin_tx: Option<mpsc::UnboundedSender<WorkerMessage>>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    stdout_buf: Arc<Mutex<String>>,
    stderr_buf: Arc<Mutex<String>>,
}

impl WorkerProcess {
    /// Spawn a new isolated worker process.
    pub fn spawn(config: &WorkerSpawnConfig) -> Result<Self, ExecutionError> {
        let program = match &config.program {
            Some(path) => path.clone(),
            None => std::env::current_exe().map_err(|e| {
                ExecutionError::Spawn(format!("cannot resolve current executable: {}", e))
            })?,
        };
        let id = format!("worker-{}", Uuid::new_v4());

        let mut cmd = Command::new(&program);
        if config.args.is_empty() {
            cmd.arg(WORKER_PROCESS_FLAG);
        } else {
            cmd.args(&config.args);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecutionError::Spawn(format!("{}: {}", program.display(), e)))?;
        let pid = child.id();

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecutionError::Spawn("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::Spawn("worker stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::Spawn("worker stderr unavailable".to_string()))?;

        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));

        tokio::spawn(stdin_writer(id.clone(), stdin, stdin_rx, events_tx.clone()));
        tokio::spawn(stdout_reader(
            id.clone(),
            stdout,
            events_tx.clone(),
            stdout_buf.clone(),
        ));
        tokio::spawn(stderr_reader(stderr, stderr_buf.clone(), events_tx.clone()));
        tokio::spawn(exit_monitor(id.clone(), child, events_tx));

        debug!(worker = %id, pid, "spawned worker process");

        Ok(Self {
            id,
            pid,
            busy: false,
            stdin_tx: Some(stdin_tx),
            events: events_rx,
            stdout_buf,
            stderr_buf,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub(crate) fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Queue a message for the worker's stdin.
    pub fn send(&self, message: WorkerMessage) -> Result<(), ExecutionError> {
        match &self.stdin_tx {
            Some(tx) => tx
                .send(message)
                .map_err(|_| ExecutionError::Communication("worker stdin closed".to_string())),
            None => Err(ExecutionError::Communication(
                "worker stdin closed".to_string(),
            )),
        }
    }

    /// Next signal from the worker. `None` once every pipe task is gone.
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Request a graceful stop: shutdown message, closed stdin, SIGTERM.
    ///
    /// The caller owns the grace window before a forced
    /// [`kill`](Self::kill).
    pub fn terminate(&mut self) {
        let _ = self.send(WorkerMessage::Shutdown);
        self.stdin_tx = None;
        self.signal(StopKind::Graceful);
    }

    /// Force-stop the process immediately.
    pub fn kill(&mut self) {
        self.stdin_tx = None;
        self.signal(StopKind::Forced);
    }

    #[cfg(unix)]
    fn signal(&self, kind: StopKind) {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else { return };
        let signal = match kind {
            StopKind::Graceful => Signal::SIGTERM,
            StopKind::Forced => Signal::SIGKILL,
        };
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), signal) {
            debug!(worker = %self.id, %signal, "signal failed: {}", e);
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _kind: StopKind) {
        // Closing stdin asks the worker loop to stop; kill_on_drop covers
        // the forced case once the handle is dropped.
    }

    /// Drain the raw stdout/stderr captured so far.
    pub async fn take_output(&self) -> (String, String) {
        let mut out = self.stdout_buf.lock().await;
        let mut err = self.stderr_buf.lock().await;
        (std::mem::take(&mut *out), std::mem::take(&mut *err))
    }
}

#[derive(Clone, Copy)]
enum StopKind {
    Graceful,
    Forced,
}

async fn stdin_writer(
    worker_id: String,
    mut stdin: tokio::process::ChildStdin,
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    while let Some(message) = rx.recv().await {
        let envelope = MessageEnvelope::new(message);
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                let _ = events.send(WorkerEvent::IoFailed(format!("encode failed: {}", e)));
                break;
            }
        };

        let line = format!("{}\n", json);
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = written {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                // The exit monitor reports the death; nothing to add here.
                debug!(worker = %worker_id, "stdin closed");
            } else {
                let _ = events.send(WorkerEvent::IoFailed(format!("stdin write failed: {}", e)));
            }
            break;
        }
    }
}

async fn stdout_reader(
    worker_id: String,
    stdout: tokio::process::ChildStdout,
    events: mpsc::UnboundedSender<WorkerEvent>,
    raw: Arc<Mutex<String>>,
) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => match serde_json::from_str::<MessageEnvelope<CoordinatorMessage>>(
                line.trim_end(),
            ) {
                Ok(envelope) => {
                    if !envelope.is_compatible() {
                        let _ = events.send(WorkerEvent::IoFailed(format!(
                            "protocol version mismatch: {}",
                            envelope.protocol_version
                        )));
                        break;
                    }
                    let event = match envelope.message {
                        CoordinatorMessage::Ready { worker_id } => WorkerEvent::Ready { worker_id },
                        CoordinatorMessage::HydrationResult {
                            correlation_id,
                            reply,
                        } => WorkerEvent::Reply {
                            correlation_id,
                            reply,
                        },
                        CoordinatorMessage::Fault {
                            correlation_id,
                            fault,
                        } => WorkerEvent::Fault {
                            correlation_id,
                            fault,
                        },
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Err(_) => {
                    // Anything that is not a protocol message is task output.
                    let mut buffer = raw.lock().await;
                    buffer.push_str(&line);
                }
            },
            Err(e) => {
                let _ = events.send(WorkerEvent::IoFailed(format!("stdout read failed: {}", e)));
                break;
            }
        }
    }
    debug!(worker = %worker_id, "stdout closed");
}

// The unused sender keeps the event channel open until stderr is fully
// drained, so a closed channel means every buffer is complete.
async fn stderr_reader(
    stderr: tokio::process::ChildStderr,
    buf: Arc<Mutex<String>>,
    _events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut reader = BufReader::new(stderr);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let mut buffer = buf.lock().await;
                buffer.push_str(&line);
            }
        }
    }
}

async fn exit_monitor(
    worker_id: String,
    mut child: tokio::process::Child,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    match child.wait().await {
        Ok(status) => {
            debug!(worker = %worker_id, ?status, "worker exited");
            let _ = events.send(WorkerEvent::Exited(status));
        }
        Err(e) => {
            let _ = events.send(WorkerEvent::IoFailed(format!("wait failed: {}", e)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> WorkerSpawnConfig {
        WorkerSpawnConfig {
            program: Some("sh".into()),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[test]
    fn test_spawn_config_from_execution() {
        let execution = hydrator_config::ExecutionConfig {
            worker_program: Some("sh".into()),
            worker_args: vec!["-c".to_string(), "exit 0".to_string()],
            ..Default::default()
        };

        let config = WorkerSpawnConfig::from_execution(&execution);
        assert_eq!(config.program, Some("sh".into()));
        assert_eq!(config.args, vec!["-c", "exit 0"]);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_a_spawn_error() {
        let config = WorkerSpawnConfig {
            program: Some("/nonexistent/hydration-worker".into()),
            args: vec!["--x".to_string()],
        };
        let result = WorkerProcess::spawn(&config);
        assert!(matches!(result, Err(ExecutionError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_exit_is_reported_as_an_event() {
        let mut worker = WorkerProcess::spawn(&shell("exit 3")).unwrap();

        loop {
            match worker.next_event().await {
                Some(WorkerEvent::Exited(status)) => {
                    assert_eq!(status.code(), Some(3));
                    break;
                }
                Some(_) => continue,
                None => panic!("event stream ended without an exit event"),
            }
        }
    }

    #[tokio::test]
    async fn test_non_protocol_stdout_is_buffered() {
        let mut worker = WorkerProcess::spawn(&shell("echo hello; echo oops >&2")).unwrap();

        // Let the process finish, then close stdin so every pipe task
        // winds down; a closed event stream means complete buffers.
        loop {
            match worker.next_event().await {
                Some(WorkerEvent::Exited(_)) => break,
                Some(_) => continue,
                None => panic!("event stream ended without an exit event"),
            }
        }
        worker.kill();
        while worker.next_event().await.is_some() {}

        let (stdout, stderr) = worker.take_output().await;
        assert_eq!(stdout.trim(), "hello");
        assert_eq!(stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_kill_stops_a_long_running_worker() {
        let mut worker = WorkerProcess::spawn(&shell("sleep 30")).unwrap();
        worker.kill();

        loop {
            match worker.next_event().await {
                Some(WorkerEvent::Exited(status)) => {
                    assert!(!status.success());
                    break;
                }
                Some(_) => continue,
                None => panic!("event stream ended without an exit event"),
            }
        }
    }
}
