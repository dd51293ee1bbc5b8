//! End-to-end orchestration of one hydration task
//!
//! The dispatcher acquires a worker, sends the hydration request and
//! races three signal sources (worker reply, process exit, timeout) to
//! produce exactly one outcome, which is then sanitized, delivered to
//! the task callback and returned to the caller.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use hydrator_core::{ChangeSet, HydrationTask};
use hydrator_delivery::{CallbackClient, DeliveryError};
use hydrator_ipc::{HydrationReply, HydrationRequest, RequestOptions, WorkerMessage};

use crate::completion::CompletionGuard;
use crate::error::ExecutionError;
use crate::pool::WorkerPool;
use crate::worker::{WorkerEvent, WorkerProcess};

/// Change-set message recorded when a task exceeds its time budget.
pub const TASK_TIMEOUT_MESSAGE: &str = "Task took too long.";

/// Final `(error, changes)` pair reported back to the queue.
///
/// `error: None, changes: None` means the hydration was deliberately
/// deferred. A transient error may still carry the partial changes the
/// worker produced.
#[derive(Debug, Default)]
pub struct TaskOutcome {
    pub error: Option<ExecutionError>,
    pub changes: Option<ChangeSet>,
}

impl TaskOutcome {
    fn success(changes: Option<ChangeSet>) -> Self {
        Self {
            error: None,
            changes,
        }
    }

    fn failure(error: ExecutionError, changes: Option<ChangeSet>) -> Self {
        Self {
            error: Some(error),
            changes,
        }
    }
}

/// Settings for one dispatcher instance.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Entry point of the user hydration logic, forwarded over IPC.
    pub function_path: String,

    /// Opaque user configuration forwarded over IPC.
    pub function_config: serde_json::Value,

    /// Hard per-task execution budget.
    pub task_timeout: Duration,

    /// Wait between the graceful terminate and the forced kill.
    pub termination_grace: Duration,
}

impl DispatcherConfig {
    /// Dispatcher settings from the execution configuration.
    pub fn from_execution(config: &hydrator_config::ExecutionConfig) -> Self {
        Self {
            function_path: config.function_path.clone(),
            function_config: config.function_config.clone(),
            task_timeout: config.task_timeout,
            termination_grace: config.termination_grace,
        }
    }
}

/// What to do with the worker once the task has been decided.
#[derive(Debug, Clone, Copy, PartialEq)]
enum WorkerDisposition {
    /// Healthy; back into the pool.
    Release,
    /// Failed or timed out; kill and replace on next demand.
    Reset,
}

/// Signal produced by the per-task race.
enum TaskSignal {
    Event(Option<WorkerEvent>),
    TimedOut,
}

/// Orchestrates one task end-to-end.
pub struct TaskDispatcher {
    pool: Arc<WorkerPool>,
    delivery: CallbackClient,
    config: DispatcherConfig,
}

impl TaskDispatcher {
    pub fn new(pool: Arc<WorkerPool>, delivery: CallbackClient, config: DispatcherConfig) -> Self {
        Self {
            pool,
            delivery,
            config,
        }
    }

    /// Execute one task to completion.
    ///
    /// Resolves exactly once with the task's `(error, changes)` pair;
    /// the resolution is the completion report to the external queue.
    pub async fn execute(&self, task: HydrationTask) -> TaskOutcome {
        info!(file = %task.file_path, "task started");

        let mut worker = match self.pool.acquire().await {
            Ok(worker) => worker,
            Err(e) => {
                return self.finish(&task, TaskOutcome::failure(e, None), None).await;
            }
        };

        let correlation_id = Uuid::new_v4();
        let request = self.build_request(&task);
        if let Err(e) = worker.send(WorkerMessage::Hydrate {
            request,
            correlation_id,
        }) {
            self.pool.reset(worker);
            return self.finish(&task, TaskOutcome::failure(e, None), None).await;
        }

        let guard = CompletionGuard::new();
        let (outcome, disposition) = self
            .await_outcome(&mut worker, correlation_id, &guard)
            .await;

        // Buffers are drained before the handle leaves this task, so the
        // flushed logs cover the complete execution window.
        let output = worker.take_output().await;

        match disposition {
            WorkerDisposition::Release => self.pool.release(worker).await,
            WorkerDisposition::Reset => self.pool.reset(worker),
        }

        self.finish(&task, outcome, Some(output)).await
    }

    /// Race the worker's signals against the timeout until one source
    /// settles the task.
    async fn await_outcome(
        &self,
        worker: &mut WorkerProcess,
        correlation_id: Uuid,
        guard: &CompletionGuard,
    ) -> (TaskOutcome, WorkerDisposition) {
        let deadline = sleep(self.config.task_timeout);
        tokio::pin!(deadline);

        loop {
            let signal = tokio::select! {
                event = worker.next_event() => TaskSignal::Event(event),
                _ = &mut deadline => TaskSignal::TimedOut,
            };

            match signal {
                TaskSignal::Event(Some(WorkerEvent::Ready { worker_id })) => {
                    debug!(worker = %worker_id, "worker ready");
                }
                TaskSignal::Event(Some(WorkerEvent::Reply {
                    correlation_id: reply_id,
                    reply,
                })) => {
                    if reply_id != correlation_id {
                        warn!(%reply_id, "discarding reply for an unknown task");
                        continue;
                    }
                    if guard.settle() {
                        let outcome = classify_reply(reply);
                        let disposition = match outcome.error {
                            Some(_) => WorkerDisposition::Reset,
                            None => WorkerDisposition::Release,
                        };
                        return (outcome, disposition);
                    }
                }
                TaskSignal::Event(Some(WorkerEvent::Fault { fault, .. })) => {
                    if guard.settle() {
                        return (
                            TaskOutcome::failure(
                                ExecutionError::Communication(fault.to_string()),
                                None,
                            ),
                            WorkerDisposition::Reset,
                        );
                    }
                }
                TaskSignal::Event(Some(WorkerEvent::Exited(status))) => {
                    if guard.settle() {
                        return (
                            TaskOutcome::failure(exit_error(status), None),
                            WorkerDisposition::Reset,
                        );
                    }
                }
                TaskSignal::Event(Some(WorkerEvent::IoFailed(reason))) => {
                    if guard.settle() {
                        return (
                            TaskOutcome::failure(ExecutionError::Communication(reason), None),
                            WorkerDisposition::Reset,
                        );
                    }
                }
                TaskSignal::Event(None) => {
                    if guard.settle() {
                        return (
                            TaskOutcome::failure(
                                ExecutionError::Communication(
                                    "worker event stream closed".to_string(),
                                ),
                                None,
                            ),
                            WorkerDisposition::Reset,
                        );
                    }
                }
                TaskSignal::TimedOut => {
                    if guard.settle() {
                        return (self.timeout_outcome(worker).await, WorkerDisposition::Reset);
                    }
                }
            }
        }
    }

    /// Escalating cancellation: graceful terminate, grace window, then
    /// the caller forces the reset.
    ///
    /// A timeout is reported as data, not as a job error: the task did
    /// produce an actionable outcome even though the worker didn't
    /// cooperate.
    async fn timeout_outcome(&self, worker: &mut WorkerProcess) -> TaskOutcome {
        warn!(
            worker = %worker.id(),
            timeout_ms = self.config.task_timeout.as_millis() as u64,
            "task timed out, terminating worker"
        );
        worker.terminate();
        sleep(self.config.termination_grace).await;
        TaskOutcome::success(Some(ChangeSet::hydration_failure(TASK_TIMEOUT_MESSAGE)))
    }

    fn build_request(&self, task: &HydrationTask) -> HydrationRequest {
        HydrationRequest {
            function_path: self.config.function_path.clone(),
            priority: task.priority,
            file_path: task.file_path.clone(),
            document: task.document.clone(),
            changes: ChangeSet::new(),
            options: RequestOptions::for_callback(&task.callback),
            config: self.config.function_config.clone(),
        }
    }

    /// Flush captured worker output, sanitize and deliver, then hand the
    /// outcome back to the queue.
    async fn finish(
        &self,
        task: &HydrationTask,
        outcome: TaskOutcome,
        output: Option<(String, String)>,
    ) -> TaskOutcome {
        if let Some((stdout, stderr)) = output {
            if !stdout.is_empty() {
                debug!(file = %task.file_path, "worker output:\n{}", stdout.trim_end());
            }
            if !stderr.is_empty() {
                warn!(file = %task.file_path, "worker stderr:\n{}", stderr.trim_end());
            }
        }

        let outcome = TaskOutcome {
            error: outcome.error,
            changes: outcome.changes.map(ChangeSet::sanitized),
        };

        if let Some(changes) = &outcome.changes {
            match self.delivery.deliver(&task.callback, changes).await {
                Ok(()) => debug!(callback = %task.callback, "change-set delivered"),
                Err(DeliveryError::Rejected { status, .. }) => {
                    warn!(callback = %task.callback, status, "callback rejected the update");
                }
                Err(e) => error!(callback = %task.callback, error = %e, "change-set delivery failed"),
            }
        } else if outcome.error.is_none() {
            debug!(file = %task.file_path, "hydration deferred, nothing to deliver");
        }

        if let Some(error) = &outcome.error {
            self.delivery
                .report_failure(&task.callback, &error.to_string())
                .await;
        }

        match &outcome.error {
            Some(error) => warn!(file = %task.file_path, %error, "task failed"),
            None => info!(file = %task.file_path, "task finished"),
        }
        outcome
    }
}

/// Decide the task outcome for a worker reply.
///
/// A terminal hydration error is rewritten into failure fields on the
/// change-set and never surfaces as a job failure.
fn classify_reply(reply: HydrationReply) -> TaskOutcome {
    match reply.error {
        None => TaskOutcome::success(reply.changes),
        Some(error) if error.is_terminal() => {
            TaskOutcome::success(Some(ChangeSet::hydration_failure(error.message())))
        }
        Some(error) => TaskOutcome::failure(
            ExecutionError::Task(error.message().to_string()),
            reply.changes,
        ),
    }
}

fn exit_error(status: std::process::ExitStatus) -> ExecutionError {
    match status.code() {
        Some(code) if code != 0 => ExecutionError::WorkerExited { code },
        Some(_) => ExecutionError::Communication("worker exited before replying".to_string()),
        None => ExecutionError::WorkerSignaled,
    }
}
