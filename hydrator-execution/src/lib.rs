//! Process-isolated hydration execution engine
//!
//! Runs user-supplied hydration logic in isolated worker processes under
//! a hard time budget and delivers each task's outcome to its callback
//! exactly once. The external queue drives concurrency; this crate
//! manages the worker pool, the per-task IPC exchange, the
//! reply/exit/timeout race and the escalating cancellation.

pub mod completion;
pub mod dispatcher;
pub mod error;
pub mod pool;
pub mod worker;

pub use completion::CompletionGuard;
pub use dispatcher::{DispatcherConfig, TaskDispatcher, TaskOutcome, TASK_TIMEOUT_MESSAGE};
pub use error::ExecutionError;
pub use pool::WorkerPool;
pub use worker::{WorkerEvent, WorkerProcess, WorkerSpawnConfig};
