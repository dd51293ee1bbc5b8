//! Bounded pool of long-lived worker processes

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::ExecutionError;
use crate::worker::{WorkerEvent, WorkerProcess, WorkerSpawnConfig};

/// Pool of reusable worker processes.
///
/// [`acquire`](Self::acquire) hands out exclusive ownership of a handle;
/// a worker comes back either through [`release`](Self::release)
/// (healthy) or is destroyed through [`reset`](Self::reset), with a
/// replacement spawned on next demand. The idle set is the only state
/// shared across concurrent tasks.
pub struct WorkerPool {
    spawn_config: WorkerSpawnConfig,
    concurrency: usize,
    idle: Mutex<Vec<WorkerProcess>>,
}

impl WorkerPool {
    pub fn new(spawn_config: WorkerSpawnConfig, concurrency: usize) -> Self {
        Self {
            spawn_config,
            concurrency,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Take an available worker, spawning a fresh process when none is
    /// idle.
    ///
    /// The external queue holds the concurrency discipline; the pool
    /// spawns unconditionally on first need.
    pub async fn acquire(&self) -> Result<WorkerProcess, ExecutionError> {
        if let Some(mut worker) = self.idle.lock().await.pop() {
            worker.set_busy(true);
            debug!(worker = %worker.id(), "reusing idle worker");
            return Ok(worker);
        }

        let mut worker = WorkerProcess::spawn(&self.spawn_config)?;
        worker.set_busy(true);
        Ok(worker)
    }

    /// Return a healthy worker to the idle set.
    pub async fn release(&self, mut worker: WorkerProcess) {
        worker.set_busy(false);
        let mut idle = self.idle.lock().await;
        idle.push(worker);
        if idle.len() > self.concurrency {
            warn!(
                idle = idle.len(),
                concurrency = self.concurrency,
                "idle workers exceed configured concurrency"
            );
        }
    }

    /// Kill a worker and drop it from rotation.
    ///
    /// A worker that failed once is not trusted for reuse; the next
    /// acquire spawns a fresh process.
    pub fn reset(&self, mut worker: WorkerProcess) {
        debug!(worker = %worker.id(), "resetting worker");
        worker.kill();
    }

    /// Ask a worker to stop on its own, without committing to a kill.
    ///
    /// The caller decides the grace window before a forced
    /// [`reset`](Self::reset).
    pub fn terminate(&self, worker: &mut WorkerProcess) {
        worker.terminate();
    }

    /// Gracefully stop every idle worker, killing stragglers after the
    /// grace window.
    pub async fn shutdown(&self, grace: Duration) {
        let workers = {
            let mut idle = self.idle.lock().await;
            std::mem::take(&mut *idle)
        };

        for mut worker in workers {
            worker.terminate();
            match timeout(grace, wait_for_exit(&mut worker)).await {
                Ok(true) => debug!(worker = %worker.id(), "worker stopped"),
                _ => {
                    warn!(worker = %worker.id(), "worker did not stop in time, killing");
                    worker.kill();
                }
            }
        }
        info!("worker pool shut down");
    }

    /// Number of workers currently idle.
    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }
}

async fn wait_for_exit(worker: &mut WorkerProcess) -> bool {
    while let Some(event) = worker.next_event().await {
        if matches!(event, WorkerEvent::Exited(_)) {
            return true;
        }
    }
    false
}
