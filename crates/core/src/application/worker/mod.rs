// Worker - in-process dispatcher and task execution loop

pub mod constants;
mod shutdown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::job_service::DataJobService;
use crate::application::task_runner::TaskHandler;
use crate::domain::SystemErrorKind;
use crate::error::{AppError, Result};
use crate::port::{Dispatcher, TaskDescriptor};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// `Dispatcher` backed by a bounded in-process channel
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<TaskDescriptor>,
}

/// Receiving half drained by the [`Worker`]
pub struct TaskQueue {
    rx: mpsc::Receiver<TaskDescriptor>,
}

impl ChannelDispatcher {
    pub fn channel(capacity: usize) -> (Self, TaskQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, TaskQueue { rx })
    }
}

#[async_trait]
impl Dispatcher for ChannelDispatcher {
    async fn submit(&self, task: TaskDescriptor) -> Result<()> {
        self.tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(task) => {
                AppError::Internal(format!("Task queue is full, job {} not queued", task.job_id))
            }
            mpsc::error::TrySendError::Closed(task) => {
                AppError::Internal(format!("Worker stopped, job {} not queued", task.job_id))
            }
        })
    }
}

/// Worker runs queued tasks one at a time, each on its own tokio task
pub struct Worker {
    handler: Arc<dyn TaskHandler>,
    service: Arc<DataJobService>,
    task_timeout: Duration,
}

impl Worker {
    pub fn new(
        handler: Arc<dyn TaskHandler>,
        service: Arc<DataJobService>,
        task_timeout: Duration,
    ) -> Self {
        Self {
            handler,
            service,
            task_timeout,
        }
    }

    /// Run worker loop with graceful shutdown support.
    ///
    /// A task in flight when shutdown is signalled runs to completion.
    pub async fn run(&self, mut queue: TaskQueue, mut shutdown: ShutdownToken) -> Result<()> {
        info!(timeout_secs = self.task_timeout.as_secs(), "Worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            tokio::select! {
                next = queue.rx.recv() => match next {
                    Some(task) => self.process(task).await,
                    None => {
                        info!("Task queue closed");
                        break;
                    }
                },
                _ = shutdown.wait() => {
                    info!("Worker interrupted while idle");
                    break;
                }
            }
        }
        info!("Worker stopped");
        Ok(())
    }

    /// Execute one task with panic isolation and a time bound
    pub async fn process(&self, task: TaskDescriptor) {
        info!(job_id = %task.job_id, job_type = %task.job_type, "Processing task");

        let handler = Arc::clone(&self.handler);
        let descriptor = task.clone();
        let handle = tokio::task::spawn(async move { handler.handle(&descriptor).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.task_timeout, handle).await {
            Ok(Ok(Ok(()))) => info!(job_id = %task.job_id, "Task finished"),
            Ok(Ok(Err(e))) => {
                error!(job_id = %task.job_id, error = %e, "Task failed");
                // No-op when the task already left the job terminal
                self.fail(&task, SystemErrorKind::SystemError, &e.to_string())
                    .await;
            }
            Ok(Err(join_err)) => {
                let message = if join_err.is_panic() {
                    format!("Worker panicked while running job {}", task.job_id)
                } else {
                    format!("Task for job {} was cancelled", task.job_id)
                };
                error!(job_id = %task.job_id, error = ?join_err, "Task aborted");
                self.fail(&task, SystemErrorKind::WorkerError, &message).await;
            }
            Err(_) => {
                abort.abort();
                let message = format!(
                    "Job exceeded the {}s execution timeout",
                    self.task_timeout.as_secs()
                );
                warn!(job_id = %task.job_id, "Task timed out");
                self.fail(&task, SystemErrorKind::TimeoutError, &message).await;
            }
        }
    }

    async fn fail(&self, task: &TaskDescriptor, kind: SystemErrorKind, message: &str) {
        if let Err(e) = self
            .service
            .record_system_failure(&task.job_id, kind, message)
            .await
        {
            error!(job_id = %task.job_id, error = %e, "Could not mark job failed");
        }
    }
}
