// Task Runner - resolves a task descriptor to its Job Record and runs it

use crate::application::export_task::ExportTask;
use crate::application::import_task::ImportTask;
use crate::application::job_service::DataJobService;
use crate::domain::JobType;
use crate::error::{AppError, Result};
use crate::port::TaskDescriptor;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Executes one dispatched task
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &TaskDescriptor) -> Result<()>;
}

pub struct TaskRunner {
    service: Arc<DataJobService>,
    import: ImportTask,
    export: ExportTask,
}

impl TaskRunner {
    pub fn new(service: Arc<DataJobService>, import: ImportTask, export: ExportTask) -> Self {
        Self {
            service,
            import,
            export,
        }
    }
}

#[async_trait]
impl TaskHandler for TaskRunner {
    /// Redelivered tasks for jobs that are terminal or already owned are no-ops
    async fn handle(&self, task: &TaskDescriptor) -> Result<()> {
        let job = self
            .service
            .find_by_job_id(&task.job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", task.job_id)))?;

        if job.is_terminal() {
            info!(job_id = %job.job_id, status = %job.status, "Job already finished, skipping task");
            return Ok(());
        }
        if job.is_processing() {
            info!(job_id = %job.job_id, "Job already processing, skipping task");
            return Ok(());
        }
        if job.job_type != task.job_type {
            warn!(
                job_id = %job.job_id,
                expected = %task.job_type,
                actual = %job.job_type,
                "Task type does not match job"
            );
            return Err(AppError::Validation(format!(
                "Task for job {} is {} but the job is {}",
                job.job_id, task.job_type, job.job_type
            )));
        }

        match job.job_type {
            JobType::Import => self.import.run(job).await.map(|_| ()),
            JobType::Export => self.export.run(job).await.map(|_| ()),
        }
    }
}
