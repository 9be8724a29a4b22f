// Crash recovery logic
use crate::application::job_service::DataJobService;
use crate::application::worker::constants::INTERRUPTED_MESSAGE;
use crate::domain::{JobStatus, SystemErrorKind};
use crate::port::{Dispatcher, JobRepository, TaskDescriptor};
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of one startup recovery pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub failed: usize,
    pub resubmitted: usize,
}

/// Crash recovery service
///
/// Runs once on daemon startup, before any task is queued. The daemon's worker
/// is the only owner of PROCESSING jobs, so every PROCESSING job found here was
/// abandoned by the previous run. PENDING jobs are re-queued because the
/// in-process queue does not survive a restart.
pub struct RecoveryService {
    job_repo: Arc<dyn JobRepository>,
    service: Arc<DataJobService>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl RecoveryService {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        service: Arc<DataJobService>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            job_repo,
            service,
            dispatcher,
        }
    }

    /// Recover orphaned jobs on daemon startup
    ///
    /// 1. PROCESSING jobs are marked FAILED with a `worker_error` entry
    /// 2. PENDING jobs are submitted again, oldest first
    pub async fn recover_orphaned_jobs(&self) -> crate::error::Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        info!("Starting orphaned job recovery");

        for job in self.job_repo.get_by_status(JobStatus::Processing).await? {
            info!(job_id = %job.job_id, started_at = ?job.started_at, "Failing orphaned job");
            self.service
                .record_system_failure(&job.job_id, SystemErrorKind::WorkerError, INTERRUPTED_MESSAGE)
                .await?;
            report.failed += 1;
        }

        let mut pending = self.job_repo.get_by_status(JobStatus::Pending).await?;
        pending.sort_by_key(|j| (j.created_at, j.id));
        for job in pending {
            match self
                .dispatcher
                .submit(TaskDescriptor::new(&job.job_id, job.job_type))
                .await
            {
                Ok(()) => report.resubmitted += 1,
                Err(e) => {
                    error!(job_id = %job.job_id, error = %e, "Could not resubmit pending job");
                }
            }
        }

        info!(
            failed = report.failed,
            resubmitted = report.resubmitted,
            "Orphaned job recovery complete"
        );
        Ok(report)
    }
}
