// Job Service - single write path for Job Records after creation

use crate::domain::{
    DataJob, JobErrorEntry, JobPatch, JobStatus, NewDataJob, SystemErrorKind, UserId,
};
use crate::error::{AppError, Result};
use crate::port::{JobRepository, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Job Record as reported to callers, with derived fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: DataJob,
    pub progress_percentage: i64,
    pub download_url: Option<String>,
}

impl JobView {
    pub fn new(job: DataJob, public_base_url: &str) -> Self {
        Self {
            progress_percentage: job.progress_percentage(),
            download_url: job.download_url(public_base_url),
            job,
        }
    }
}

/// Orchestrates status transitions and result recording
pub struct DataJobService {
    repo: Arc<dyn JobRepository>,
    time_provider: Arc<dyn TimeProvider>,
    public_base_url: String,
}

impl DataJobService {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        time_provider: Arc<dyn TimeProvider>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            time_provider,
            public_base_url: public_base_url.into(),
        }
    }

    pub async fn create_job(&self, fields: NewDataJob) -> Result<DataJob> {
        let job = self.repo.create(fields).await?;
        info!(job_id = %job.job_id, job_type = %job.job_type, "Job created");
        Ok(job)
    }

    pub async fn update_job_status(&self, job: &DataJob, status: JobStatus) -> Result<DataJob> {
        let updated = self.repo.update_status(job, status).await?;
        info!(job_id = %updated.job_id, status = %updated.status, "Job status updated");
        Ok(updated)
    }

    /// Record final counters and errors.
    ///
    /// A non-terminal job moves to COMPLETED with `completed_at` stamped.
    /// A job already FAILED (or COMPLETED) keeps its status and `completed_at`.
    pub async fn update_job_results(
        &self,
        job: &DataJob,
        processed_rows: i64,
        success_count: i64,
        error_count: i64,
        errors: Option<Vec<JobErrorEntry>>,
    ) -> Result<DataJob> {
        let current = self.load(&job.job_id).await?;

        let mut patch = JobPatch {
            processed_rows: Some(processed_rows),
            success_count: Some(success_count),
            error_count: Some(error_count),
            errors,
            ..Default::default()
        };
        if !current.is_terminal() {
            patch.status = Some(JobStatus::Completed);
            patch.completed_at = Some(self.time_provider.now_millis());
        }

        let updated = self.repo.update(&current, patch).await?;
        if !updated.counters_consistent() {
            warn!(
                job_id = %updated.job_id,
                processed_rows,
                success_count,
                error_count,
                "Job counters exceed processed rows"
            );
        }
        info!(
            job_id = %updated.job_id,
            status = %updated.status,
            processed_rows,
            success_count,
            error_count,
            "Job results recorded"
        );
        Ok(updated)
    }

    /// Mark FAILED with a summary message
    pub async fn update_job_error(&self, job: &DataJob, message: &str) -> Result<DataJob> {
        let current = self.load(&job.job_id).await?;
        let patch = JobPatch {
            status: Some(JobStatus::Failed),
            error_message: Some(message.to_string()),
            completed_at: Some(self.time_provider.now_millis()),
            ..Default::default()
        };
        let updated = self.repo.update(&current, patch).await?;
        warn!(job_id = %updated.job_id, error = %message, "Job failed");
        Ok(updated)
    }

    /// Fail a job from outside its task (timeouts, panics, restarts).
    ///
    /// Appends a batch-level entry to the existing errors. Terminal jobs are returned unchanged.
    pub async fn record_system_failure(
        &self,
        job_id: &str,
        kind: SystemErrorKind,
        message: &str,
    ) -> Result<DataJob> {
        let current = self.load(job_id).await?;
        if current.is_terminal() {
            return Ok(current);
        }

        let mut errors = current.errors.clone().unwrap_or_default();
        errors.push(JobErrorEntry::system(
            kind,
            message,
            self.time_provider.now_millis(),
        ));

        let failed = self.update_job_error(&current, message).await?;
        self.update_job_results(
            &failed,
            current.processed_rows.unwrap_or(0),
            current.success_count.unwrap_or(0),
            current.error_count.unwrap_or(0) + 1,
            Some(errors),
        )
        .await
    }

    /// Record the produced file. Leaves `completed_at` alone.
    pub async fn update_job_file(
        &self,
        job: &DataJob,
        file_name: &str,
        file_path: &str,
    ) -> Result<DataJob> {
        let patch = JobPatch {
            file_name: Some(file_name.to_string()),
            file_path: Some(file_path.to_string()),
            ..Default::default()
        };
        self.repo.update(job, patch).await
    }

    /// Set `total_rows` before processing starts
    pub async fn update_total_rows(&self, job: &DataJob, total_rows: i64) -> Result<DataJob> {
        let patch = JobPatch {
            total_rows: Some(total_rows),
            ..Default::default()
        };
        self.repo.update(job, patch).await
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<DataJob>> {
        self.repo.find_by_id(id).await
    }

    pub async fn find_by_job_id(&self, job_id: &str) -> Result<Option<DataJob>> {
        self.repo.find_by_job_id(job_id).await
    }

    pub async fn get_by_user_id(&self, user_id: UserId) -> Result<Vec<DataJob>> {
        self.repo.get_by_user_id(user_id).await
    }

    pub async fn get_job_by_job_id(&self, job_id: &str) -> Result<Option<DataJob>> {
        self.repo.find_by_job_id(job_id).await
    }

    /// The user's jobs, newest first
    pub async fn get_user_jobs(&self, user_id: UserId) -> Result<Vec<DataJob>> {
        let mut jobs = self.repo.get_by_user_id(user_id).await?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }

    /// Status report for one job; unknown ids are `NotFound`
    pub async fn get_job_status(&self, job_id: &str) -> Result<JobView> {
        let job = self.load(job_id).await?;
        Ok(self.view(job))
    }

    pub async fn get_user_job_views(&self, user_id: UserId) -> Result<Vec<JobView>> {
        Ok(self
            .get_user_jobs(user_id)
            .await?
            .into_iter()
            .map(|job| self.view(job))
            .collect())
    }

    pub fn view(&self, job: DataJob) -> JobView {
        JobView::new(job, &self.public_base_url)
    }

    async fn load(&self, job_id: &str) -> Result<DataJob> {
        self.repo
            .find_by_job_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::service;
    use super::*;
    use crate::domain::JobType;

    fn import_job() -> NewDataJob {
        NewDataJob {
            job_type: Some(JobType::Import),
            entity_type: Some("User".to_string()),
            file_path: Some("imports/users.csv".to_string()),
            user_id: Some(7),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_job_generates_id_and_defaults_pending() {
        let (service, _, _) = service();
        let a = service.create_job(import_job()).await.unwrap();
        let b = service.create_job(import_job()).await.unwrap();

        assert_eq!(a.status, JobStatus::Pending);
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(
            service.find_by_job_id(&a.job_id).await.unwrap(),
            service.find_by_job_id(&a.job_id).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_update_job_status_stamps_timestamps() {
        let (service, _, _) = service();
        let job = service.create_job(import_job()).await.unwrap();

        let job = service.update_job_status(&job, JobStatus::Pending).await.unwrap();
        assert!(job.started_at.is_none() && job.completed_at.is_none());

        let job = service.update_job_status(&job, JobStatus::Processing).await.unwrap();
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_none());

        let job = service.update_job_status(&job, JobStatus::Completed).await.unwrap();
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_update_job_results_completes_processing_job() {
        let (service, _, _) = service();
        let job = service.create_job(import_job()).await.unwrap();
        let job = service.update_job_status(&job, JobStatus::Processing).await.unwrap();

        let job = service.update_job_results(&job, 4, 3, 1, None).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert_eq!(
            (job.processed_rows, job.success_count, job.error_count),
            (Some(4), Some(3), Some(1))
        );
    }

    /// Behaviour change: results recorded after an error no longer flip FAILED to COMPLETED
    #[tokio::test]
    async fn test_update_job_results_never_overwrites_failed() {
        let (service, _, _) = service();
        let job = service.create_job(import_job()).await.unwrap();
        let job = service.update_job_status(&job, JobStatus::Processing).await.unwrap();

        let failed = service.update_job_error(&job, "boom").await.unwrap();
        let failed_at = failed.completed_at;

        // Stale snapshot on purpose: the task still holds the PROCESSING copy
        let errors = vec![JobErrorEntry::system(SystemErrorKind::SystemError, "boom", 0)];
        let job = service
            .update_job_results(&job, 0, 0, 1, Some(errors))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
        assert_eq!(job.completed_at, failed_at);
        assert_eq!(job.error_count, Some(1));
    }

    /// Behaviour change: attaching a file does not stamp completed_at
    #[tokio::test]
    async fn test_update_job_file_leaves_completed_at_null() {
        let (service, _, _) = service();
        let job = service.create_job(import_job()).await.unwrap();
        let job = service.update_job_status(&job, JobStatus::Processing).await.unwrap();

        let job = service
            .update_job_file(&job, "user_export_x.xlsx", "exports/user_export_x.xlsx")
            .await
            .unwrap();

        assert_eq!(job.file_name.as_deref(), Some("user_export_x.xlsx"));
        assert!(job.completed_at.is_none());
        assert!(job.is_processing());
    }

    #[tokio::test]
    async fn test_record_system_failure_appends_entry_once() {
        let (service, _, _) = service();
        let job = service.create_job(import_job()).await.unwrap();
        let job = service.update_job_status(&job, JobStatus::Processing).await.unwrap();

        let failed = service
            .record_system_failure(&job.job_id, SystemErrorKind::TimeoutError, "timed out")
            .await
            .unwrap();
        assert!(failed.is_failed());
        assert_eq!(failed.error_count, Some(1));

        // Already terminal: nothing changes
        let again = service
            .record_system_failure(&job.job_id, SystemErrorKind::WorkerError, "late")
            .await
            .unwrap();
        assert_eq!(again, failed);
    }

    #[tokio::test]
    async fn test_get_job_status_unknown_is_not_found() {
        let (service, _, _) = service();
        let err = service.get_job_status("missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_job_view_download_url_only_when_completed() {
        let (service, _, _) = service();
        let job = service.create_job(import_job()).await.unwrap();
        let job = service
            .update_job_file(&job, "users.xlsx", "exports/users.xlsx")
            .await
            .unwrap();

        let view = service.get_job_status(&job.job_id).await.unwrap();
        assert!(view.download_url.is_none());

        service.update_job_status(&job, JobStatus::Completed).await.unwrap();
        let view = service.get_job_status(&job.job_id).await.unwrap();
        assert_eq!(
            view.download_url.as_deref(),
            Some("http://127.0.0.1:9600/storage/exports/users.xlsx")
        );
    }

    #[tokio::test]
    async fn test_get_user_jobs_newest_first_and_scoped() {
        let (service, _, _) = service();
        let first = service.create_job(import_job()).await.unwrap();
        let second = service.create_job(import_job()).await.unwrap();
        service
            .create_job(NewDataJob {
                user_id: Some(99),
                ..import_job()
            })
            .await
            .unwrap();

        let views = service.get_user_job_views(7).await.unwrap();
        let ids: Vec<&str> = views.iter().map(|v| v.job.job_id.as_str()).collect();
        assert_eq!(ids, vec![second.job_id.as_str(), first.job_id.as_str()]);
    }
}
