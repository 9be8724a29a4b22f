// Job Repository Port (Interface)

use crate::domain::{DataJob, JobPatch, JobStatus, JobType, NewDataJob, UserId};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Job Record persistence
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job. Generates `job_id` when absent, defaults status to PENDING.
    async fn create(&self, fields: NewDataJob) -> Result<DataJob>;

    /// Find job by surrogate ID
    async fn find_by_id(&self, id: i64) -> Result<Option<DataJob>>;

    /// Find job by external job ID
    async fn find_by_job_id(&self, job_id: &str) -> Result<Option<DataJob>>;

    /// Merge `patch` into the stored record and save it
    async fn update(&self, job: &DataJob, patch: JobPatch) -> Result<DataJob>;

    /// Set status with its timestamp side effects.
    ///
    /// Guarded by the stored status (compare-and-swap): a concurrent writer
    /// that moved the record first yields `AppError::Conflict`.
    async fn update_status(&self, job: &DataJob, status: JobStatus) -> Result<DataJob>;

    /// All jobs requested by a user
    async fn get_by_user_id(&self, user_id: UserId) -> Result<Vec<DataJob>>;

    async fn get_by_type(&self, job_type: JobType) -> Result<Vec<DataJob>>;

    async fn get_by_status(&self, status: JobStatus) -> Result<Vec<DataJob>>;

    /// Returns false when nothing was deleted
    async fn delete(&self, job: &DataJob) -> Result<bool>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use crate::port::{IdProvider, TimeProvider};
    use std::sync::{Arc, Mutex};

    /// In-memory JobRepository. Transitions are checked against the stored record.
    pub struct InMemoryJobRepository {
        jobs: Mutex<Vec<DataJob>>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl InMemoryJobRepository {
        pub fn new(id_provider: Arc<dyn IdProvider>, time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                jobs: Mutex::new(Vec::new()),
                id_provider,
                time_provider,
            }
        }

        pub fn snapshot(&self) -> Vec<DataJob> {
            self.jobs.lock().unwrap().clone()
        }

        fn filter(&self, pred: impl Fn(&DataJob) -> bool) -> Vec<DataJob> {
            self.jobs
                .lock()
                .unwrap()
                .iter()
                .filter(|j| pred(j))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl JobRepository for InMemoryJobRepository {
        async fn create(&self, fields: NewDataJob) -> Result<DataJob> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let id = jobs.len() as i64 + 1;
            let job = fields.into_job(id, self.id_provider.generate_id(), now)?;
            if jobs.iter().any(|j| j.job_id == job.job_id) {
                return Err(AppError::Conflict(format!(
                    "Job {} already exists",
                    job.job_id
                )));
            }
            jobs.push(job.clone());
            Ok(job)
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<DataJob>> {
            Ok(self.filter(|j| j.id == id).into_iter().next())
        }

        async fn find_by_job_id(&self, job_id: &str) -> Result<Option<DataJob>> {
            Ok(self.filter(|j| j.job_id == job_id).into_iter().next())
        }

        async fn update(&self, job: &DataJob, patch: JobPatch) -> Result<DataJob> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let stored = jobs
                .iter_mut()
                .find(|j| j.job_id == job.job_id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job.job_id)))?;
            patch.merge_into(stored, now)?;
            Ok(stored.clone())
        }

        async fn update_status(&self, job: &DataJob, status: JobStatus) -> Result<DataJob> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let stored = jobs
                .iter_mut()
                .find(|j| j.job_id == job.job_id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job.job_id)))?;
            stored.apply_status(status, now).map_err(|e| {
                AppError::InvalidState(format!("Cannot update job {}: {}", job.job_id, e))
            })?;
            Ok(stored.clone())
        }

        async fn get_by_user_id(&self, user_id: UserId) -> Result<Vec<DataJob>> {
            Ok(self.filter(|j| j.user_id == Some(user_id)))
        }

        async fn get_by_type(&self, job_type: JobType) -> Result<Vec<DataJob>> {
            Ok(self.filter(|j| j.job_type == job_type))
        }

        async fn get_by_status(&self, status: JobStatus) -> Result<Vec<DataJob>> {
            Ok(self.filter(|j| j.status == status))
        }

        async fn delete(&self, job: &DataJob) -> Result<bool> {
            let mut jobs = self.jobs.lock().unwrap();
            let before = jobs.len();
            jobs.retain(|j| j.job_id != job.job_id);
            Ok(jobs.len() < before)
        }
    }
}
