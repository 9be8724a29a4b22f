// DB Maintenance port
use crate::domain::DataJob;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Database maintenance statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceStats {
    pub db_size_mb: f64,
    pub db_size_bytes: i64,
    pub job_count: i64,
    pub pending_count: i64,
    pub processing_count: i64,
    pub completed_count: i64,
    pub failed_count: i64,
}

/// Maintenance configuration
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Completed jobs older than this are purged (days)
    pub completed_job_retention_days: i64,

    /// Maximum DB size before forcing VACUUM (MB)
    pub max_db_size_mb: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            completed_job_retention_days: 30,
            max_db_size_mb: 500.0,
        }
    }
}

/// Database maintenance operations
#[async_trait]
pub trait Maintenance: Send + Sync {
    /// Run VACUUM to reclaim space and optimize DB
    ///
    /// # Returns
    /// Space reclaimed in MB
    async fn vacuum(&self) -> Result<f64>;

    /// COMPLETED jobs with `completed_at < cutoff_millis`, oldest first, at most `limit`
    async fn find_completed_before(&self, cutoff_millis: i64, limit: i64) -> Result<Vec<DataJob>>;

    /// Number of COMPLETED jobs with `completed_at < cutoff_millis`
    async fn count_completed_before(&self, cutoff_millis: i64) -> Result<i64>;

    /// Get maintenance statistics
    async fn get_stats(&self) -> Result<MaintenanceStats>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::JobStatus;
    use crate::port::JobRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Maintenance over the in-memory repository
    pub struct InMemoryMaintenance {
        repo: Arc<crate::port::job_repository::mocks::InMemoryJobRepository>,
        db_size_bytes: i64,
        vacuums: AtomicUsize,
    }

    impl InMemoryMaintenance {
        pub fn new(
            repo: Arc<crate::port::job_repository::mocks::InMemoryJobRepository>,
            db_size_bytes: i64,
        ) -> Self {
            Self {
                repo,
                db_size_bytes,
                vacuums: AtomicUsize::new(0),
            }
        }

        pub fn vacuum_count(&self) -> usize {
            self.vacuums.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Maintenance for InMemoryMaintenance {
        async fn vacuum(&self) -> Result<f64> {
            self.vacuums.fetch_add(1, Ordering::SeqCst);
            Ok(0.0)
        }

        async fn find_completed_before(
            &self,
            cutoff_millis: i64,
            limit: i64,
        ) -> Result<Vec<DataJob>> {
            let mut jobs: Vec<DataJob> = self
                .repo
                .get_by_status(JobStatus::Completed)
                .await?
                .into_iter()
                .filter(|j| j.completed_at.is_some_and(|t| t < cutoff_millis))
                .collect();
            jobs.sort_by_key(|j| j.completed_at);
            jobs.truncate(limit.max(0) as usize);
            Ok(jobs)
        }

        async fn count_completed_before(&self, cutoff_millis: i64) -> Result<i64> {
            Ok(self
                .find_completed_before(cutoff_millis, i64::MAX)
                .await?
                .len() as i64)
        }

        async fn get_stats(&self) -> Result<MaintenanceStats> {
            let jobs = self.repo.snapshot();
            let count = |s: JobStatus| jobs.iter().filter(|j| j.status == s).count() as i64;
            Ok(MaintenanceStats {
                db_size_mb: self.db_size_bytes as f64 / (1024.0 * 1024.0),
                db_size_bytes: self.db_size_bytes,
                job_count: jobs.len() as i64,
                pending_count: count(JobStatus::Pending),
                processing_count: count(JobStatus::Processing),
                completed_count: count(JobStatus::Completed),
                failed_count: count(JobStatus::Failed),
            })
        }
    }
}
