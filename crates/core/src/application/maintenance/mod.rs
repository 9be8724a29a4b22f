// Maintenance Service
// Retention cleanup of completed jobs and scheduled DB upkeep

use crate::domain::{format_timestamp, JobType};
use crate::error::{AppError, Result};
use crate::port::{FileStorage, JobRepository, Maintenance, MaintenanceConfig, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::application::worker::ShutdownToken;

/// Jobs deleted per query round
pub const CLEANUP_BATCH_SIZE: i64 = 100;

/// Jobs listed by a dry run
pub const CLEANUP_SAMPLE_SIZE: i64 = 5;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// One job a cleanup would delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSample {
    pub job_id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub completed_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub days: i64,
    pub dry_run: bool,
    /// COMPLETED jobs older than the cutoff when the run started
    pub matched: i64,
    pub deleted: i64,
    pub files_deleted: i64,
    pub samples: Vec<CleanupSample>,
}

/// Retention cleanup over completed jobs and their stored files
pub struct MaintenanceService {
    maintenance: Arc<dyn Maintenance>,
    job_repo: Arc<dyn JobRepository>,
    storage: Arc<dyn FileStorage>,
    time_provider: Arc<dyn TimeProvider>,
}

impl MaintenanceService {
    pub fn new(
        maintenance: Arc<dyn Maintenance>,
        job_repo: Arc<dyn JobRepository>,
        storage: Arc<dyn FileStorage>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            maintenance,
            job_repo,
            storage,
            time_provider,
        }
    }

    pub fn maintenance(&self) -> &Arc<dyn Maintenance> {
        &self.maintenance
    }

    /// Delete COMPLETED jobs whose `completed_at` is older than `days` days.
    ///
    /// Stored files go first; a file that cannot be deleted is logged and the
    /// job is deleted anyway. `dry_run` only counts and samples.
    pub async fn cleanup_completed(&self, days: i64, dry_run: bool) -> Result<CleanupReport> {
        if days < 1 {
            return Err(AppError::Validation(
                "Days must be a positive number".to_string(),
            ));
        }

        let cutoff = days
            .checked_mul(DAY_MS)
            .and_then(|span| self.time_provider.now_millis().checked_sub(span))
            .ok_or_else(|| AppError::Validation(format!("Days out of range: {}", days)))?;
        let matched = self.maintenance.count_completed_before(cutoff).await?;
        let mut report = CleanupReport {
            days,
            dry_run,
            matched,
            ..Default::default()
        };

        if matched == 0 {
            info!(days, "No completed jobs found to cleanup");
            return Ok(report);
        }

        if dry_run {
            report.samples = self
                .maintenance
                .find_completed_before(cutoff, CLEANUP_SAMPLE_SIZE)
                .await?
                .into_iter()
                .map(|job| CleanupSample {
                    job_id: job.job_id,
                    job_type: job.job_type,
                    completed_at: job.completed_at.map(format_timestamp).unwrap_or_default(),
                })
                .collect();
            info!(matched, days, "Dry run: would delete completed jobs");
            return Ok(report);
        }

        info!(matched, days, "Cleaning up completed jobs");
        loop {
            let batch = self
                .maintenance
                .find_completed_before(cutoff, CLEANUP_BATCH_SIZE)
                .await?;
            let batch_len = batch.len() as i64;
            let mut progressed = false;

            for job in batch {
                if let Some(path) = job.file_path.as_deref() {
                    if self.delete_file(&job.job_id, path).await {
                        report.files_deleted += 1;
                    }
                }
                if self.job_repo.delete(&job).await? {
                    report.deleted += 1;
                    progressed = true;
                }
            }

            if batch_len < CLEANUP_BATCH_SIZE || !progressed {
                break;
            }
        }

        info!(deleted = report.deleted, files_deleted = report.files_deleted, "Cleanup finished");
        Ok(report)
    }

    /// True when a stored file was removed
    async fn delete_file(&self, job_id: &str, path: &str) -> bool {
        match self.storage.exists(path).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(job_id, path, error = %e, "Could not check file");
                return false;
            }
        }
        match self.storage.delete(path).await {
            Ok(()) => true,
            Err(e) => {
                warn!(job_id, path, error = %e, "Could not delete file");
                false
            }
        }
    }
}

/// Maintenance scheduler
///
/// Runs retention cleanup and VACUUM in the background
pub struct MaintenanceScheduler {
    service: Arc<MaintenanceService>,
    config: MaintenanceConfig,
    interval_hours: u64,
}

impl MaintenanceScheduler {
    pub fn new(service: Arc<MaintenanceService>, config: MaintenanceConfig, interval_hours: u64) -> Self {
        Self {
            service,
            config,
            interval_hours: interval_hours.max(1),
        }
    }

    /// Run maintenance loop until shutdown (the first pass runs immediately)
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_hours = self.interval_hours,
            retention_days = self.config.completed_job_retention_days,
            "Maintenance scheduler started"
        );

        let mut tick = interval(Duration::from_secs(self.interval_hours * 3600));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.run_now().await {
                        error!(error = %e, "Scheduled maintenance failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Maintenance scheduler stopped");
                    break;
                }
            }
        }
    }

    /// One maintenance pass: cleanup, then VACUUM if the DB is over the size limit
    pub async fn run_now(&self) -> Result<CleanupReport> {
        let report = self
            .service
            .cleanup_completed(self.config.completed_job_retention_days, false)
            .await?;

        let stats = self.service.maintenance().get_stats().await?;
        let reclaimed_mb = if stats.db_size_mb > self.config.max_db_size_mb {
            self.service.maintenance().vacuum().await?
        } else {
            0.0
        };

        info!(
            deleted_jobs = report.deleted,
            reclaimed_mb,
            db_size_mb = stats.db_size_mb,
            job_count = stats.job_count,
            "Maintenance completed"
        );
        Ok(report)
    }
}
