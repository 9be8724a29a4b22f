// SQLite Maintenance Implementation
use crate::job_repository::{map_sqlx_error, JobRow};
use async_trait::async_trait;
use datajob_core::domain::{DataJob, JobStatus};
use datajob_core::error::{AppError, Result};
use datajob_core::port::{Maintenance, MaintenanceStats};
use sqlx::SqlitePool;
use tracing::info;

/// SQLite maintenance implementation
pub struct SqliteMaintenance {
    pool: SqlitePool,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get DB file size in bytes
    async fn get_db_size(&self) -> Result<i64> {
        // Query database page count and page size
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page count: {}", e)))?;

        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page size: {}", e)))?;

        Ok(page_count * page_size)
    }
}

fn to_mb(bytes: i64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[async_trait]
impl Maintenance for SqliteMaintenance {
    async fn vacuum(&self) -> Result<f64> {
        info!("Running VACUUM to optimize database...");

        // Get size before VACUUM
        let size_before = to_mb(self.get_db_size().await?);

        // Run VACUUM (reclaims space and defragments)
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("VACUUM failed: {}", e)))?;

        // Get size after VACUUM
        let size_after = to_mb(self.get_db_size().await?);
        let reclaimed = (size_before - size_after).max(0.0);

        info!(
            size_before_mb = size_before,
            size_after_mb = size_after,
            reclaimed_mb = reclaimed,
            "VACUUM completed"
        );

        Ok(reclaimed)
    }

    async fn find_completed_before(&self, cutoff_millis: i64, limit: i64) -> Result<Vec<DataJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM data_processing_jobs
            WHERE status = ?
            AND completed_at IS NOT NULL
            AND completed_at < ?
            ORDER BY completed_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(JobStatus::Completed.as_str())
        .bind(cutoff_millis)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn count_completed_before(&self, cutoff_millis: i64) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM data_processing_jobs
            WHERE status = ?
            AND completed_at IS NOT NULL
            AND completed_at < ?
            "#,
        )
        .bind(JobStatus::Completed.as_str())
        .bind(cutoff_millis)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn get_stats(&self) -> Result<MaintenanceStats> {
        let db_size_bytes = self.get_db_size().await?;

        let counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM data_processing_jobs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to count jobs: {}", e)))?;

        let mut stats = MaintenanceStats {
            db_size_mb: to_mb(db_size_bytes),
            db_size_bytes,
            ..Default::default()
        };
        for (status, count) in counts {
            stats.job_count += count;
            match JobStatus::parse(&status) {
                Some(JobStatus::Pending) => stats.pending_count = count,
                Some(JobStatus::Processing) => stats.processing_count = count,
                Some(JobStatus::Completed) => stats.completed_count = count,
                Some(JobStatus::Failed) => stats.failed_count = count,
                None => {}
            }
        }

        Ok(stats)
    }
}
