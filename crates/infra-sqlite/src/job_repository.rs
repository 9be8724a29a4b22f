// SQLite JobRepository Implementation

use async_trait::async_trait;
use datajob_core::domain::{
    DataJob, JobErrorEntry, JobPatch, JobStatus, JobType, NewDataJob, UserId,
};
use datajob_core::error::{AppError, Result};
use datajob_core::port::{IdProvider, JobRepository, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            // Extract database-specific error code and message
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => {
                        // UNIQUE constraint failed
                        AppError::Conflict(format!(
                            "Unique constraint violation: {} ({})",
                            db_err.message(),
                            code_str
                        ))
                    }
                    "787" | "3850" => {
                        // FOREIGN KEY constraint failed
                        AppError::Database(format!(
                            "Foreign key constraint violation: {} ({})",
                            db_err.message(),
                            code_str
                        ))
                    }
                    "5" => {
                        // SQLITE_BUSY - database is locked
                        AppError::Database(format!(
                            "Database locked (SQLITE_BUSY): {}",
                            db_err.message()
                        ))
                    }
                    "13" => {
                        // SQLITE_FULL - database or disk is full
                        AppError::Database(format!("Database full: {}", db_err.message()))
                    }
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        // Connection, pool, protocol errors
        _ => AppError::Database(err.to_string()),
    }
}

pub struct SqliteJobRepository {
    pool: SqlitePool,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobRepository {
    pub fn new(
        pool: SqlitePool,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            pool,
            id_provider,
            time_provider,
        }
    }

    async fn fetch_required(&self, job_id: &str) -> Result<DataJob> {
        self.find_by_job_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }

    async fn fetch_where(&self, clause: &str, bind: BindValue<'_>) -> Result<Vec<DataJob>> {
        let sql = format!(
            "SELECT * FROM data_processing_jobs WHERE {} ORDER BY created_at DESC, id DESC",
            clause
        );
        let query = sqlx::query_as::<_, JobRow>(&sql);
        let query = match bind {
            BindValue::Int(v) => query.bind(v),
            BindValue::Text(v) => query.bind(v),
        };
        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Write every mutable column, guarded by the status the record had when read
    async fn save_guarded(&self, job: &DataJob, expected: JobStatus) -> Result<DataJob> {
        let filters = encode_json(&job.filters)?;
        let errors = encode_json(&job.errors)?;

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE data_processing_jobs
            SET status = ?, file_name = ?, file_path = ?, filters = ?,
                total_rows = ?, processed_rows = ?, success_count = ?, error_count = ?,
                errors = ?, error_message = ?,
                started_at = ?, completed_at = ?, updated_at = ?
            WHERE job_id = ? AND status = ?
            RETURNING *
            "#,
        )
        .bind(job.status.as_str())
        .bind(&job.file_name)
        .bind(&job.file_path)
        .bind(&filters)
        .bind(job.total_rows)
        .bind(job.processed_rows)
        .bind(job.success_count)
        .bind(job.error_count)
        .bind(&errors)
        .bind(&job.error_message)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .bind(&job.job_id)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => row.into_job(),
            None => Err(AppError::Conflict(format!(
                "Job {} changed concurrently (expected status {})",
                job.job_id, expected
            ))),
        }
    }
}

enum BindValue<'a> {
    Int(i64),
    Text(&'a str),
}

fn encode_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(AppError::from)
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn create(&self, fields: NewDataJob) -> Result<DataJob> {
        let now = self.time_provider.now_millis();
        let job = fields.into_job(0, self.id_provider.generate_id(), now)?;
        let filters = encode_json(&job.filters)?;

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO data_processing_jobs (
                job_id, type, status, entity_type, filters,
                file_name, file_path, original_file_name, user_id,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&job.job_id)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(&job.entity_type)
        .bind(&filters)
        .bind(&job.file_name)
        .bind(&job.file_path)
        .bind(&job.original_file_name)
        .bind(job.user_id)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.into_job()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<DataJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM data_processing_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn find_by_job_id(&self, job_id: &str) -> Result<Option<DataJob>> {
        let row =
            sqlx::query_as::<_, JobRow>("SELECT * FROM data_processing_jobs WHERE job_id = ?")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn update(&self, job: &DataJob, patch: JobPatch) -> Result<DataJob> {
        let mut stored = self.fetch_required(&job.job_id).await?;
        let expected = stored.status;
        patch.merge_into(&mut stored, self.time_provider.now_millis())?;
        self.save_guarded(&stored, expected).await
    }

    async fn update_status(&self, job: &DataJob, status: JobStatus) -> Result<DataJob> {
        let mut stored = self.fetch_required(&job.job_id).await?;
        let expected = stored.status;
        stored
            .apply_status(status, self.time_provider.now_millis())
            .map_err(|e| {
                AppError::InvalidState(format!("Cannot update job {}: {}", job.job_id, e))
            })?;
        if status == expected {
            return Ok(stored);
        }

        // Optimization: status transition touches only the status columns
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE data_processing_jobs
            SET status = ?, started_at = ?, completed_at = ?, updated_at = ?
            WHERE job_id = ? AND status = ?
            RETURNING *
            "#,
        )
        .bind(stored.status.as_str())
        .bind(stored.started_at)
        .bind(stored.completed_at)
        .bind(stored.updated_at)
        .bind(&stored.job_id)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => row.into_job(),
            None => Err(AppError::Conflict(format!(
                "Job {} left status {} before it could move to {}",
                job.job_id, expected, status
            ))),
        }
    }

    async fn get_by_user_id(&self, user_id: UserId) -> Result<Vec<DataJob>> {
        self.fetch_where("user_id = ?", BindValue::Int(user_id)).await
    }

    async fn get_by_type(&self, job_type: JobType) -> Result<Vec<DataJob>> {
        self.fetch_where("type = ?", BindValue::Text(job_type.as_str()))
            .await
    }

    async fn get_by_status(&self, status: JobStatus) -> Result<Vec<DataJob>> {
        self.fetch_where("status = ?", BindValue::Text(status.as_str()))
            .await
    }

    async fn delete(&self, job: &DataJob) -> Result<bool> {
        let result = sqlx::query("DELETE FROM data_processing_jobs WHERE job_id = ?")
            .bind(&job.job_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

// Helper struct for deserializing from DB
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobRow {
    id: i64,
    job_id: String,
    #[sqlx(rename = "type")]
    job_type: String,
    status: String,
    entity_type: Option<String>,
    filters: Option<String>,
    file_name: Option<String>,
    file_path: Option<String>,
    original_file_name: Option<String>,
    total_rows: Option<i64>,
    processed_rows: Option<i64>,
    success_count: Option<i64>,
    error_count: Option<i64>,
    errors: Option<String>,
    error_message: Option<String>,
    user_id: Option<i64>,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl JobRow {
    pub(crate) fn into_job(self) -> Result<DataJob> {
        let job_type = JobType::parse(&self.job_type).ok_or_else(|| {
            AppError::Database(format!("Unknown job type in row: {}", self.job_type))
        })?;
        let status = JobStatus::parse(&self.status).ok_or_else(|| {
            AppError::Database(format!("Unknown job status in row: {}", self.status))
        })?;
        let filters = self
            .filters
            .as_deref()
            .map(serde_json::from_str::<serde_json::Map<String, serde_json::Value>>)
            .transpose()?;
        let errors = self
            .errors
            .as_deref()
            .map(serde_json::from_str::<Vec<JobErrorEntry>>)
            .transpose()?;

        Ok(DataJob {
            id: self.id,
            job_id: self.job_id,
            job_type,
            status,
            entity_type: self.entity_type,
            filters,
            file_name: self.file_name,
            file_path: self.file_path,
            original_file_name: self.original_file_name,
            total_rows: self.total_rows,
            processed_rows: self.processed_rows,
            success_count: self.success_count,
            error_count: self.error_count,
            errors,
            error_message: self.error_message,
            user_id: self.user_id,
            started_at: self.started_at,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use datajob_core::domain::SystemErrorKind;
    use datajob_core::port::id_provider::UuidProvider;
    use datajob_core::port::time_provider::SystemTimeProvider;
    use std::collections::BTreeMap;

    async fn repo() -> SqliteJobRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteJobRepository::new(pool, Arc::new(UuidProvider), Arc::new(SystemTimeProvider))
    }

    fn import_fields() -> NewDataJob {
        NewDataJob {
            job_type: Some(JobType::Import),
            entity_type: Some("User".to_string()),
            file_path: Some("imports/a.csv".to_string()),
            user_id: Some(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let repo = repo().await;
        let job = repo.create(import_fields()).await.unwrap();

        assert!(job.id > 0);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.job_id.len(), 36);

        let by_id = repo.find_by_id(job.id).await.unwrap().unwrap();
        let by_job_id = repo.find_by_job_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(by_id, by_job_id);
        assert!(repo.find_by_job_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_job_id_conflicts() {
        let repo = repo().await;
        let fields = NewDataJob {
            job_id: Some("fixed".to_string()),
            ..import_fields()
        };
        repo.create(fields.clone()).await.unwrap();
        let err = repo.create(fields).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_status_timestamps_and_terminal_guard() {
        let repo = repo().await;
        let job = repo.create(import_fields()).await.unwrap();

        let job = repo.update_status(&job, JobStatus::Pending).await.unwrap();
        assert!(job.started_at.is_none() && job.completed_at.is_none());

        let job = repo.update_status(&job, JobStatus::Processing).await.unwrap();
        assert!(job.started_at.is_some());

        let job = repo.update_status(&job, JobStatus::Failed).await.unwrap();
        assert!(job.completed_at.is_some());

        let err = repo
            .update_status(&job, JobStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        let stored = repo.find_by_job_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(stored, job);
    }

    #[tokio::test]
    async fn test_update_merges_patch_and_json_columns() {
        let repo = repo().await;
        let job = repo.create(import_fields()).await.unwrap();

        let mut field_errors = BTreeMap::new();
        field_errors.insert("email".to_string(), vec!["taken".to_string()]);
        let errors = vec![
            JobErrorEntry::row(2, field_errors),
            JobErrorEntry::system(SystemErrorKind::FileError, "missing", 0),
        ];
        let updated = repo
            .update(
                &job,
                JobPatch {
                    processed_rows: Some(3),
                    errors: Some(errors.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.processed_rows, Some(3));
        assert_eq!(updated.errors, Some(errors));
        // Untouched fields survive
        assert_eq!(updated.file_path.as_deref(), Some("imports/a.csv"));
        assert_eq!(updated.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_list_queries_and_delete() {
        let repo = repo().await;
        let a = repo.create(import_fields()).await.unwrap();
        repo.create(NewDataJob {
            job_type: Some(JobType::Export),
            user_id: Some(6),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(repo.get_by_user_id(5).await.unwrap().len(), 1);
        assert_eq!(repo.get_by_type(JobType::Export).await.unwrap().len(), 1);
        assert_eq!(repo.get_by_status(JobStatus::Pending).await.unwrap().len(), 2);

        assert!(repo.delete(&a).await.unwrap());
        assert!(!repo.delete(&a).await.unwrap());
        assert!(repo.find_by_job_id(&a.job_id).await.unwrap().is_none());
    }
}
