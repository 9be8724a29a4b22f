// Data Processing Job Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Externally visible job identifier (UUID v4)
pub type JobId = String;

/// Owner of a job
pub type UserId = i64;

/// Kind of bulk operation a job tracks. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Import,
    Export,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Import => "import",
            JobType::Export => "export",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "import" => Some(JobType::Import),
            "export" => Some(JobType::Export),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job Status
///
/// ```text
/// PENDING -> PROCESSING -> COMPLETED
///                       -> FAILED
/// ```
/// COMPLETED and FAILED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is allowed. Same-status moves are accepted as no-ops.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            JobStatus::Pending => next != JobStatus::Pending,
            JobStatus::Processing => next.is_terminal(),
            JobStatus::Completed | JobStatus::Failed => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a batch-level failure entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemErrorKind {
    FileError,
    SystemError,
    ExportError,
    TimeoutError,
    WorkerError,
}

/// One entry of a job's `errors` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobErrorEntry {
    /// Validation or processing failure scoped to one input row (1-based)
    Row {
        row: u32,
        errors: BTreeMap<String, Vec<String>>,
    },
    /// Failure affecting the whole batch
    System {
        #[serde(rename = "type")]
        kind: SystemErrorKind,
        message: String,
        timestamp: String,
    },
}

impl JobErrorEntry {
    pub fn row(row: u32, errors: BTreeMap<String, Vec<String>>) -> Self {
        JobErrorEntry::Row { row, errors }
    }

    /// Row failure that is not tied to a particular field
    pub fn row_general(row: u32, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert("general".to_string(), vec![message.into()]);
        JobErrorEntry::Row { row, errors }
    }

    pub fn system(kind: SystemErrorKind, message: impl Into<String>, now_millis: i64) -> Self {
        JobErrorEntry::System {
            kind,
            message: message.into(),
            timestamp: format_timestamp(now_millis),
        }
    }

    pub fn is_row_level(&self) -> bool {
        matches!(self, JobErrorEntry::Row { .. })
    }
}

/// Format epoch ms as `YYYY-MM-DD HH:MM:SS` (UTC)
pub fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Job Record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataJob {
    pub id: i64,
    pub job_id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub entity_type: Option<String>,
    pub filters: Option<serde_json::Map<String, serde_json::Value>>,

    // Input (import) or generated output (export)
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub original_file_name: Option<String>,

    // Results
    pub total_rows: Option<i64>,
    pub processed_rows: Option<i64>,
    pub success_count: Option<i64>,
    pub error_count: Option<i64>,
    pub errors: Option<Vec<JobErrorEntry>>,
    pub error_message: Option<String>,

    pub user_id: Option<UserId>,

    // epoch ms
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DataJob {
    pub fn is_pending(&self) -> bool {
        self.status == JobStatus::Pending
    }

    pub fn is_processing(&self) -> bool {
        self.status == JobStatus::Processing
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Set status together with its timestamp side effects.
    ///
    /// PROCESSING stamps `started_at`, COMPLETED/FAILED stamp `completed_at`,
    /// PENDING touches neither. Same-status calls leave the record unchanged.
    pub fn apply_status(&mut self, next: JobStatus, now_millis: i64) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        if self.status == next {
            return Ok(());
        }

        self.status = next;
        match next {
            JobStatus::Processing => self.started_at = Some(now_millis),
            JobStatus::Completed | JobStatus::Failed => self.completed_at = Some(now_millis),
            JobStatus::Pending => {}
        }
        self.updated_at = now_millis;
        Ok(())
    }

    /// Percentage of `total_rows` processed, clamped to 100
    pub fn progress_percentage(&self) -> i64 {
        match (self.total_rows, self.processed_rows) {
            (Some(total), Some(processed)) if total > 0 => (processed * 100 / total).min(100),
            _ => 0,
        }
    }

    /// Public URL of the produced file, only for completed jobs that have one
    pub fn download_url(&self, public_base_url: &str) -> Option<String> {
        match (&self.file_path, self.is_completed()) {
            (Some(path), true) => Some(format!(
                "{}/storage/{}",
                public_base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )),
            _ => None,
        }
    }

    /// Check `success_count + error_count <= processed_rows` over row-level outcomes.
    ///
    /// Batch-level entries add one to `error_count` without a processed row,
    /// so they are subtracted before comparing.
    pub fn counters_consistent(&self) -> bool {
        let processed = self.processed_rows.unwrap_or(0);
        let success = self.success_count.unwrap_or(0);
        let system_errors = self
            .errors
            .as_ref()
            .map(|e| e.iter().filter(|entry| !entry.is_row_level()).count() as i64)
            .unwrap_or(0);
        let row_errors = (self.error_count.unwrap_or(0) - system_errors).max(0);
        success + row_errors <= processed
    }
}

/// Fields accepted when creating a job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDataJob {
    pub job_id: Option<JobId>,
    pub job_type: Option<JobType>,
    pub status: Option<JobStatus>,
    pub entity_type: Option<String>,
    pub filters: Option<serde_json::Map<String, serde_json::Value>>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub original_file_name: Option<String>,
    pub user_id: Option<UserId>,
}

impl NewDataJob {
    /// Materialize a record. `status` defaults to PENDING, `job_id` to `generated_job_id`.
    pub fn into_job(self, id: i64, generated_job_id: JobId, now_millis: i64) -> Result<DataJob> {
        let job_type = self
            .job_type
            .ok_or_else(|| DomainError::ValidationError("job type is required".to_string()))?;

        Ok(DataJob {
            id,
            job_id: self.job_id.unwrap_or(generated_job_id),
            job_type,
            status: self.status.unwrap_or(JobStatus::Pending),
            entity_type: self.entity_type,
            filters: self.filters,
            file_name: self.file_name,
            file_path: self.file_path,
            original_file_name: self.original_file_name,
            total_rows: None,
            processed_rows: None,
            success_count: None,
            error_count: None,
            errors: None,
            error_message: None,
            user_id: self.user_id,
            started_at: None,
            completed_at: None,
            created_at: now_millis,
            updated_at: now_millis,
        })
    }
}

/// Partial update: only `Some` fields overwrite the stored record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub total_rows: Option<i64>,
    pub processed_rows: Option<i64>,
    pub success_count: Option<i64>,
    pub error_count: Option<i64>,
    pub errors: Option<Vec<JobErrorEntry>>,
    pub error_message: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl JobPatch {
    /// Merge into `job`. Status changes go through [`DataJob::apply_status`] semantics
    /// for validity, but timestamps are taken from the patch as given.
    pub fn merge_into(self, job: &mut DataJob, now_millis: i64) -> Result<()> {
        if let Some(status) = self.status {
            if !job.status.can_transition_to(status) {
                return Err(DomainError::InvalidStateTransition {
                    from: job.status.to_string(),
                    to: status.to_string(),
                });
            }
            job.status = status;
        }
        if let Some(v) = self.file_name {
            job.file_name = Some(v);
        }
        if let Some(v) = self.file_path {
            job.file_path = Some(v);
        }
        if let Some(v) = self.total_rows {
            job.total_rows = Some(v);
        }
        if let Some(v) = self.processed_rows {
            job.processed_rows = Some(v);
        }
        if let Some(v) = self.success_count {
            job.success_count = Some(v);
        }
        if let Some(v) = self.error_count {
            job.error_count = Some(v);
        }
        if let Some(v) = self.errors {
            job.errors = Some(v);
        }
        if let Some(v) = self.error_message {
            job.error_message = Some(v);
        }
        if let Some(v) = self.started_at {
            job.started_at = Some(v);
        }
        if let Some(v) = self.completed_at {
            job.completed_at = Some(v);
        }
        job.updated_at = now_millis;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::pending_job;
    use super::*;

    #[test]
    fn test_processing_stamps_started_at() {
        let mut job = pending_job("a", JobType::Import);
        job.apply_status(JobStatus::Processing, 2000).unwrap();
        assert_eq!(job.started_at, Some(2000));
        assert_eq!(job.completed_at, None);
    }

    #[test]
    fn test_terminal_stamps_completed_at() {
        for terminal in [JobStatus::Completed, JobStatus::Failed] {
            let mut job = pending_job("a", JobType::Import);
            job.apply_status(JobStatus::Processing, 2000).unwrap();
            job.apply_status(terminal, 3000).unwrap();
            assert_eq!(job.completed_at, Some(3000));
            assert!(job.is_terminal());
        }
    }

    #[test]
    fn test_pending_leaves_timestamps() {
        let mut job = pending_job("a", JobType::Export);
        job.apply_status(JobStatus::Pending, 2000).unwrap();
        assert_eq!(job.started_at, None);
        assert_eq!(job.completed_at, None);
    }

    #[test]
    fn test_no_way_back_from_terminal() {
        let mut job = pending_job("a", JobType::Import);
        job.apply_status(JobStatus::Processing, 2000).unwrap();
        job.apply_status(JobStatus::Failed, 3000).unwrap();

        assert!(job.apply_status(JobStatus::Processing, 4000).is_err());
        assert!(job.apply_status(JobStatus::Pending, 4000).is_err());
        assert!(job.apply_status(JobStatus::Completed, 4000).is_err());
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.completed_at, Some(3000));
    }

    #[test]
    fn test_processing_cannot_go_back_to_pending() {
        let mut job = pending_job("a", JobType::Import);
        job.apply_status(JobStatus::Processing, 2000).unwrap();
        assert!(job.apply_status(JobStatus::Pending, 3000).is_err());
    }

    #[test]
    fn test_download_url_only_when_completed_with_file() {
        let mut job = pending_job("a", JobType::Export);
        job.file_path = Some("exports/user_export_a.xlsx".to_string());
        assert_eq!(job.download_url("http://host"), None);

        job.status = JobStatus::Completed;
        assert_eq!(
            job.download_url("http://host/").as_deref(),
            Some("http://host/storage/exports/user_export_a.xlsx")
        );

        job.file_path = None;
        assert_eq!(job.download_url("http://host"), None);
    }

    #[test]
    fn test_progress_percentage() {
        let mut job = pending_job("a", JobType::Import);
        assert_eq!(job.progress_percentage(), 0);

        job.total_rows = Some(4);
        job.processed_rows = Some(3);
        assert_eq!(job.progress_percentage(), 75);

        job.processed_rows = Some(9);
        assert_eq!(job.progress_percentage(), 100);
    }

    #[test]
    fn test_counters_ignore_system_entries() {
        let mut job = pending_job("a", JobType::Import);
        job.processed_rows = Some(0);
        job.success_count = Some(0);
        job.error_count = Some(1);
        job.errors = Some(vec![JobErrorEntry::system(
            SystemErrorKind::FileError,
            "missing",
            0,
        )]);
        assert!(job.counters_consistent());

        job.errors = Some(vec![JobErrorEntry::row_general(1, "boom")]);
        assert!(!job.counters_consistent());
    }

    #[test]
    fn test_error_entry_shapes() {
        let row = JobErrorEntry::row_general(4, "duplicate");
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["row"], 4);
        assert_eq!(json["errors"]["general"][0], "duplicate");

        let sys = JobErrorEntry::system(SystemErrorKind::FileError, "gone", 0);
        let json = serde_json::to_value(&sys).unwrap();
        assert_eq!(json["type"], "file_error");
        assert_eq!(json["timestamp"], "1970-01-01 00:00:00");

        let back: JobErrorEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, sys);
    }
}
