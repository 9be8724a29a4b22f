//! JSON-RPC method parameters and results

use datajob_core::domain::{DataJob, JobStatus, UserFilter, UserId};
use serde::{Deserialize, Serialize};

/// jobs.status.v1
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusRequest {
    pub job_id: String,
}

/// jobs.list.v1
#[derive(Debug, Serialize, Deserialize)]
pub struct ListJobsRequest {
    pub user_id: UserId,
}

/// users.import.v1
#[derive(Debug, Serialize, Deserialize)]
pub struct ImportRequest {
    pub user_id: UserId,
    /// File readable by the daemon; copied into storage on submission
    pub source_path: String,
    #[serde(default)]
    pub original_file_name: Option<String>,
}

/// users.export.v1
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportRequest {
    pub user_id: UserId,
    #[serde(flatten)]
    pub filter: UserFilter,
}

/// Result of both submission methods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

impl From<DataJob> for SubmitResponse {
    fn from(job: DataJob) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
        }
    }
}

/// admin.stats.v1
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StatsRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_jobs: i64,
    pub pending_jobs: i64,
    pub processing_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub db_size_bytes: i64,
    pub uptime_seconds: i64,
}

/// admin.cleanup.v1
#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupRequest {
    #[serde(default = "default_days")]
    pub days: i64,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_days() -> i64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use datajob_core::domain::{SortDirection, UserOrderBy};
    use serde_json::json;

    #[test]
    fn test_export_request_flattens_filter() {
        let req: ExportRequest = serde_json::from_value(json!({
            "user_id": 7,
            "search": "john",
            "order_by": "email",
            "order_direction": "asc"
        }))
        .unwrap();

        assert_eq!(req.user_id, 7);
        assert_eq!(req.filter.search.as_deref(), Some("john"));
        assert_eq!(req.filter.order_by, UserOrderBy::Email);
        assert_eq!(req.filter.order_direction, SortDirection::Asc);
        assert_eq!(req.filter.is_active, None);
    }

    #[test]
    fn test_cleanup_request_defaults() {
        let req: CleanupRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req.days, 30);
        assert!(!req.dry_run);
    }
}
