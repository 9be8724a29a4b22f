//! RPC Method Handlers

use crate::error::{job_not_found, throttled, to_rpc_error};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::types::{
    CleanupRequest, ExportRequest, ImportRequest, JobStatusRequest, ListJobsRequest,
    StatsRequest, StatsResponse, SubmitResponse,
};
use datajob_core::application::{
    CleanupReport, DataJobService, JobSubmitter, JobView, MaintenanceService,
};
use datajob_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// RPC Handler with injected use cases
pub struct RpcHandler {
    service: Arc<DataJobService>,
    submitter: Arc<JobSubmitter>,
    maintenance: Arc<MaintenanceService>,
    rate_limiter: RateLimiter,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(
        service: Arc<DataJobService>,
        submitter: Arc<JobSubmitter>,
        maintenance: Arc<MaintenanceService>,
        rate_limit: RateLimitConfig,
    ) -> Self {
        Self {
            service,
            submitter,
            maintenance,
            rate_limiter: RateLimiter::new(rate_limit),
            start_time: Instant::now(),
        }
    }

    /// jobs.status.v1
    pub async fn job_status(&self, params: JobStatusRequest) -> Result<JobView, ErrorObjectOwned> {
        match self.service.get_job_status(&params.job_id).await {
            Ok(view) => Ok(view),
            Err(AppError::NotFound(_)) => Err(job_not_found(&params.job_id)),
            Err(e) => Err(to_rpc_error(e)),
        }
    }

    /// jobs.list.v1
    pub async fn list_jobs(&self, params: ListJobsRequest) -> Result<Vec<JobView>, ErrorObjectOwned> {
        self.service
            .get_user_job_views(params.user_id)
            .await
            .map_err(to_rpc_error)
    }

    /// users.import.v1
    pub async fn import_users(
        &self,
        params: ImportRequest,
    ) -> Result<SubmitResponse, ErrorObjectOwned> {
        if !self.rate_limiter.try_acquire() {
            return Err(throttled());
        }
        debug!(user_id = params.user_id, source = %params.source_path, "Import requested");

        let job = self
            .submitter
            .submit_import(
                params.user_id,
                Path::new(&params.source_path),
                params.original_file_name,
            )
            .await
            .map_err(to_rpc_error)?;
        Ok(job.into())
    }

    /// users.export.v1
    pub async fn export_users(
        &self,
        params: ExportRequest,
    ) -> Result<SubmitResponse, ErrorObjectOwned> {
        if !self.rate_limiter.try_acquire() {
            return Err(throttled());
        }

        let job = self
            .submitter
            .submit_export(params.user_id, &params.filter)
            .await
            .map_err(to_rpc_error)?;
        Ok(job.into())
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let stats = self
            .maintenance
            .maintenance()
            .get_stats()
            .await
            .map_err(to_rpc_error)?;

        Ok(StatsResponse {
            total_jobs: stats.job_count,
            pending_jobs: stats.pending_count,
            processing_jobs: stats.processing_count,
            completed_jobs: stats.completed_count,
            failed_jobs: stats.failed_count,
            db_size_bytes: stats.db_size_bytes,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }

    /// admin.cleanup.v1
    pub async fn cleanup(&self, params: CleanupRequest) -> Result<CleanupReport, ErrorObjectOwned> {
        self.maintenance
            .cleanup_completed(params.days, params.dry_run)
            .await
            .map_err(to_rpc_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;
    use datajob_core::domain::{JobStatus, UserFilter};
    use datajob_core::port::dispatcher::mocks::RecordingDispatcher;
    use datajob_core::port::file_storage::mocks::InMemoryFileStorage;
    use datajob_core::port::id_provider::mocks::SequentialIdProvider;
    use datajob_core::port::job_repository::mocks::InMemoryJobRepository;
    use datajob_core::port::maintenance::mocks::InMemoryMaintenance;
    use datajob_core::port::time_provider::mocks::SteppingClock;

    struct Fixture {
        handler: RpcHandler,
        dispatcher: Arc<RecordingDispatcher>,
    }

    fn fixture(rate_limit: RateLimitConfig) -> Fixture {
        let clock = Arc::new(SteppingClock::new(1_700_000_000_000, 1_000));
        let ids = Arc::new(SequentialIdProvider::new());
        let repo = Arc::new(InMemoryJobRepository::new(ids.clone(), clock.clone()));
        let storage = Arc::new(InMemoryFileStorage::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());

        let service = Arc::new(DataJobService::new(
            repo.clone(),
            clock.clone(),
            "http://localhost",
        ));
        let submitter = Arc::new(JobSubmitter::new(
            service.clone(),
            storage.clone(),
            dispatcher.clone(),
            ids,
        ));
        let maintenance = Arc::new(MaintenanceService::new(
            Arc::new(InMemoryMaintenance::new(repo.clone(), 4096)),
            repo,
            storage,
            clock,
        ));

        Fixture {
            handler: RpcHandler::new(service, submitter, maintenance, rate_limit),
            dispatcher,
        }
    }

    fn export_request() -> ExportRequest {
        ExportRequest {
            user_id: 1,
            filter: UserFilter::default(),
        }
    }

    #[tokio::test]
    async fn test_unknown_job_is_job_not_found() {
        let f = fixture(RateLimitConfig::default());
        let err = f
            .handler
            .job_status(JobStatusRequest {
                job_id: "missing".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::NOT_FOUND);
        assert_eq!(err.message(), "JOB_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_export_submission_is_visible_in_status_and_stats() {
        let f = fixture(RateLimitConfig::default());
        let submitted = f.handler.export_users(export_request()).await.unwrap();
        assert_eq!(submitted.status, JobStatus::Pending);
        assert_eq!(f.dispatcher.submitted().len(), 1);

        let view = f
            .handler
            .job_status(JobStatusRequest {
                job_id: submitted.job_id.clone(),
            })
            .await
            .unwrap();
        assert_eq!(view.job.job_id, submitted.job_id);
        assert_eq!(view.progress_percentage, 0);
        assert!(view.download_url.is_none());

        let listed = f
            .handler
            .list_jobs(ListJobsRequest { user_id: 1 })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        let stats = f.handler.stats(StatsRequest::default()).await.unwrap();
        assert_eq!(stats.total_jobs, 1);
        assert_eq!(stats.pending_jobs, 1);
    }

    #[tokio::test]
    async fn test_submissions_are_throttled() {
        let f = fixture(RateLimitConfig {
            burst: 1,
            per_second: 1,
        });
        f.handler.export_users(export_request()).await.unwrap();
        let err = f.handler.export_users(export_request()).await.unwrap_err();
        assert_eq!(err.code(), code::THROTTLED);
        assert_eq!(f.dispatcher.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_import_with_bad_extension_is_validation_error() {
        let f = fixture(RateLimitConfig::default());
        let err = f
            .handler
            .import_users(ImportRequest {
                user_id: 1,
                source_path: "/tmp/users.pdf".to_string(),
                original_file_name: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn test_cleanup_rejects_zero_days() {
        let f = fixture(RateLimitConfig::default());
        let err = f
            .handler
            .cleanup(CleanupRequest {
                days: 0,
                dry_run: true,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::VALIDATION_ERROR);
    }
}
