// Submission use cases - create a PENDING job and hand it to the dispatcher

use crate::application::job_service::DataJobService;
use crate::domain::{DataJob, JobType, NewDataJob, SystemErrorKind, UserFilter, UserId};
use crate::error::{AppError, Result};
use crate::port::{Dispatcher, FileStorage, IdProvider, TaskDescriptor};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Accepted upload extensions
pub const IMPORT_EXTENSIONS: &[&str] = &["xlsx", "xls", "csv"];

/// Maximum upload size (10 MiB)
pub const MAX_IMPORT_BYTES: u64 = 10 * 1024 * 1024;

pub const IMPORT_DIR: &str = "imports";

const ENTITY_TYPE: &str = "User";

pub struct JobSubmitter {
    service: Arc<DataJobService>,
    storage: Arc<dyn FileStorage>,
    dispatcher: Arc<dyn Dispatcher>,
    id_provider: Arc<dyn IdProvider>,
}

impl JobSubmitter {
    pub fn new(
        service: Arc<DataJobService>,
        storage: Arc<dyn FileStorage>,
        dispatcher: Arc<dyn Dispatcher>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            service,
            storage,
            dispatcher,
            id_provider,
        }
    }

    /// Store an uploaded file and queue its import
    pub async fn submit_import(
        &self,
        user_id: UserId,
        source_path: &Path,
        original_file_name: Option<String>,
    ) -> Result<DataJob> {
        let original_file_name = original_file_name.or_else(|| {
            source_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        });
        let extension = import_extension(original_file_name.as_deref(), source_path)?;

        let metadata = tokio::fs::metadata(source_path).await.map_err(|e| {
            AppError::Validation(format!(
                "The file {} could not be read: {}",
                source_path.display(),
                e
            ))
        })?;
        if !metadata.is_file() {
            return Err(AppError::Validation(format!(
                "{} is not a file",
                source_path.display()
            )));
        }
        if metadata.len() > MAX_IMPORT_BYTES {
            return Err(AppError::Validation(format!(
                "The file must not be greater than {} kilobytes.",
                MAX_IMPORT_BYTES / 1024
            )));
        }

        let file_name = format!("{}.{}", self.id_provider.generate_id(), extension);
        let file_path = format!("{}/{}", IMPORT_DIR, file_name);
        let bytes = self.storage.store_from(source_path, &file_path).await?;

        let job = self
            .service
            .create_job(NewDataJob {
                job_type: Some(JobType::Import),
                entity_type: Some(ENTITY_TYPE.to_string()),
                file_name: Some(file_name),
                file_path: Some(file_path),
                original_file_name,
                user_id: Some(user_id),
                ..Default::default()
            })
            .await?;

        let job = self.dispatch(job).await?;
        info!(job_id = %job.job_id, user_id, bytes, "Import submitted");
        Ok(job)
    }

    /// Queue an export of the users matching `filter`
    pub async fn submit_export(&self, user_id: UserId, filter: &UserFilter) -> Result<DataJob> {
        let job = self
            .service
            .create_job(NewDataJob {
                job_type: Some(JobType::Export),
                entity_type: Some(ENTITY_TYPE.to_string()),
                filters: Some(filter.to_map()),
                user_id: Some(user_id),
                ..Default::default()
            })
            .await?;

        let job = self.dispatch(job).await?;
        info!(job_id = %job.job_id, user_id, "Export submitted");
        Ok(job)
    }

    /// Hand the job to the dispatcher. A refused job is failed and its upload removed.
    async fn dispatch(&self, job: DataJob) -> Result<DataJob> {
        let Err(e) = self
            .dispatcher
            .submit(TaskDescriptor::new(&job.job_id, job.job_type))
            .await
        else {
            return Ok(job);
        };

        warn!(job_id = %job.job_id, error = %e, "Dispatch refused");
        if let Some(path) = job.file_path.as_deref() {
            if let Err(de) = self.storage.delete(path).await {
                warn!(job_id = %job.job_id, file_path = path, error = %de, "Could not delete upload");
            }
        }
        let message = format!("Job could not be queued: {}", e);
        if let Err(fe) = self
            .service
            .record_system_failure(&job.job_id, SystemErrorKind::SystemError, &message)
            .await
        {
            error!(job_id = %job.job_id, error = %fe, "Could not mark job failed");
        }
        Err(e)
    }
}

fn import_extension(original_file_name: Option<&str>, source_path: &Path) -> Result<String> {
    let extension = original_file_name
        .and_then(|name| Path::new(name).extension())
        .or_else(|| source_path.extension())
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if IMPORT_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(AppError::Validation(format!(
            "The file must be a file of type: {}.",
            IMPORT_EXTENSIONS.join(", ")
        )))
    }
}
