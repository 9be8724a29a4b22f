// Export Task - filtered user listing written to a spreadsheet

use crate::application::job_service::DataJobService;
use crate::domain::{
    format_timestamp, DataJob, JobErrorEntry, JobStatus, SystemErrorKind, UserFilter, UserRecord,
};
use crate::error::{AppError, Result};
use crate::port::{FileStorage, Spreadsheet, TimeProvider, UserDirectory};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const EXPORT_DIR: &str = "exports";

const HEADERS: [&str; 7] = ["ID", "Name", "Email", "Phone", "Status", "Roles", "Created At"];
const MISSING: &str = "N/A";

pub struct ExportTask {
    service: Arc<DataJobService>,
    storage: Arc<dyn FileStorage>,
    users: Arc<dyn UserDirectory>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ExportTask {
    pub fn new(
        service: Arc<DataJobService>,
        storage: Arc<dyn FileStorage>,
        users: Arc<dyn UserDirectory>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            service,
            storage,
            users,
            time_provider,
        }
    }

    /// Run the export for `job`. Errors leave the job FAILED and are returned.
    pub async fn run(&self, job: DataJob) -> Result<DataJob> {
        let job = self
            .service
            .update_job_status(&job, JobStatus::Processing)
            .await?;
        info!(job_id = %job.job_id, filters = ?job.filters, "Export started");

        let mut produced = None;
        match self.export(&job, &mut produced).await {
            Ok(job) => Ok(job),
            Err(e) => {
                self.report_failure(&job, produced.as_deref(), &e).await;
                Err(e)
            }
        }
    }

    /// `produced` receives the output path once the file is written
    async fn export(&self, job: &DataJob, produced: &mut Option<String>) -> Result<DataJob> {
        let filter = match &job.filters {
            Some(map) => UserFilter::from_map(map)?,
            None => UserFilter::default(),
        };

        let users = self.users.list_with_filters(&filter).await?;
        let total_users = self.users.count().await?;
        let sheet = self.build_sheet(&users, total_users, &filter);

        let file_name = format!("user_export_{}.xlsx", job.job_id);
        let file_path = format!("{}/{}", EXPORT_DIR, file_name);
        self.storage.write_spreadsheet(&file_path, &sheet).await?;
        *produced = Some(file_path.clone());

        let job = self
            .service
            .update_job_file(job, &file_name, &file_path)
            .await?;
        let job = self
            .service
            .update_job_results(&job, 1, 1, 0, Some(Vec::new()))
            .await?;
        let job = self
            .service
            .update_job_status(&job, JobStatus::Completed)
            .await?;

        info!(job_id = %job.job_id, rows = users.len(), file_path = %file_path, "Export finished");
        Ok(job)
    }

    fn build_sheet(&self, users: &[UserRecord], total_users: i64, filter: &UserFilter) -> Spreadsheet {
        let summary = filter.summary();
        let filter_text = if summary.is_empty() {
            String::new()
        } else {
            format!(" ({})", summary)
        };

        Spreadsheet {
            headers: HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: users.iter().map(user_row).collect(),
            footer: vec![
                "Summary Statistics:".to_string(),
                format!("Total Users: {}", total_users),
                format!(
                    "User Export Generated on: {}{}",
                    format_timestamp(self.time_provider.now_millis()),
                    filter_text
                ),
            ],
        }
    }

    /// Mark the job FAILED and remove any file it produced
    async fn report_failure(&self, job: &DataJob, produced: Option<&str>, cause: &AppError) {
        let message = cause.to_string();
        error!(job_id = %job.job_id, error = %message, "Export failed");

        if let Some(path) = produced {
            if let Err(e) = self.storage.delete(path).await {
                warn!(job_id = %job.job_id, file_path = path, error = %e, "Could not delete export file");
            }
        }
        let entry = JobErrorEntry::system(
            SystemErrorKind::ExportError,
            &message,
            self.time_provider.now_millis(),
        );
        if let Err(e) = self.service.update_job_error(job, &message).await {
            error!(job_id = %job.job_id, error = %e, "Could not mark export job failed");
        }
        if let Err(e) = self
            .service
            .update_job_results(job, 0, 0, 1, Some(vec![entry]))
            .await
        {
            error!(job_id = %job.job_id, error = %e, "Could not record export results");
        }
    }
}

fn or_missing(value: &str) -> String {
    if value.trim().is_empty() {
        MISSING.to_string()
    } else {
        value.to_string()
    }
}

fn user_row(user: &UserRecord) -> Vec<String> {
    let created_at = chrono::DateTime::from_timestamp_millis(user.created_at)
        .map(|dt| dt.format("%d-%m-%Y %H:%M:%S").to_string())
        .unwrap_or_else(|| MISSING.to_string());

    vec![
        user.id.to_string(),
        or_missing(&user.name),
        or_missing(&user.email),
        or_missing(user.phone.as_deref().unwrap_or_default()),
        if user.is_active { "Active" } else { "Inactive" }.to_string(),
        or_missing(&user.roles.join(", ")),
        created_at,
    ]
}
