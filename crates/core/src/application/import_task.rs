// Import Task - bulk user creation from an uploaded spreadsheet

use crate::application::job_service::DataJobService;
use crate::domain::{DataJob, JobErrorEntry, JobStatus, NewUser, SystemErrorKind};
use crate::error::{AppError, Result};
use crate::port::{FileStorage, Row, TimeProvider, UserDirectory};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use validator::Validate;

/// The only status cell value (trimmed, case-insensitive) that marks a user active
const ACTIVE_MARKER: &str = "active";

/// Per-row outcome aggregate for one import run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOutcome {
    pub processed_rows: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub errors: Vec<JobErrorEntry>,
}

enum RowResult {
    Created,
    Invalid(BTreeMap<String, Vec<String>>),
}

pub struct ImportTask {
    service: Arc<DataJobService>,
    storage: Arc<dyn FileStorage>,
    users: Arc<dyn UserDirectory>,
    time_provider: Arc<dyn TimeProvider>,
    default_password: String,
}

impl ImportTask {
    pub fn new(
        service: Arc<DataJobService>,
        storage: Arc<dyn FileStorage>,
        users: Arc<dyn UserDirectory>,
        time_provider: Arc<dyn TimeProvider>,
        default_password: impl Into<String>,
    ) -> Self {
        Self {
            service,
            storage,
            users,
            time_provider,
            default_password: default_password.into(),
        }
    }

    /// Run the import for `job`.
    ///
    /// A missing input file leaves the job FAILED and returns `Ok`. Any other
    /// batch-level error leaves the job FAILED and is returned to the caller.
    pub async fn run(&self, job: DataJob) -> Result<DataJob> {
        let job = self
            .service
            .update_job_status(&job, JobStatus::Processing)
            .await?;
        info!(job_id = %job.job_id, file_path = ?job.file_path, "Import started");

        let file_path = job.file_path.clone().unwrap_or_default();
        let mut outcome = ImportOutcome::default();
        let result = match self.input_present(&file_path).await {
            Ok(true) => self.process_file(&job, &file_path, &mut outcome).await,
            Ok(false) => return self.fail_missing_file(&job, &file_path).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(job) => Ok(job),
            Err(e) => {
                self.report_failure(&job, &outcome, &e).await;
                Err(e)
            }
        }
    }

    async fn input_present(&self, file_path: &str) -> Result<bool> {
        if file_path.is_empty() {
            return Ok(false);
        }
        self.storage.exists(file_path).await
    }

    async fn fail_missing_file(&self, job: &DataJob, file_path: &str) -> Result<DataJob> {
        let message = format!("Import file not found: {}", file_path);
        let entry = JobErrorEntry::system(
            SystemErrorKind::FileError,
            &message,
            self.time_provider.now_millis(),
        );
        self.service.update_job_error(job, &message).await?;
        self.service
            .update_job_results(job, 0, 0, 1, Some(vec![entry]))
            .await
    }

    async fn process_file(
        &self,
        job: &DataJob,
        file_path: &str,
        outcome: &mut ImportOutcome,
    ) -> Result<DataJob> {
        let rows = self.storage.read_rows(file_path).await?;
        let data_rows: Vec<(u32, &Row)> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !is_blank(row))
            .map(|(idx, row)| (idx as u32 + 1, row))
            .collect();

        let job = self
            .service
            .update_total_rows(job, data_rows.len() as i64)
            .await?;

        for (row_number, row) in data_rows {
            self.process_row(row_number, row, outcome).await;
        }

        let job = self
            .service
            .update_job_results(
                &job,
                outcome.processed_rows,
                outcome.success_count,
                outcome.error_count,
                Some(outcome.errors.clone()),
            )
            .await?;

        // Job is already terminal; a failed delete is logged only
        if let Err(e) = self.storage.delete(file_path).await {
            warn!(job_id = %job.job_id, file_path, error = %e, "Could not delete import file");
        }

        info!(
            job_id = %job.job_id,
            processed_rows = outcome.processed_rows,
            success_count = outcome.success_count,
            error_count = outcome.error_count,
            "Import finished"
        );
        Ok(job)
    }

    async fn process_row(&self, row_number: u32, row: &Row, outcome: &mut ImportOutcome) {
        outcome.processed_rows += 1;
        match self.import_row(row).await {
            Ok(RowResult::Created) => outcome.success_count += 1,
            Ok(RowResult::Invalid(errors)) => {
                debug!(row = row_number, ?errors, "Import row rejected");
                outcome.errors.push(JobErrorEntry::row(row_number, errors));
                outcome.error_count += 1;
            }
            Err(e) => {
                warn!(row = row_number, error = %e, "Import row failed");
                outcome
                    .errors
                    .push(JobErrorEntry::row_general(row_number, e.to_string()));
                outcome.error_count += 1;
            }
        }
    }

    async fn import_row(&self, row: &Row) -> Result<RowResult> {
        let candidate = build_candidate(row, &self.default_password);
        let errors = self.validate_candidate(&candidate).await?;
        if !errors.is_empty() {
            return Ok(RowResult::Invalid(errors));
        }

        let user = self.users.create(&candidate).await?;
        if !candidate.roles.is_empty() {
            self.users.assign_roles(&user, &candidate.roles).await?;
        }
        Ok(RowResult::Created)
    }

    /// Field -> messages for everything wrong with the candidate (empty when valid)
    async fn validate_candidate(&self, user: &NewUser) -> Result<BTreeMap<String, Vec<String>>> {
        let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();

        if let Err(failures) = user.validate() {
            for (field, field_errors) in failures.field_errors() {
                let messages = errors.entry(field.to_string()).or_default();
                for failure in field_errors.iter() {
                    messages.push(
                        failure
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("The {} field is invalid.", field)),
                    );
                }
            }
        }

        if user.email.is_empty() {
            errors.insert(
                "email".to_string(),
                vec!["The email field is required.".to_string()],
            );
        } else if !errors.contains_key("email") && self.users.email_exists(&user.email).await? {
            errors.insert(
                "email".to_string(),
                vec!["The email has already been taken.".to_string()],
            );
        }

        let missing = self.users.missing_roles(&user.roles).await?;
        for (idx, role) in user.roles.iter().enumerate() {
            if missing.contains(role) {
                let key = format!("roles.{}", idx);
                let message = format!("The selected {} is invalid.", key);
                errors.entry(key).or_default().push(message);
            }
        }

        Ok(errors)
    }

    /// Mark the job FAILED after a batch-level error. Reporting failures are logged only.
    async fn report_failure(&self, job: &DataJob, outcome: &ImportOutcome, cause: &AppError) {
        let message = cause.to_string();
        error!(job_id = %job.job_id, error = %message, "Import failed");

        let mut errors = outcome.errors.clone();
        errors.push(JobErrorEntry::system(
            SystemErrorKind::SystemError,
            &message,
            self.time_provider.now_millis(),
        ));

        if let Err(e) = self.service.update_job_error(job, &message).await {
            error!(job_id = %job.job_id, error = %e, "Could not mark import job failed");
        }
        if let Err(e) = self
            .service
            .update_job_results(
                job,
                outcome.processed_rows,
                outcome.success_count,
                outcome.error_count + 1,
                Some(errors),
            )
            .await
        {
            error!(job_id = %job.job_id, error = %e, "Could not record import results");
        }
    }
}

fn is_blank(row: &Row) -> bool {
    row.values().all(|v| v.trim().is_empty())
}

fn cell<'a>(row: &'a Row, header: &str) -> Option<&'a str> {
    row.get(header).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Build a candidate user from one row
pub fn build_candidate(row: &Row, default_password: &str) -> NewUser {
    NewUser {
        name: cell(row, "name").unwrap_or_default().to_string(),
        email: cell(row, "email").unwrap_or_default().to_string(),
        phone: cell(row, "phone").map(str::to_string),
        password: cell(row, "password").unwrap_or(default_password).to_string(),
        is_active: parse_status(cell(row, "status")),
        roles: parse_roles(cell(row, "roles")),
    }
}

/// Active when the cell is absent or reads "active". Any other value is inactive.
pub fn parse_status(status: Option<&str>) -> bool {
    match status {
        Some(s) => s.trim().eq_ignore_ascii_case(ACTIVE_MARKER),
        None => true,
    }
}

/// Comma separated role names, trimmed, empties dropped
pub fn parse_roles(roles: Option<&str>) -> Vec<String> {
    roles
        .map(|r| {
            r.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
