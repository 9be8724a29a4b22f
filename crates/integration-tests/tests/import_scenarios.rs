//! Import scenarios over SQLite + local storage

mod common;

use common::Harness;
use datajob_core::application::TaskHandler;
use datajob_core::domain::{JobErrorEntry, JobStatus, JobType, SystemErrorKind, UserFilter};
use datajob_core::port::{FileStorage, Spreadsheet, UserDirectory};

fn row_errors(entry: &JobErrorEntry) -> (u32, Vec<String>) {
    match entry {
        JobErrorEntry::Row { row, errors } => (*row, errors.keys().cloned().collect()),
        other => panic!("expected row entry, got {:?}", other),
    }
}

/// Submit an upload and run the task the dispatcher received
async fn submit_and_run(h: &Harness, name: &str, contents: &str) -> datajob_core::domain::DataJob {
    let upload = h.upload(name, contents);
    let job = h
        .submitter
        .submit_import(1, &upload, Some(name.to_string()))
        .await
        .unwrap();
    let task = h.dispatcher.submitted().pop().unwrap();
    assert_eq!(task.job_id, job.job_id);
    assert_eq!(task.job_type, JobType::Import);

    h.runner.handle(&task).await.unwrap();
    h.service.find_by_job_id(&job.job_id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_mixed_rows_complete_with_row_errors() {
    let h = Harness::new().await;
    let csv = "name,email,phone,status,roles\n\
               Ann,ann@example.com,0100,active,\"Admin, User\"\n\
               Bob,not-an-email,,,\n\
               Ann Again,ann@example.com,,,\n\
               Cid,cid@example.com,,Inactive,Ghost\n";

    let job = submit_and_run(&h, "users.csv", csv).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_rows, Some(4));
    assert_eq!(job.processed_rows, Some(4));
    assert_eq!(job.success_count, Some(1));
    assert_eq!(job.error_count, Some(3));
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());

    let errors = job.errors.unwrap();
    assert_eq!(errors.len(), 3);
    assert_eq!(row_errors(&errors[0]), (2, vec!["email".to_string()]));
    assert_eq!(row_errors(&errors[1]), (3, vec!["email".to_string()]));
    assert_eq!(row_errors(&errors[2]), (4, vec!["roles.0".to_string()]));

    // The uploaded file is removed once processed
    assert!(!h.stored(job.file_path.as_deref().unwrap()).exists());

    let users = h.users.list_with_filters(&UserFilter::default()).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email, "ann@example.com");
    assert_eq!(users[0].phone.as_deref(), Some("0100"));
    assert!(users[0].is_active);
    let mut roles = users[0].roles.clone();
    roles.sort();
    assert_eq!(roles, vec!["Admin".to_string(), "User".to_string()]);
}

#[tokio::test]
async fn test_status_cell_and_blank_rows() {
    let h = Harness::new().await;
    let csv = "name,email,status\n\
               Dee,dee@example.com, INACTIVE \n\
               ,,\n\
               Eve,eve@example.com,\n";

    let job = submit_and_run(&h, "users.csv", csv).await;

    assert_eq!(job.status, JobStatus::Completed);
    // The blank row is skipped without being counted
    assert_eq!(job.total_rows, Some(2));
    assert_eq!(job.success_count, Some(2));
    assert_eq!(job.error_count, Some(0));

    let inactive = h
        .users
        .list_with_filters(&UserFilter {
            is_active: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].email, "dee@example.com");
}

#[tokio::test]
async fn test_xlsx_upload_is_read_by_header() {
    let h = Harness::new().await;
    // Produce a real workbook through the storage adapter, then upload it
    let sheet = Spreadsheet {
        headers: vec!["email".into(), "name".into(), "roles".into()],
        rows: vec![
            vec!["fay@example.com".into(), "Fay".into(), "User".into()],
            vec!["gus@example.com".into(), "Gus".into(), String::new()],
        ],
        footer: Vec::new(),
    };
    h.storage
        .write_spreadsheet("staging/users.xlsx", &sheet)
        .await
        .unwrap();
    let upload = h.stored("staging/users.xlsx");

    let job = h.submitter.submit_import(1, &upload, None).await.unwrap();
    assert_eq!(job.original_file_name.as_deref(), Some("users.xlsx"));
    assert!(job.file_name.as_deref().unwrap().ends_with(".xlsx"));

    let task = h.dispatcher.submitted().pop().unwrap();
    h.runner.handle(&task).await.unwrap();

    let job = h.service.find_by_job_id(&job.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.success_count, Some(2));
    assert_eq!(h.users.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_missing_file_fails_job() {
    let h = Harness::new().await;
    let upload = h.upload("users.csv", "name,email\nHal,hal@example.com\n");
    let job = h.submitter.submit_import(1, &upload, None).await.unwrap();

    // Input disappears before the worker gets to it
    h.storage.delete(job.file_path.as_deref().unwrap()).await.unwrap();

    let task = h.dispatcher.submitted().pop().unwrap();
    h.runner.handle(&task).await.unwrap();

    let job = h.service.find_by_job_id(&job.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().contains("not found"));
    assert_eq!(job.error_count, Some(1));
    match &job.errors.unwrap()[0] {
        JobErrorEntry::System { kind, .. } => assert_eq!(*kind, SystemErrorKind::FileError),
        other => panic!("expected system entry, got {:?}", other),
    }
    assert_eq!(h.users.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_redelivered_task_is_noop() {
    let h = Harness::new().await;
    let job = submit_and_run(&h, "users.csv", "name,email\nIvy,ivy@example.com\n").await;
    assert_eq!(job.status, JobStatus::Completed);

    // Same descriptor delivered again after completion
    let task = datajob_core::port::TaskDescriptor::new(&job.job_id, JobType::Import);
    h.runner.handle(&task).await.unwrap();

    let again = h.service.find_by_job_id(&job.job_id).await.unwrap().unwrap();
    assert_eq!(again, job);
    assert_eq!(h.users.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_rejected_uploads_create_no_job() {
    let h = Harness::new().await;
    let pdf = h.upload("users.pdf", "%PDF");
    assert!(h.submitter.submit_import(1, &pdf, None).await.is_err());

    let missing = h.dir.path().join("nope.csv");
    assert!(h.submitter.submit_import(1, &missing, None).await.is_err());

    assert!(h.dispatcher.submitted().is_empty());
    assert!(h.service.get_user_jobs(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_email_reported_on_its_row() {
    let h = Harness::new().await;
    let csv = "name,email\n\
               Jo,jo@example.com\n\
               Kai,kai@example.com\n\
               Lu,lu@example.com\n\
               Jo Two,jo@example.com\n";

    let job = submit_and_run(&h, "users.csv", csv).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.success_count, Some(3));
    assert_eq!(job.error_count, Some(1));
    let errors = job.errors.unwrap();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        JobErrorEntry::Row { row, errors } => {
            assert_eq!(*row, 4);
            assert_eq!(errors["email"], vec!["The email has already been taken.".to_string()]);
        }
        other => panic!("expected row entry, got {:?}", other),
    }
}
