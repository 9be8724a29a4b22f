//! Export scenarios over SQLite + local storage

mod common;

use common::{Harness, BASE_URL};
use datajob_core::application::TaskHandler;
use datajob_core::domain::{DataJob, JobStatus, JobType, SortDirection, UserFilter, UserOrderBy};
use datajob_core::port::{FileStorage, Row};

async fn seed(h: &Harness) {
    h.seed_user("Alice", "alice@example.com", true, &["Admin"]).await;
    h.seed_user("Bob", "bob@example.com", false, &["User"]).await;
    h.seed_user("Carol", "carol@example.com", true, &["User", "Admin"]).await;
}

async fn export(h: &Harness, filter: UserFilter) -> DataJob {
    let job = h.submitter.submit_export(42, &filter).await.unwrap();
    let task = h.dispatcher.submitted().pop().unwrap();
    assert_eq!(task.job_type, JobType::Export);

    h.runner.handle(&task).await.unwrap();
    h.service.find_by_job_id(&job.job_id).await.unwrap().unwrap()
}

/// Data rows of a written export (footer lines only fill the first column)
async fn data_rows(h: &Harness, job: &DataJob) -> (Vec<Row>, Vec<String>) {
    let rows = h
        .storage
        .read_rows(job.file_path.as_deref().unwrap())
        .await
        .unwrap();
    let (data, rest): (Vec<Row>, Vec<Row>) =
        rows.into_iter().partition(|r| !r["Email"].is_empty());
    let footer = rest
        .into_iter()
        .map(|r| r["ID"].clone())
        .filter(|line| !line.is_empty())
        .collect();
    (data, footer)
}

#[tokio::test]
async fn test_filtered_export_produces_downloadable_file() {
    let h = Harness::new().await;
    seed(&h).await;

    let job = export(
        &h,
        UserFilter {
            is_active: Some(true),
            order_by: UserOrderBy::Name,
            order_direction: SortDirection::Asc,
            ..Default::default()
        },
    )
    .await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_rows, Some(1));
    assert_eq!(job.success_count, Some(1));
    assert_eq!(job.error_count, Some(0));
    assert_eq!(
        job.file_name.as_deref(),
        Some(format!("user_export_{}.xlsx", job.job_id).as_str())
    );
    assert!(h.stored(job.file_path.as_deref().unwrap()).is_file());

    let view = h.service.get_job_status(&job.job_id).await.unwrap();
    assert_eq!(view.progress_percentage, 100);
    assert_eq!(
        view.download_url,
        Some(format!("{}/storage/exports/user_export_{}.xlsx", BASE_URL, job.job_id))
    );

    let (rows, footer) = data_rows(&h, &job).await;
    let emails: Vec<&str> = rows.iter().map(|r| r["Email"].as_str()).collect();
    assert_eq!(emails, vec!["alice@example.com", "carol@example.com"]);
    assert_eq!(rows[0]["Status"], "Active");
    assert_eq!(rows[0]["Phone"], "N/A");
    assert_eq!(rows[0]["Roles"], "Admin");

    assert_eq!(footer[0], "Summary Statistics:");
    // Counts all users, not just the exported ones
    assert_eq!(footer[1], "Total Users: 3");
    assert!(footer[2].starts_with("User Export Generated on: "));
    assert!(footer[2].ends_with("(Status: Active)"));
}

#[tokio::test]
async fn test_role_and_search_filters() {
    let h = Harness::new().await;
    seed(&h).await;

    let job = export(
        &h,
        UserFilter {
            role_name: Some("User".to_string()),
            search: Some("bob".to_string()),
            ..Default::default()
        },
    )
    .await;

    assert_eq!(job.status, JobStatus::Completed);
    let stored = job.filters.clone().unwrap();
    assert_eq!(stored["role_name"], "User");
    assert_eq!(stored["search"], "bob");

    let (rows, _) = data_rows(&h, &job).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Name"], "Bob");
    assert_eq!(rows[0]["Status"], "Inactive");
}

#[tokio::test]
async fn test_empty_export_still_completes() {
    let h = Harness::new().await;

    let job = export(&h, UserFilter::default()).await;

    assert_eq!(job.status, JobStatus::Completed);
    let (rows, footer) = data_rows(&h, &job).await;
    assert!(rows.is_empty());
    assert_eq!(footer[1], "Total Users: 0");
}

#[tokio::test]
async fn test_user_job_listing_newest_first() {
    let h = Harness::new().await;
    let first = export(&h, UserFilter::default()).await;
    let second = export(&h, UserFilter::default()).await;

    let views = h.service.get_user_job_views(42).await.unwrap();
    let ids: Vec<&str> = views.iter().map(|v| v.job.job_id.as_str()).collect();
    assert_eq!(ids, vec![second.job_id.as_str(), first.job_id.as_str()]);
    assert!(views.iter().all(|v| v.download_url.is_some()));
    assert!(h.service.get_user_job_views(7).await.unwrap().is_empty());
}
