//! Shared wiring for the end-to-end scenarios: SQLite in memory plus a temp-dir store

#![allow(dead_code)]

use datajob_core::application::{DataJobService, ExportTask, ImportTask, JobSubmitter, TaskRunner};
use datajob_core::domain::NewUser;
use datajob_core::port::dispatcher::mocks::RecordingDispatcher;
use datajob_core::port::id_provider::UuidProvider;
use datajob_core::port::time_provider::mocks::SteppingClock;
use datajob_core::port::UserDirectory;
use datajob_infra_files::LocalFileStorage;
use datajob_infra_sqlite::{
    create_pool, run_migrations, SqliteJobRepository, SqliteMaintenance, SqliteUserDirectory,
};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const BASE_URL: &str = "http://127.0.0.1:9600";
pub const DEFAULT_PASSWORD: &str = "changeme123";

/// 2023-11-14 22:13:20 UTC
pub const START_MILLIS: i64 = 1_700_000_000_000;

pub struct Harness {
    pub pool: SqlitePool,
    pub clock: Arc<SteppingClock>,
    pub repo: Arc<SqliteJobRepository>,
    pub users: Arc<SqliteUserDirectory>,
    pub storage: Arc<LocalFileStorage>,
    pub maintenance: Arc<SqliteMaintenance>,
    pub service: Arc<DataJobService>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub submitter: JobSubmitter,
    pub runner: TaskRunner,
    // Removed on drop
    pub dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(SteppingClock::new(START_MILLIS, 1));
        let ids = Arc::new(UuidProvider);

        let repo = Arc::new(SqliteJobRepository::new(
            pool.clone(),
            ids.clone(),
            clock.clone(),
        ));
        let users = Arc::new(SqliteUserDirectory::new(pool.clone(), clock.clone()));
        let storage = Arc::new(LocalFileStorage::new(dir.path().join("storage")));
        let maintenance = Arc::new(SqliteMaintenance::new(pool.clone()));
        let service = Arc::new(DataJobService::new(repo.clone(), clock.clone(), BASE_URL));
        let dispatcher = Arc::new(RecordingDispatcher::new());

        let submitter = JobSubmitter::new(
            service.clone(),
            storage.clone(),
            dispatcher.clone(),
            ids,
        );
        let runner = TaskRunner::new(
            service.clone(),
            ImportTask::new(
                service.clone(),
                storage.clone(),
                users.clone(),
                clock.clone(),
                DEFAULT_PASSWORD,
            ),
            ExportTask::new(service.clone(), storage.clone(), users.clone(), clock.clone()),
        );

        Self {
            pool,
            clock,
            repo,
            users,
            storage,
            maintenance,
            service,
            dispatcher,
            submitter,
            runner,
            dir,
        }
    }

    /// Write an upload outside the storage root, as a client would hand it over
    pub fn upload(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn stored(&self, path: &str) -> PathBuf {
        self.storage.root().join(path)
    }

    pub async fn seed_user(&self, name: &str, email: &str, active: bool, roles: &[&str]) {
        let record = self
            .users
            .create(&NewUser {
                name: name.to_string(),
                email: email.to_string(),
                phone: None,
                password: DEFAULT_PASSWORD.to_string(),
                is_active: active,
                roles: Vec::new(),
            })
            .await
            .unwrap();
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        self.users.assign_roles(&record, &roles).await.unwrap();
    }
}
