//! DataJob daemon - composition root

mod config;
mod logging;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;
use datajob_api_rpc::{RateLimitConfig, RpcHandler, RpcServer, RpcServerConfig};
use datajob_core::application::{
    shutdown_channel, ChannelDispatcher, DataJobService, ExportTask, ImportTask, JobSubmitter,
    MaintenanceScheduler, MaintenanceService, RecoveryService, TaskRunner, Worker,
};
use datajob_core::port::id_provider::UuidProvider;
use datajob_core::port::time_provider::SystemTimeProvider;
use datajob_core::port::MaintenanceConfig;
use datajob_infra_files::LocalFileStorage;
use datajob_infra_sqlite::{
    create_pool, run_migrations, SqliteJobRepository, SqliteMaintenance, SqliteUserDirectory,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration, then logging (log settings live in the config)
    let config = DaemonConfig::load()?;
    let _log_guard = logging::init(&config)?;

    info!("DataJob daemon v{} starting...", VERSION);

    // 2. Database
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!(db_path = %db_path.display(), "Initializing database...");

    let pool = create_pool(&config.database_url())
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 3. Storage
    let storage_root = config.storage_root();
    std::fs::create_dir_all(&storage_root)
        .with_context(|| format!("Failed to create {}", storage_root.display()))?;
    info!(storage_root = %storage_root.display(), "Using local file storage");

    // 4. DI wiring
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let job_repo = Arc::new(SqliteJobRepository::new(
        pool.clone(),
        id_provider.clone(),
        time_provider.clone(),
    ));
    let users = Arc::new(SqliteUserDirectory::new(pool.clone(), time_provider.clone()));
    let storage = Arc::new(LocalFileStorage::new(storage_root));
    let maintenance = Arc::new(SqliteMaintenance::new(pool.clone()));

    let service = Arc::new(DataJobService::new(
        job_repo.clone(),
        time_provider.clone(),
        config.public_base_url.clone(),
    ));

    let (dispatcher, queue) = ChannelDispatcher::channel(config.queue_capacity);
    let dispatcher = Arc::new(dispatcher);

    let runner = Arc::new(TaskRunner::new(
        service.clone(),
        ImportTask::new(
            service.clone(),
            storage.clone(),
            users.clone(),
            time_provider.clone(),
            config.default_password.clone(),
        ),
        ExportTask::new(service.clone(), storage.clone(), users, time_provider.clone()),
    ));

    let submitter = Arc::new(JobSubmitter::new(
        service.clone(),
        storage.clone(),
        dispatcher.clone(),
        id_provider,
    ));

    let maintenance_service = Arc::new(MaintenanceService::new(
        maintenance,
        job_repo.clone(),
        storage,
        time_provider,
    ));

    // 5. Worker (started before recovery so re-submitted jobs never fill the queue)
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let worker = Worker::new(runner, service.clone(), config.task_timeout());
    let worker_shutdown = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run(queue, worker_shutdown).await {
            error!(error = %e, "Worker failed");
        }
    });

    // 6. Crash recovery
    info!("Running crash recovery...");
    let recovery = RecoveryService::new(job_repo, service.clone(), dispatcher);
    match recovery.recover_orphaned_jobs().await {
        Ok(report) => info!(
            failed = report.failed,
            resubmitted = report.resubmitted,
            "Crash recovery completed"
        ),
        Err(e) => error!(error = %e, "Crash recovery failed"),
    }

    // 7. Maintenance scheduler
    let scheduler = MaintenanceScheduler::new(
        maintenance_service.clone(),
        MaintenanceConfig {
            completed_job_retention_days: config.retention_days,
            max_db_size_mb: config.max_db_size_mb,
        },
        config.maintenance_interval_hours,
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    // 8. JSON-RPC server
    let handler = Arc::new(RpcHandler::new(
        service,
        submitter,
        maintenance_service,
        RateLimitConfig {
            burst: config.rate_limit_burst,
            per_second: config.rate_limit_rate,
        },
    ));
    let rpc_server = RpcServer::new(
        RpcServerConfig {
            host: config.rpc_host.clone(),
            port: config.rpc_port,
        },
        handler,
    );
    let (rpc_addr, rpc_handle) = rpc_server.start().await.context("RPC server start failed")?;

    info!(rpc = %rpc_addr, "System ready. Waiting for tasks...");

    // 9. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 10. Graceful shutdown: stop intake first, then let the worker finish its task
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server was already stopped");
    }
    shutdown_tx.shutdown();

    if tokio::time::timeout(WORKER_DRAIN_TIMEOUT, worker_handle).await.is_err() {
        warn!("Worker did not stop in time; the running job will be failed on next start");
    }
    let _ = scheduler_handle.await;
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}
