// Application Layer - Use Cases and Business Logic

pub mod export_task;
pub mod import_task;
pub mod job_service;
pub mod maintenance;
pub mod recovery;
pub mod submission;
pub mod task_runner;
pub mod worker;

// Re-exports
pub use export_task::ExportTask;
pub use import_task::{ImportOutcome, ImportTask};
pub use job_service::{DataJobService, JobView};
pub use maintenance::{CleanupReport, CleanupSample, MaintenanceScheduler, MaintenanceService};
pub use recovery::{RecoveryReport, RecoveryService};
pub use submission::JobSubmitter;
pub use task_runner::{TaskHandler, TaskRunner};
pub use worker::{shutdown_channel, ChannelDispatcher, ShutdownSender, ShutdownToken, TaskQueue, Worker};
