// Port Layer - Interfaces for external dependencies

pub mod dispatcher;
pub mod file_storage;
pub mod id_provider; // For deterministic testing
pub mod job_repository;
pub mod maintenance;
pub mod time_provider;
pub mod user_directory;

// Re-exports
pub use dispatcher::{Dispatcher, TaskDescriptor};
pub use file_storage::{FileStorage, Row, Spreadsheet};
pub use id_provider::IdProvider;
pub use job_repository::JobRepository;
pub use maintenance::{Maintenance, MaintenanceConfig, MaintenanceStats};
pub use time_provider::TimeProvider;
pub use user_directory::UserDirectory;
