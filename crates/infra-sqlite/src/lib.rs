// DataJob Infrastructure - SQLite Adapter
// Implements: JobRepository, UserDirectory, Maintenance

mod connection;
mod job_repository;
mod maintenance_impl;
mod migration;
mod user_directory;

pub use connection::create_pool;
pub use job_repository::SqliteJobRepository;
pub use maintenance_impl::SqliteMaintenance;
pub use migration::run_migrations;
pub use user_directory::SqliteUserDirectory;

// Note: sqlx::Error conversion is handled by `map_sqlx_error`
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
