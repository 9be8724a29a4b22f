// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod user;

// Re-exports
pub use error::DomainError;
pub use job::{
    format_timestamp, DataJob, JobErrorEntry, JobId, JobPatch, JobStatus, JobType, NewDataJob,
    SystemErrorKind, UserId,
};
pub use user::{NewUser, SortDirection, UserFilter, UserOrderBy, UserRecord};
