// Dispatcher Port
// At-least-once background execution facility

use crate::domain::{JobId, JobType};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything a worker needs to locate and run one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub job_id: JobId,
    pub job_type: JobType,
}

impl TaskDescriptor {
    pub fn new(job_id: impl Into<String>, job_type: JobType) -> Self {
        Self {
            job_id: job_id.into(),
            job_type,
        }
    }
}

/// Submit returns immediately; the task runs independently with no ordering
/// guarantee relative to other tasks.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn submit(&self, task: TaskDescriptor) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records submissions without running anything
    #[derive(Default)]
    pub struct RecordingDispatcher {
        submitted: Mutex<Vec<TaskDescriptor>>,
    }

    impl RecordingDispatcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn submitted(&self) -> Vec<TaskDescriptor> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Dispatcher for RecordingDispatcher {
        async fn submit(&self, task: TaskDescriptor) -> Result<()> {
            self.submitted.lock().unwrap().push(task);
            Ok(())
        }
    }
}
