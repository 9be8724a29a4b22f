// Worker constants (no magic values)
use std::time::Duration;

/// Upper bound on one task's run time (30 minutes)
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Tasks buffered in the in-process queue before submit is refused
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Error message for PROCESSING jobs found at startup
pub const INTERRUPTED_MESSAGE: &str = "Job interrupted by daemon restart";
