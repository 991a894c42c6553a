pub mod job_queue;
pub mod sweeper;

pub use job_queue::{JobId, JobQueue, JobRunner, JobSnapshot, JobSpec, JobStatus, QueueError};
