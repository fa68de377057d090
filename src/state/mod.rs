//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `JobStatus`: lifecycle of a crawl job and its legal transitions
//! - `Job`: counters and timestamps of one crawl run
//! - `ItemOutcome`: accounted result of one work item
//! - `RunControl`: operator signal (pause/cancel) read between batches

mod control;
mod job;
mod job_status;

// Re-export main types
pub use control::{ControlSignal, RunControl};
pub use job::{FailureKind, ItemFailure, ItemOutcome, Job, JobId};
pub use job_status::JobStatus;
