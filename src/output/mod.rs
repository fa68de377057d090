//! Output module for job summaries and ingestion statistics

pub mod stats;

pub use stats::{format_job, load_statistics, print_jobs, print_statistics, IngestStatistics};
