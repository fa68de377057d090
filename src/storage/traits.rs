//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::ContentRecord;
use crate::state::{Job, JobId};
use crate::storage::{JobUpdate, SourceRecord, StoredContentEntry};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// One backend serves as both the content store (deduplicated page content
/// keyed by URL, plus per-target bookkeeping) and the job store. Every
/// operation is independently idempotent; nothing here is transactional
/// across calls, so two runs touching the same URL race last-write-wins.
pub trait Storage {
    // ===== Content =====

    /// Returns the last known fingerprint for `url`, if the page was stored
    fn lookup_fingerprint(&self, url: &str) -> StorageResult<Option<String>>;

    /// Inserts or replaces the content entry keyed by `record.url`
    ///
    /// `first_seen_at` is preserved when the entry already exists.
    fn upsert_content(&mut self, record: &ContentRecord) -> StorageResult<()>;

    /// Gets the stored entry for a URL
    fn get_content(&self, url: &str) -> StorageResult<Option<StoredContentEntry>>;

    /// Counts stored entries of one target
    fn count_content(&self, target: &str) -> StorageResult<u64>;

    // ===== Sources =====

    /// Records a finished run for `target`: stamps `last_scraped_at`, stores
    /// `page_count` and bumps `run_count`
    fn record_source_run(&mut self, target: &str, page_count: u64) -> StorageResult<()>;

    /// Gets the bookkeeping row of one target
    fn get_source(&self, target: &str) -> StorageResult<Option<SourceRecord>>;

    // ===== Jobs =====

    /// Creates a pending job for `target` and returns it with its new id
    fn create_job(&mut self, target: &str) -> StorageResult<Job>;

    /// Merges the fields set in `update` into the stored job
    ///
    /// Fields left as `None` keep their stored value.
    fn update_job(&mut self, job_id: JobId, update: &JobUpdate) -> StorageResult<()>;

    /// Gets a job by id
    fn get_job(&self, job_id: JobId) -> StorageResult<Job>;

    /// Lists jobs, newest first, optionally restricted to one target
    fn list_jobs(&self, target: Option<&str>) -> StorageResult<Vec<Job>>;
}
