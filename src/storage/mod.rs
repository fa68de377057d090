//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the ingester, including:
//! - SQLite database initialization and schema management
//! - Deduplicated page content keyed by URL
//! - Per-target source bookkeeping
//! - Job records with partial updates

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::crawler::CodeBlock;
use crate::state::{Job, JobStatus};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

/// Locks a shared storage handle
///
/// Guards must never be held across an `.await`.
pub fn lock_storage<S>(storage: &Mutex<S>) -> StorageResult<MutexGuard<'_, S>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// Represents a stored page in the content store
#[derive(Debug, Clone)]
pub struct StoredContentEntry {
    pub url: String,
    pub target: String,
    pub path: String,
    pub title: String,
    pub body: String,
    pub code_blocks: Vec<CodeBlock>,
    pub keywords: Vec<String>,
    pub topics: Vec<String>,
    pub word_count: u64,
    pub char_count: u64,
    pub fingerprint: String,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Bookkeeping for one crawl target
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub slug: String,
    pub last_scraped_at: DateTime<Utc>,
    pub page_count: u64,
    pub run_count: u64,
}

/// Partial update of a job record
///
/// Only the fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub total_items: Option<u64>,
    pub items_processed: Option<u64>,
    pub items_failed: Option<u64>,
    pub items_new: Option<u64>,
    pub items_updated: Option<u64>,
    pub items_unchanged: Option<u64>,
    pub progress: Option<u8>,
    pub retry_count: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    /// Update carrying every counter and the progress of `job`
    pub fn counters(job: &Job) -> Self {
        Self {
            total_items: Some(job.total_items),
            items_processed: Some(job.items_processed),
            items_failed: Some(job.items_failed),
            items_new: Some(job.items_new),
            items_updated: Some(job.items_updated),
            items_unchanged: Some(job.items_unchanged),
            progress: Some(job.progress),
            retry_count: Some(job.retry_count),
            ..Self::default()
        }
    }

    /// Update carrying the status, timestamps and error message of `job`
    pub fn lifecycle(job: &Job) -> Self {
        Self {
            status: Some(job.status),
            started_at: job.started_at,
            completed_at: job.completed_at,
            error_message: job.error_message.clone(),
            ..Self::default()
        }
    }
}
