//! Crawler module for documentation ingestion
//!
//! This module contains the core ingestion logic, including:
//! - Manifest parsing into work items
//! - HTTP fetching with bounded retry
//! - Content extraction and fingerprint deduplication
//! - Batched, bounded-concurrency dispatch
//! - Job tracking and run orchestration

mod coordinator;
mod dedup;
mod extractor;
mod fetcher;
mod ingestor;
mod manifest;
mod retry;
mod scheduler;
mod tracker;

pub use coordinator::{Coordinator, ItemReport};
pub use dedup::{decide, fingerprint, DedupDecision};
pub use extractor::{extract, keywords, topics, CodeBlock, ContentRecord, ExtractOptions};
pub use fetcher::{build_http_client, FetchError, Fetcher};
pub use ingestor::Ingestor;
pub use manifest::{Manifest, ManifestEntry, WorkItem};
pub use retry::{retry_with_backoff, Attempted, RetryPolicy};
pub use scheduler::{partition, run_batches, Dispatched};
pub use tracker::JobTracker;
