//! Crawl coordinator - run orchestration for one target
//!
//! This module drives a single job from manifest to final status:
//! - Fetching and parsing the target's manifest
//! - Dispatching work items through the batch scheduler
//! - Fetch, extract, deduplicate and persist per item
//! - Feeding every outcome to the job tracker
//! - Honoring cancel/pause requests between batches

use crate::config::Config;
use crate::crawler::dedup::{decide, DedupDecision};
use crate::crawler::extractor::{extract, ContentRecord, ExtractOptions};
use crate::crawler::manifest::{Manifest, WorkItem};
use crate::crawler::retry::{retry_with_backoff, RetryPolicy};
use crate::crawler::scheduler::run_batches;
use crate::crawler::tracker::JobTracker;
use crate::crawler::Fetcher;
use crate::state::{ControlSignal, FailureKind, ItemFailure, ItemOutcome, Job, JobStatus, RunControl};
use crate::storage::{lock_storage, Storage, StorageResult};
use crate::{IngestError, Result};
use futures::StreamExt;
use std::sync::{Arc, Mutex};

/// Result of processing one work item
#[derive(Debug, Clone)]
pub struct ItemReport {
    /// Extracted record, or a failed one when no markup was obtained
    pub record: ContentRecord,
    pub outcome: ItemOutcome,
    /// Fetch retries spent on this item
    pub retries: u32,
}

/// Runs jobs against one storage handle and HTTP client
pub struct Coordinator<S> {
    config: Arc<Config>,
    storage: Arc<Mutex<S>>,
    fetcher: Fetcher,
    options: Arc<ExtractOptions>,
    control: RunControl,
}

impl<S: Storage> Coordinator<S> {
    /// Creates a coordinator for one run
    ///
    /// # Arguments
    ///
    /// * `config` - The ingester configuration
    /// * `storage` - Shared content and job store
    /// * `fetcher` - HTTP transport
    /// * `control` - Cancel/pause signal observed between batches
    pub fn new(
        config: Arc<Config>,
        storage: Arc<Mutex<S>>,
        fetcher: Fetcher,
        control: RunControl,
    ) -> Result<Self> {
        let options = ExtractOptions::from_config(&config.extract)?;
        Ok(Self {
            config,
            storage,
            fetcher,
            options: Arc::new(options),
            control,
        })
    }

    /// Drives a pending or paused job to its next resting status
    ///
    /// Run-level failures (manifest unavailable, contract violations,
    /// job-store errors, a batch lost to persistence failures) leave the job
    /// `failed` with an error message and are not returned as `Err`.
    ///
    /// # Returns
    ///
    /// * `Ok(Job)` - Final snapshot: completed, failed, cancelled or paused
    /// * `Err(IngestError)` - The failure could not even be recorded
    pub async fn run(&self, mut tracker: JobTracker<S>) -> Result<Job> {
        let job_id = tracker.job_id();
        let target = tracker.target().to_string();

        if let Err(error) = self.execute(&mut tracker).await {
            tracing::error!(job_id, target = %target, "run failed: {}", error);
            if !tracker.status().is_terminal() {
                tracker.fail(error.to_string())?;
            }
        }

        let job = tracker.snapshot();
        tracing::info!(
            job_id,
            target = %target,
            status = %job.status,
            processed = job.items_processed,
            total = job.total_items,
            new = job.items_new,
            updated = job.items_updated,
            unchanged = job.items_unchanged,
            failed = job.items_failed,
            "run finished"
        );
        Ok(job)
    }

    async fn execute(&self, tracker: &mut JobTracker<S>) -> Result<()> {
        let job_id = tracker.job_id();
        let target = tracker.target().to_string();
        let resuming = tracker.status() == JobStatus::Paused;

        // Derive work items; a resumed job skips what it already accounted
        let items = self.load_work_items(&target).await?;
        let skip = if resuming {
            tracker.snapshot().items_processed as usize
        } else {
            0
        };
        let remaining: Vec<WorkItem> = items.into_iter().skip(skip).collect();
        let total = (skip + remaining.len()) as u64;

        tracker.start(total)?;
        tracing::info!(job_id, target = %target, total, skipped = skip, resuming, "run started");

        let crawler = &self.config.crawler;
        let target_ref = target.as_str();
        let stream = run_batches(
            remaining,
            crawler.concurrency as usize,
            crawler.inter_batch_delay(),
            move |item| self.process_item(target_ref, item),
        );
        futures::pin_mut!(stream);

        let mut batch_size = 0usize;
        let mut batch_persistence_failures = 0usize;

        while let Some(dispatched) = stream.next().await {
            let report = &dispatched.output;

            match &report.outcome {
                ItemOutcome::Failed(failure) => {
                    tracing::warn!(job_id, url = %report.record.url, "item failed: {}", failure.message);
                    if failure.kind == FailureKind::Persistence {
                        batch_persistence_failures += 1;
                    }
                }
                outcome => {
                    tracing::debug!(job_id, url = %report.record.url, outcome = outcome.label(), "item processed");
                }
            }
            batch_size += 1;

            tracker.add_retries(report.retries)?;
            tracker.record_outcome(&report.outcome)?;

            if !dispatched.last_in_batch {
                continue;
            }

            if batch_persistence_failures == batch_size {
                return Err(IngestError::Persistence(format!(
                    "all {} items of batch {} failed to persist",
                    batch_size,
                    dispatched.batch_index + 1
                )));
            }
            batch_size = 0;
            batch_persistence_failures = 0;

            if dispatched.ends_schedule() {
                continue;
            }

            match self.control.signal() {
                ControlSignal::Continue => {}
                ControlSignal::Cancel => {
                    tracker.cancel()?;
                    tracing::info!(job_id, target = %target, "run cancelled");
                    return Ok(());
                }
                ControlSignal::Pause => {
                    tracker.pause()?;
                    tracing::info!(job_id, target = %target, "run paused");
                    return Ok(());
                }
            }
        }

        tracker.complete()?;

        let processed = tracker.snapshot().items_processed;
        if let Err(error) = self.record_source_run(&target, processed) {
            tracing::warn!(job_id, target = %target, "failed to update source record: {}", error);
        }

        Ok(())
    }

    /// Fetches and parses the manifest of `target`
    async fn load_work_items(&self, target: &str) -> Result<Vec<WorkItem>> {
        let url = self.config.source.manifest_url(target);
        let timeout = self.config.crawler.request_timeout();

        let attempted = retry_with_backoff(&self.retry_policy(), || {
            self.fetcher.fetch(&url, timeout)
        })
        .await;

        let unavailable = |reason: String| IngestError::ManifestUnavailable {
            target: target.to_string(),
            reason,
        };

        let bytes = attempted.result.map_err(|e| unavailable(e.to_string()))?;
        let manifest = Manifest::parse(&bytes)
            .map_err(|e| unavailable(format!("malformed manifest: {}", e)))?;

        let items = manifest.work_items();
        tracing::debug!(target = %target, entries = manifest.entries.len(), items = items.len(), "manifest loaded");
        Ok(items)
    }

    /// Fetch, extract, deduplicate and persist one work item
    ///
    /// Never fails: an unusable path, fetch and persistence errors become
    /// `Failed` outcomes.
    async fn process_item(&self, target: &str, item: WorkItem) -> ItemReport {
        let url = match self.config.source.page_url(target, &item.path) {
            Ok(url) => url.to_string(),
            Err(error) => {
                let location = format!("{}/{}", target, item.path);
                return ItemReport {
                    record: ContentRecord::failed(&location, target, &item, error.to_string()),
                    outcome: ItemOutcome::Failed(ItemFailure::fetch(error.to_string())),
                    retries: 0,
                };
            }
        };
        let timeout = self.config.crawler.request_timeout();

        let attempted = retry_with_backoff(&self.retry_policy(), || {
            self.fetcher.fetch(&url, timeout)
        })
        .await;
        let retries = attempted.retries;

        let record = match attempted.result {
            Ok(bytes) => {
                let markup = String::from_utf8_lossy(&bytes);
                extract(&markup, &item, &url, target, &self.options)
            }
            Err(error) => ContentRecord::failed(&url, target, &item, error.to_string()),
        };

        let outcome = if record.success {
            match self.store_record(&record) {
                Ok(DedupDecision::New) => ItemOutcome::StoredNew,
                Ok(DedupDecision::Changed) => ItemOutcome::StoredChanged,
                Ok(DedupDecision::Unchanged) => ItemOutcome::Unchanged,
                Err(error) => ItemOutcome::Failed(ItemFailure::persistence(error.to_string())),
            }
        } else {
            ItemOutcome::Failed(ItemFailure::fetch(record.error.clone().unwrap_or_default()))
        };

        ItemReport {
            record,
            outcome,
            retries,
        }
    }

    /// Writes `record` unless its fingerprint is already stored
    fn store_record(&self, record: &ContentRecord) -> StorageResult<DedupDecision> {
        let mut store = lock_storage(&self.storage)?;
        let decision = decide(&*store, &record.url, &record.fingerprint)?;
        if decision.needs_write() {
            store.upsert_content(record)?;
        }
        Ok(decision)
    }

    fn record_source_run(&self, target: &str, processed: u64) -> StorageResult<()> {
        lock_storage(&self.storage)?.record_source_run(target, processed)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.crawler.max_retries,
            self.config.crawler.retry_backoff(),
        )
    }
}
