//! Statistics generation from the job store
//!
//! This module provides functionality for extracting and displaying
//! ingestion statistics from the storage layer.

use crate::state::{Job, JobStatus};
use crate::storage::{SourceRecord, Storage};
use crate::Result;
use std::collections::HashMap;

/// Ingestion statistics summary
#[derive(Debug, Clone)]
pub struct IngestStatistics {
    /// Total number of jobs in the store
    pub total_jobs: u64,

    /// Count of jobs by status
    pub jobs_by_status: HashMap<JobStatus, u64>,

    /// Pages currently stored, per target
    pub pages_by_target: Vec<(String, u64)>,

    /// Source bookkeeping of every target seen in the job store
    pub sources: Vec<SourceRecord>,

    /// Item failures summed over all jobs
    pub total_item_failures: u64,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `target` - Restrict to one target, or `None` for all
pub fn load_statistics(storage: &dyn Storage, target: Option<&str>) -> Result<IngestStatistics> {
    let jobs = storage.list_jobs(target)?;

    let mut jobs_by_status = HashMap::new();
    for job in &jobs {
        *jobs_by_status.entry(job.status).or_insert(0) += 1;
    }

    // Targets in first-seen order of the (newest first) job list
    let mut targets: Vec<&str> = Vec::new();
    for job in &jobs {
        if !targets.contains(&job.target.as_str()) {
            targets.push(&job.target);
        }
    }

    let mut pages_by_target = Vec::with_capacity(targets.len());
    let mut sources = Vec::new();
    for slug in targets {
        pages_by_target.push((slug.to_string(), storage.count_content(slug)?));
        if let Some(source) = storage.get_source(slug)? {
            sources.push(source);
        }
    }

    Ok(IngestStatistics {
        total_jobs: jobs.len() as u64,
        jobs_by_status,
        pages_by_target,
        sources,
        total_item_failures: jobs.iter().map(|j| j.items_failed).sum(),
    })
}

/// One-line summary of a job
pub fn format_job(job: &Job) -> String {
    let mut line = format!(
        "#{} {} [{}] {}% ({}/{}) new={} updated={} unchanged={} failed={} retries={}",
        job.id,
        job.target,
        job.status,
        job.progress,
        job.items_processed,
        job.total_items,
        job.items_new,
        job.items_updated,
        job.items_unchanged,
        job.items_failed,
        job.retry_count,
    );
    if let Some(error) = &job.error_message {
        line.push_str(&format!(" error=\"{}\"", error));
    }
    line
}

/// Prints a list of jobs, one per line
pub fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs recorded");
        return;
    }
    for job in jobs {
        println!("{}", format_job(job));
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &IngestStatistics) {
    println!("=== Ingestion Statistics ===\n");

    println!("Jobs: {}", stats.total_jobs);
    let mut status_counts: Vec<_> = stats.jobs_by_status.iter().collect();
    status_counts.sort_by(|a, b| b.1.cmp(a.1));
    for (status, count) in status_counts {
        println!("  {}: {}", status, count);
    }
    println!("  Item failures: {}", stats.total_item_failures);
    println!();

    println!("Stored pages:");
    for (target, pages) in &stats.pages_by_target {
        println!("  {}: {}", target, pages);
    }

    if !stats.sources.is_empty() {
        println!("\nSources:");
        for source in &stats.sources {
            println!(
                "  {}: {} pages, {} runs, last scraped {}",
                source.slug, source.page_count, source.run_count, source.last_scraped_at
            );
        }
    }
}
