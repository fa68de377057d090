//! The job record of one crawl run and the per-item outcomes applied to it

use crate::state::JobStatus;
use chrono::{DateTime, Utc};

/// Identity of a job, assigned by the job store
pub type JobId = i64;

/// Accounted result of one work item attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Content was not stored before and has been written
    StoredNew,
    /// Content changed since the last run and has been rewritten
    StoredChanged,
    /// Fingerprint matched the stored entry; nothing was written
    Unchanged,
    /// Fetch or persistence failed for this item
    Failed(ItemFailure),
}

impl ItemOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::StoredNew => "new",
            Self::StoredChanged => "changed",
            Self::Unchanged => "unchanged",
            Self::Failed(_) => "failed",
        }
    }
}

/// Why a work item failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The page could not be fetched (after retries)
    Fetch,
    /// The content store rejected the lookup or the write
    Persistence,
}

impl ItemFailure {
    pub fn fetch(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Fetch,
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Persistence,
            message: message.into(),
        }
    }
}

/// Mutable progress record of one crawl run
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub target: String,
    pub status: JobStatus,
    pub total_items: u64,
    pub items_processed: u64,
    pub items_failed: u64,
    pub items_new: u64,
    pub items_updated: u64,
    pub items_unchanged: u64,
    /// Whole percentage, never decreases
    pub progress: u8,
    /// Fetch retries performed during the run
    pub retry_count: u64,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Job {
    /// A fresh pending job
    pub fn new(id: JobId, target: impl Into<String>, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id,
            target: target.into(),
            status: JobStatus::Pending,
            total_items: 0,
            items_processed: 0,
            items_failed: 0,
            items_new: 0,
            items_updated: 0,
            items_unchanged: 0,
            progress: 0,
            retry_count: 0,
            scheduled_at,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Items that were fetched and accounted without error
    pub fn items_succeeded(&self) -> u64 {
        self.items_new + self.items_updated + self.items_unchanged
    }

    /// Checks `processed = succeeded + failed` and the progress bounds
    pub fn is_consistent(&self) -> bool {
        self.items_processed == self.items_succeeded() + self.items_failed
            && self.progress <= 100
            && (self.total_items > 0 || self.items_processed == 0)
    }

    /// Progress implied by the counters: `floor(100 * processed / total)`,
    /// 0 while the total is unknown
    pub fn computed_progress(&self) -> u8 {
        if self.total_items == 0 {
            return 0;
        }
        let pct = self.items_processed.min(self.total_items) * 100 / self.total_items;
        pct as u8
    }

    /// Applies one outcome to the counters and recomputes progress
    ///
    /// Progress is only ever raised, so a resumed job whose total grew keeps
    /// the percentage it had already reported.
    pub fn apply(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::StoredNew => self.items_new += 1,
            ItemOutcome::StoredChanged => self.items_updated += 1,
            ItemOutcome::Unchanged => self.items_unchanged += 1,
            ItemOutcome::Failed(_) => self.items_failed += 1,
        }
        self.items_processed += 1;
        self.progress = self.progress.max(self.computed_progress());
    }
}
