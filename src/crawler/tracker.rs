//! Job tracker: the single owner of one run's mutable job record
//!
//! Every mutation is validated against the job state machine, then written
//! to the job store as a partial update before the in-memory copy changes.

use crate::state::{ItemOutcome, Job, JobId, JobStatus};
use crate::storage::{lock_storage, JobUpdate, Storage};
use crate::{IngestError, Result};
use chrono::Utc;
use std::sync::{Arc, Mutex};

pub struct JobTracker<S> {
    job: Job,
    storage: Arc<Mutex<S>>,
    /// Set once `start` succeeded for this leg of the run
    started: bool,
}

impl<S: Storage> JobTracker<S> {
    /// Persists a new pending job for `target`
    pub fn create(storage: Arc<Mutex<S>>, target: &str) -> Result<Self> {
        let job = lock_storage(&storage)?.create_job(target)?;
        tracing::debug!(job_id = job.id, target, "created job");
        Ok(Self {
            job,
            storage,
            started: false,
        })
    }

    /// Takes ownership of an existing job, e.g. a paused one being resumed
    pub fn load(storage: Arc<Mutex<S>>, job_id: JobId) -> Result<Self> {
        let job = lock_storage(&storage)?.get_job(job_id)?;
        Ok(Self {
            job,
            storage,
            started: false,
        })
    }

    pub fn job_id(&self) -> JobId {
        self.job.id
    }

    pub fn target(&self) -> &str {
        &self.job.target
    }

    pub fn status(&self) -> JobStatus {
        self.job.status
    }

    /// A consistent copy of the job record
    pub fn snapshot(&self) -> Job {
        self.job.clone()
    }

    /// Moves the job to `running` with a known total
    ///
    /// A resumed job keeps its counters and its original `started_at`.
    pub fn start(&mut self, total: u64) -> Result<()> {
        if self.started {
            return Err(IngestError::ContractViolation(format!(
                "job {} was already started",
                self.job.id
            )));
        }
        if total < self.job.items_processed {
            return Err(IngestError::ContractViolation(format!(
                "total {} is below the {} items already processed",
                total, self.job.items_processed
            )));
        }

        let mut next = self.transition(JobStatus::Running)?;
        next.total_items = total;
        next.started_at = next.started_at.or_else(|| Some(Utc::now()));
        next.progress = next.progress.max(next.computed_progress());

        let update = JobUpdate {
            status: Some(next.status),
            total_items: Some(next.total_items),
            progress: Some(next.progress),
            started_at: next.started_at,
            ..JobUpdate::default()
        };
        self.commit(next, update)?;
        self.started = true;
        Ok(())
    }

    /// Accounts one item outcome
    pub fn record_outcome(&mut self, outcome: &ItemOutcome) -> Result<()> {
        self.require_running("record an outcome")?;
        if self.job.items_processed >= self.job.total_items {
            return Err(IngestError::ContractViolation(format!(
                "job {} already accounted all {} items",
                self.job.id, self.job.total_items
            )));
        }

        let mut next = self.job.clone();
        next.apply(outcome);
        let update = JobUpdate::counters(&next);
        self.commit(next, update)
    }

    /// Adds fetch retries spent by an item
    pub fn add_retries(&mut self, retries: u32) -> Result<()> {
        self.require_running("add retries")?;
        if retries == 0 {
            return Ok(());
        }

        let mut next = self.job.clone();
        next.retry_count += u64::from(retries);
        let update = JobUpdate {
            retry_count: Some(next.retry_count),
            ..JobUpdate::default()
        };
        self.commit(next, update)
    }

    pub fn complete(&mut self) -> Result<()> {
        let mut next = self.transition(JobStatus::Completed)?;
        next.progress = 100;
        next.completed_at = Some(Utc::now());

        let update = JobUpdate {
            progress: Some(100),
            ..JobUpdate::lifecycle(&next)
        };
        self.commit(next, update)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        let mut next = self.transition(JobStatus::Failed)?;
        next.error_message = Some(message.into());
        next.completed_at = Some(Utc::now());

        let update = JobUpdate::lifecycle(&next);
        self.commit(next, update)
    }

    pub fn cancel(&mut self) -> Result<()> {
        let mut next = self.transition(JobStatus::Cancelled)?;
        next.completed_at = Some(Utc::now());

        let update = JobUpdate::lifecycle(&next);
        self.commit(next, update)
    }

    pub fn pause(&mut self) -> Result<()> {
        let next = self.transition(JobStatus::Paused)?;
        let update = JobUpdate::lifecycle(&next);
        self.commit(next, update)?;
        self.started = false;
        Ok(())
    }

    fn transition(&self, to: JobStatus) -> Result<Job> {
        let from = self.job.status;
        if !from.can_transition_to(to) {
            return Err(IngestError::InvalidTransition { from, to });
        }
        let mut next = self.job.clone();
        next.status = to;
        Ok(next)
    }

    fn require_running(&self, action: &str) -> Result<()> {
        if self.job.status != JobStatus::Running {
            return Err(IngestError::ContractViolation(format!(
                "cannot {} on job {} while it is {}",
                action, self.job.id, self.job.status
            )));
        }
        Ok(())
    }

    fn commit(&mut self, next: Job, update: JobUpdate) -> Result<()> {
        lock_storage(&self.storage)?.update_job(next.id, &update)?;
        self.job = next;
        Ok(())
    }
}
