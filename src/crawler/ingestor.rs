//! Caller-facing entry point: trigger, await, resume and steer crawl runs

use crate::config::{validate_target_slug, Config};
use crate::crawler::coordinator::Coordinator;
use crate::crawler::tracker::JobTracker;
use crate::crawler::Fetcher;
use crate::state::{Job, JobId, JobStatus, RunControl};
use crate::storage::{lock_storage, Storage};
use crate::{IngestError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Starts crawl runs and keeps a control handle for each active one
pub struct Ingestor<S> {
    config: Arc<Config>,
    storage: Arc<Mutex<S>>,
    fetcher: Fetcher,
    controls: Arc<Mutex<HashMap<JobId, RunControl>>>,
}

impl<S: Storage + Send + 'static> Ingestor<S> {
    /// Creates an ingestor over a storage backend
    ///
    /// # Example
    ///
    /// ```no_run
    /// use devdocs_ingest::config::load_config;
    /// use devdocs_ingest::{Ingestor, SqliteStorage};
    /// use std::path::Path;
    ///
    /// # async fn demo() -> devdocs_ingest::Result<()> {
    /// let config = load_config(Path::new("devdocs.toml"))?;
    /// let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    /// let ingestor = Ingestor::new(config, storage)?;
    /// let job = ingestor.run("rust").await?;
    /// println!("{} pages stored", job.items_new + job.items_updated);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: Config, storage: S) -> Result<Self> {
        let fetcher = Fetcher::new(&config.user_agent)?;
        Ok(Self {
            config: Arc::new(config),
            storage: Arc::new(Mutex::new(storage)),
            fetcher,
            controls: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Creates a pending job for `target` and runs it in the background
    ///
    /// The job exists in the job store when this returns.
    pub fn trigger(&self, target: &str) -> Result<(JobId, JoinHandle<Result<Job>>)> {
        validate_target_slug(target).map_err(|e| IngestError::InvalidTarget(e.to_string()))?;

        let tracker = JobTracker::create(self.storage.clone(), target)?;
        let job_id = tracker.job_id();
        tracing::info!(job_id, target, "job scheduled");

        Ok((job_id, self.spawn(tracker)?))
    }

    /// Runs a crawl of `target` to its final status
    pub async fn run(&self, target: &str) -> Result<Job> {
        let (_, handle) = self.trigger(target)?;
        join(handle).await
    }

    /// Continues a paused job where it stopped
    ///
    /// Fails with `AlreadyRunning` while another resume of the same job is
    /// still in flight.
    pub async fn resume(&self, job_id: JobId) -> Result<Job> {
        let tracker = JobTracker::load(self.storage.clone(), job_id)?;
        if tracker.status() != JobStatus::Paused {
            return Err(IngestError::InvalidTransition {
                from: tracker.status(),
                to: JobStatus::Running,
            });
        }
        tracing::info!(job_id, target = tracker.target(), "resuming job");

        let handle = self.spawn(tracker)?;
        join(handle).await
    }

    /// Requests cancellation of an active run
    ///
    /// Returns `false` when no run with this id is active.
    pub fn cancel(&self, job_id: JobId) -> bool {
        self.signal(job_id, RunControl::cancel)
    }

    /// Requests an active run to pause after its current batch
    pub fn pause(&self, job_id: JobId) -> bool {
        self.signal(job_id, RunControl::pause)
    }

    /// Requests cancellation of every active run
    pub fn cancel_all(&self) -> usize {
        match self.controls.lock() {
            Ok(controls) => {
                controls.values().for_each(RunControl::cancel);
                controls.len()
            }
            Err(_) => 0,
        }
    }

    pub fn job(&self, job_id: JobId) -> Result<Job> {
        Ok(lock_storage(&self.storage)?.get_job(job_id)?)
    }

    /// Jobs newest first, optionally restricted to one target
    pub fn jobs(&self, target: Option<&str>) -> Result<Vec<Job>> {
        Ok(lock_storage(&self.storage)?.list_jobs(target)?)
    }

    /// Shared storage handle, e.g. for inspecting stored content
    pub fn storage(&self) -> Arc<Mutex<S>> {
        self.storage.clone()
    }

    fn signal(&self, job_id: JobId, raise: fn(&RunControl)) -> bool {
        let controls = match self.controls.lock() {
            Ok(controls) => controls,
            Err(_) => return false,
        };
        match controls.get(&job_id) {
            Some(control) => {
                raise(control);
                true
            }
            None => false,
        }
    }

    fn spawn(&self, tracker: JobTracker<S>) -> Result<JoinHandle<Result<Job>>> {
        let job_id = tracker.job_id();
        let control = RunControl::new();
        let coordinator = Coordinator::new(
            self.config.clone(),
            self.storage.clone(),
            self.fetcher.clone(),
            control.clone(),
        )?;

        // One check-and-insert under the lock: a job has at most one run
        {
            let mut controls = self.controls.lock().map_err(|_| {
                IngestError::ContractViolation("control registry poisoned".to_string())
            })?;
            if controls.contains_key(&job_id) {
                return Err(IngestError::AlreadyRunning(job_id));
            }
            controls.insert(job_id, control);
        }

        let controls = self.controls.clone();
        Ok(tokio::spawn(async move {
            let result = coordinator.run(tracker).await;
            if let Ok(mut controls) = controls.lock() {
                controls.remove(&job_id);
            }
            result
        }))
    }
}

async fn join(handle: JoinHandle<Result<Job>>) -> Result<Job> {
    handle
        .await
        .map_err(|e| IngestError::ContractViolation(format!("run task aborted: {}", e)))?
}
