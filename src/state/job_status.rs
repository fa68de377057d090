/// Job status definitions for tracking crawl runs
///
/// This module defines the lifecycle states of a crawl job and the legal
/// transitions between them.
use std::fmt;

/// Represents the lifecycle status of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    // ===== Active States =====
    /// Job has been created but no item has been dispatched
    Pending,

    /// Job is dispatching batches
    Running,

    /// Job stopped between batches on operator request and can be resumed
    Paused,

    // ===== Terminal States =====
    /// Every work item was attempted
    Completed,

    /// A run-level error stopped the job
    Failed,

    /// Operator cancelled the job between batches
    Cancelled,
}

impl JobStatus {
    /// Returns true if the job can never change status again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if `self -> next` is a legal transition
    ///
    /// ```text
    /// pending -> running | failed
    /// running -> completed | failed | cancelled | paused
    /// paused  -> running | failed | cancelled
    /// ```
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, Paused)
                | (Paused, Running)
                | (Paused, Failed)
                | (Paused, Cancelled)
        )
    }

    /// Converts the job status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a job status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all possible job statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Running,
            Self::Paused,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
