//! devdocs-ingest: a resumable documentation crawler
//!
//! This crate crawls DevDocs-style documentation indexes, extracts structured
//! page content, deduplicates it by fingerprint and persists it into a SQLite
//! content store, tracking every crawl run as a job with progress counters.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for devdocs-ingest operations
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Manifest unavailable for {target}: {reason}")]
    ManifestUnavailable { target: String, reason: String },

    #[error("Fetch failed: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition {
        from: state::JobStatus,
        to: state::JobStatus,
    },

    #[error("Job {0} is already running")]
    AlreadyRunning(state::JobId),

    #[error("Invalid crawl target: {0}")]
    InvalidTarget(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector in config: {0}")]
    InvalidSelector(String),
}

/// Result type alias for devdocs-ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Ingestor, WorkItem};
pub use state::{Job, JobStatus};
pub use storage::{SqliteStorage, Storage};
