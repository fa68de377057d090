//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the ingester:
//! - Building the HTTP client with the crawler's user agent string
//! - GET requests with a per-request timeout
//! - Error classification (timeout, HTTP status, transport failure)
//!
//! The fetcher never retries; see [`crate::crawler::retry`].

use crate::config::UserAgentConfig;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a single fetch
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Network failure for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Invalid request for {url}: {message}")]
    InvalidRequest { url: String, message: String },
}

impl FetchError {
    /// Whether a later attempt may succeed
    ///
    /// | Condition | Retryable |
    /// |-----------|-----------|
    /// | Timeout | yes |
    /// | Network failure | yes |
    /// | HTTP 429 / 5xx | yes |
    /// | Other HTTP status | no |
    /// | Invalid request | no |
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidRequest { .. } => false,
        }
    }
}

/// Thin transport wrapper around a configured [`Client`]
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Creates a fetcher identifying itself with the configured user agent
    pub fn new(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    /// Fetches `url` and returns the raw response body
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    /// * `timeout` - Whole-request timeout; must be greater than zero
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)` - Body of a 2xx response
    /// * `Err(FetchError)` - Timeout, non-2xx status or transport failure
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        if timeout.is_zero() {
            return Err(FetchError::InvalidRequest {
                url: url.to_string(),
                message: "timeout must be greater than zero".to_string(),
            });
        }

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_error(url, e))?;

        Ok(body.to_vec())
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use devdocs_ingest::config::UserAgentConfig;
/// use devdocs_ingest::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "DevdocsIngest".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

fn classify_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if let Some(status) = error.status() {
        FetchError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
