use crate::ConfigError;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Main configuration structure for devdocs-ingest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of pages fetched concurrently within one batch
    pub concurrency: u32,

    /// Pause between consecutive batches (milliseconds)
    #[serde(rename = "inter-batch-delay-ms", default)]
    pub inter_batch_delay_ms: u64,

    /// Per-request timeout (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Maximum number of retries for one fetch
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay of the exponential retry backoff (milliseconds)
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl CrawlerConfig {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the identity sent with every request:
    /// `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Where manifests and pages are fetched from
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Manifest URL template; `{target}` is replaced with the target slug
    #[serde(rename = "index-url")]
    pub index_url: String,

    /// Base URL pages are resolved against
    #[serde(rename = "page-base-url")]
    pub page_base_url: String,

    /// Suffix appended to every page path (e.g. ".html")
    #[serde(rename = "page-suffix", default)]
    pub page_suffix: String,
}

impl SourceConfig {
    /// Manifest URL for one target
    pub fn manifest_url(&self, target: &str) -> String {
        self.index_url.replace("{target}", target)
    }

    /// Page URL: `{base}/{target}/{path}{suffix}`
    ///
    /// Path segments are percent-encoded one by one and empty segments are
    /// dropped. `.` and `..` segments are rejected so a page never resolves
    /// outside its target.
    pub fn page_url(&self, target: &str, path: &str) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.page_base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid page_base_url: {}", e)))?;

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(ConfigError::InvalidUrl(format!("empty page path '{}'", path)));
        };
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(ConfigError::InvalidUrl(format!(
                "page path '{}' escapes target '{}'",
                path, target
            )));
        }

        url.path_segments_mut()
            .map_err(|_| {
                ConfigError::InvalidUrl(format!(
                    "page_base_url '{}' cannot be a base",
                    self.page_base_url
                ))
            })?
            .pop_if_empty()
            .push(target)
            .extend(parents)
            .push(&format!("{}{}", last, self.page_suffix));

        Ok(url)
    }
}

/// Content extraction tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConfig {
    /// CSS selectors tried in order to locate the primary content region
    #[serde(rename = "content-selectors", default = "default_content_selectors")]
    pub content_selectors: Vec<String>,

    /// Number of keywords kept per page
    #[serde(rename = "keyword-count", default = "default_keyword_count")]
    pub keyword_count: usize,

    /// Tokens must be longer than this to count as keywords
    #[serde(rename = "min-keyword-length", default = "default_min_keyword_length")]
    pub min_keyword_length: usize,

    /// Leading name segments turned into topic tags
    #[serde(rename = "topic-path-segments", default = "default_topic_path_segments")]
    pub topic_path_segments: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            content_selectors: default_content_selectors(),
            keyword_count: default_keyword_count(),
            min_keyword_length: default_min_keyword_length(),
            topic_path_segments: default_topic_path_segments(),
        }
    }
}

fn default_content_selectors() -> Vec<String> {
    ["._content", "main", "article", "[role=\"main\"]"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_keyword_count() -> usize {
    10
}

fn default_min_keyword_length() -> usize {
    3
}

fn default_topic_path_segments() -> usize {
    2
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// A documentation set crawled by default
#[derive(Debug, Clone, Deserialize)]
pub struct TargetEntry {
    /// Documentation slug (e.g. "rust" or "python~3.12")
    pub slug: String,
}
