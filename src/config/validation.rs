use crate::config::types::{
    Config, CrawlerConfig, ExtractConfig, OutputConfig, SourceConfig, TargetEntry,
    UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_source_config(&config.source)?;
    validate_extract_config(&config.extract)?;
    validate_output_config(&config.output)?;
    validate_targets(&config.targets)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_ms must be greater than 0".to_string(),
        ));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates manifest and page source URLs
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    if !config.index_url.contains("{target}") {
        return Err(ConfigError::Validation(format!(
            "index_url must contain a {{target}} placeholder, got '{}'",
            config.index_url
        )));
    }

    Url::parse(&config.manifest_url("sample"))
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid index_url: {}", e)))?;

    let base = Url::parse(&config.page_base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid page_base_url: {}", e)))?;

    if !matches!(base.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "page_base_url must use http or https, got '{}'",
            base.scheme()
        )));
    }

    Ok(())
}

/// Validates extraction tuning
fn validate_extract_config(config: &ExtractConfig) -> Result<(), ConfigError> {
    if config.content_selectors.is_empty() {
        return Err(ConfigError::Validation(
            "content_selectors cannot be empty".to_string(),
        ));
    }

    for selector in &config.content_selectors {
        Selector::parse(selector)
            .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))?;
    }

    if config.keyword_count == 0 {
        return Err(ConfigError::Validation(
            "keyword_count must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates configured targets
fn validate_targets(targets: &[TargetEntry]) -> Result<(), ConfigError> {
    for entry in targets {
        validate_target_slug(&entry.slug)?;
    }
    Ok(())
}

/// Validates a documentation slug
///
/// Slugs end up in URL paths, so only ASCII alphanumerics and `-`, `_`, `.`,
/// `~` are accepted.
pub fn validate_target_slug(slug: &str) -> Result<(), ConfigError> {
    if slug.is_empty() {
        return Err(ConfigError::Validation(
            "target slug cannot be empty".to_string(),
        ));
    }

    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
    {
        return Err(ConfigError::Validation(format!(
            "target slug '{}' contains invalid characters",
            slug
        )));
    }

    if slug.starts_with('.') || slug.contains("..") {
        return Err(ConfigError::Validation(format!(
            "target slug '{}' cannot start with '.' or contain '..'",
            slug
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
