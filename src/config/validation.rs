use crate::config::types::{
    ClassifierConfig, Config, CoordinatorConfig, HttpConfig, WorkerConfig,
};
use crate::crawler::EMAIL_DOMAIN_PLACEHOLDER;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_worker_config(&config.worker)?;
    validate_classifier_config(&config.classifier)?;
    validate_http_config(&config.http)?;
    validate_coordinator_config(&config.coordinator)?;
    Ok(())
}

/// Validates worker configuration
fn validate_worker_config(config: &WorkerConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.api_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid api_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "api_url must use http or https, got '{}'",
            config.api_url
        )));
    }

    if let Some(worker_id) = &config.worker_id {
        if worker_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "worker_id cannot be empty".to_string(),
            ));
        }
    }

    check_range("parallel_sites", config.parallel_sites, 1, 256)?;
    check_range("concurrent", config.concurrent, 1, 500)?;
    check_range("max_pages", config.max_pages, 1, 1_000_000)?;
    check_range("batch_size", config.batch_size, 1, 1000)?;
    check_range("check_interval", config.check_interval, 1, 10_000)?;
    check_range("email_concurrency", config.email_concurrency, 1, 500)?;
    check_range("email_batch_size", config.email_batch_size, 1, 1000)?;

    let probe = config
        .email_url_template
        .replace(EMAIL_DOMAIN_PLACEHOLDER, "example.fr");
    if !config.email_url_template.contains(EMAIL_DOMAIN_PLACEHOLDER)
        || !matches!(Url::parse(&probe), Ok(url) if url.scheme() == "http" || url.scheme() == "https")
    {
        return Err(ConfigError::InvalidUrl(format!(
            "email_url_template must be an http(s) URL containing {}, got '{}'",
            EMAIL_DOMAIN_PLACEHOLDER, config.email_url_template
        )));
    }

    if config.heartbeat_interval_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "heartbeat_interval_ms must be >= 100ms, got {}ms",
            config.heartbeat_interval_ms
        )));
    }

    if config.request_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_ms must be >= 100ms, got {}ms",
            config.request_timeout_ms
        )));
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "poll_interval_ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates classifier configuration
fn validate_classifier_config(config: &ClassifierConfig) -> Result<(), ConfigError> {
    for tld in &config.allowed_tlds {
        let label = tld.strip_prefix('.').unwrap_or(tld);
        if label.is_empty() || !label.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '-')
        {
            return Err(ConfigError::InvalidPattern(format!(
                "Invalid TLD suffix '{}'",
                tld
            )));
        }
    }

    for domain in config.social_domains.iter().chain(&config.blacklist) {
        validate_domain_string(domain)?;
    }

    if config.excluded_patterns.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::InvalidPattern(
            "Exclusion pattern cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates coordinator configuration
fn validate_coordinator_config(config: &CoordinatorConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.bind.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Validation(format!(
            "bind must be a socket address (e.g. 0.0.0.0:8080), got '{}'",
            config.bind
        )));
    }

    check_range("max_batch_size", config.max_batch_size, 1, 1000)?;
    check_range("max_email_batch_size", config.max_email_batch_size, 1, 1000)?;
    Ok(())
}

fn check_range(name: &str, value: usize, min: usize, max: usize) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Validation(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

/// Validates a bare domain name such as `example.fr`
pub fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.fr')",
            domain
        )));
    }

    Ok(())
}
