use crate::config::types::{Config, FetcherConfig, RenderConfig, StorageConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_storage_config(&config.storage)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_render_config(&config.render)?;
    Ok(())
}

/// Validates artifact store and retention limits
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.artifact_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "artifact_dir cannot be empty".to_string(),
        ));
    }

    if config.retention_minutes < 1 {
        return Err(ConfigError::Validation(format!(
            "retention_minutes must be >= 1, got {}",
            config.retention_minutes
        )));
    }

    if config.max_storage_mb < 1 {
        return Err(ConfigError::Validation(format!(
            "max_storage_mb must be >= 1, got {}",
            config.max_storage_mb
        )));
    }

    if !(config.low_watermark > 0.0 && config.low_watermark <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "low_watermark must be in (0, 1], got {}",
            config.low_watermark
        )));
    }

    if config.sweep_interval_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "sweep_interval_secs must be >= 1, got {}",
            config.sweep_interval_secs
        )));
    }

    Ok(())
}

/// Validates HTTP fetcher limits
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 || config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "fetcher timeouts must be >= 1s, got request={} connect={}",
            config.request_timeout_secs, config.connect_timeout_secs
        )));
    }

    if config.max_concurrent_assets < 1 || config.max_concurrent_assets > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_assets must be between 1 and 64, got {}",
            config.max_concurrent_assets
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

fn validate_render_config(config: &RenderConfig) -> Result<(), ConfigError> {
    if config.navigation_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "navigation_timeout_secs must be >= 1, got {}",
            config.navigation_timeout_secs
        )));
    }

    if config.settle_millis >= config.navigation_timeout_secs * 1000 {
        return Err(ConfigError::Validation(format!(
            "settle_millis ({}) must be shorter than the navigation timeout ({}s)",
            config.settle_millis, config.navigation_timeout_secs
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

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
