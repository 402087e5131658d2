use crate::config::types::{AuditConfig, Config, CrawlerConfig, RendererConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_renderer_config(&config.renderer)?;
    validate_audit_config(&config.audit)?;

    if config.server.screenshot_dir.is_empty() {
        return Err(ConfigError::Validation(
            "screenshot_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.navigation_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "navigation_timeout_secs must be >= 1, got {}",
            config.navigation_timeout_secs
        )));
    }

    if config.batch_timeout_secs < config.navigation_timeout_secs {
        return Err(ConfigError::Validation(format!(
            "batch_timeout_secs ({}) must be >= navigation_timeout_secs ({})",
            config.batch_timeout_secs, config.navigation_timeout_secs
        )));
    }

    Ok(())
}

/// Validates renderer configuration
fn validate_renderer_config(config: &RendererConfig) -> Result<(), ConfigError> {
    if config.pool_size < 1 || config.pool_size > 10 {
        return Err(ConfigError::Validation(format!(
            "pool_size must be between 1 and 10, got {}",
            config.pool_size
        )));
    }

    Ok(())
}

/// Validates audit configuration
fn validate_audit_config(config: &AuditConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.attempt_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "attempt_timeout_secs must be >= 1, got {}",
            config.attempt_timeout_secs
        )));
    }

    if config.engine_global.is_empty() {
        return Err(ConfigError::Validation(
            "engine_global cannot be empty".to_string(),
        ));
    }

    if config.rules.is_empty() {
        return Err(ConfigError::Validation(
            "audit rules cannot be empty".to_string(),
        ));
    }

    Ok(())
}
