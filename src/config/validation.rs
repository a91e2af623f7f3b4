use std::collections::HashSet;

use super::{AppConfig, ConfigError};

const VALID_LOG_LEVELS: &[&str] = &[
    "TRACE", "DEBUG", "INFO", "WARN", "WARNING", "ERROR", "CRITICAL", "DISABLED",
];

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_transport(config)?;
    validate_endpoints(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_transport(config: &AppConfig) -> Result<(), ConfigError> {
    let transport = &config.transport;
    if transport.connect_timeout_secs == 0 {
        return Err(validation_err(
            "transport.connect_timeout_secs must be greater than 0",
        ));
    }
    if transport.pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "transport.pool_max_idle_per_host must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_endpoints(config: &AppConfig) -> Result<(), ConfigError> {
    if config.endpoints.is_empty() {
        return Err(validation_err("endpoints cannot be empty"));
    }

    let mut names = HashSet::new();
    let mut default_count = 0;
    for endpoint in &config.endpoints {
        if endpoint.name.trim().is_empty() {
            return Err(validation_err("endpoint name cannot be empty"));
        }
        if !names.insert(endpoint.name.as_str()) {
            return Err(validation_err(format!(
                "duplicate endpoint name '{}'",
                endpoint.name
            )));
        }
        let url = url::Url::parse(&endpoint.url).map_err(|e| {
            validation_err(format!(
                "endpoint '{}' has an invalid url: {e}",
                endpoint.name
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(validation_err(format!(
                "endpoint '{}' url must use http or https, got '{}'",
                endpoint.name,
                url.scheme()
            )));
        }
        if endpoint.is_default {
            default_count += 1;
        }
    }

    if default_count > 1 {
        return Err(validation_err(
            "at most one endpoint can be marked is_default",
        ));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {}, got '{}'",
            VALID_LOG_LEVELS.join(", "),
            config.log_level
        )));
    }
    Ok(())
}
