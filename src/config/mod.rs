pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;
use crate::protocol::WireFormat;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Unknown endpoint '{name}'; available: {available}")]
    UnknownEndpoint { name: String, available: String },
}

/// HTTP client settings shared by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Whole-request timeout in seconds; `0` disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
    #[serde(default)]
    pub use_env_proxy: bool,
}

fn default_timeout_secs() -> u64 {
    180
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_pool_max_idle_per_host() -> usize {
    4
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            use_env_proxy: false,
        }
    }
}

/// A chat service that streams responses in one wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    #[serde(default)]
    pub format: WireFormat,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_default: bool,
}

impl EndpointConfig {
    /// `name (format): description`, or `name (format)` without a description.
    #[must_use]
    pub fn summary(&self) -> String {
        let description = self.description.trim();
        if description.is_empty() {
            format!("{} ({})", self.name, self.format)
        } else {
            format!("{} ({}): {description}", self.name, self.format)
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Leading system message for new conversations.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub transport: TransportConfig,
    pub endpoints: Vec<EndpointConfig>,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl AppConfig {
    /// Resolve an endpoint by name, or the default endpoint when `name` is `None`.
    ///
    /// The default is the endpoint marked `is_default`, else the first one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownEndpoint`] when no endpoint has that name.
    pub fn endpoint(&self, name: Option<&str>) -> Result<&EndpointConfig, ConfigError> {
        match name {
            Some(name) => self
                .endpoints
                .iter()
                .find(|endpoint| endpoint.name == name)
                .ok_or_else(|| ConfigError::UnknownEndpoint {
                    name: name.to_string(),
                    available: self
                        .endpoints
                        .iter()
                        .map(EndpointConfig::summary)
                        .collect::<Vec<_>>()
                        .join("; "),
                }),
            None => self
                .endpoints
                .iter()
                .find(|endpoint| endpoint.is_default)
                .or_else(|| self.endpoints.first())
                .ok_or_else(|| ConfigError::Validation("no endpoints configured".into())),
        }
    }
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "
endpoints:
  - name: deepseek
    url: https://api.glyphscript.site/chat/stream
";

    #[test]
    fn test_load_example_config() {
        // The example config should load and validate successfully
        let config = load_config("config.example.yaml");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.log_level, "INFO");
        assert_eq!(config.transport.timeout_secs, 180);
        assert!(config.endpoints.len() >= 2);
        let default = config.endpoint(None).unwrap();
        assert_eq!(default.format, WireFormat::Delta);
        assert_eq!(
            config.endpoint(Some("weather-agent")).unwrap().format,
            WireFormat::Multiplexed
        );
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.log_level, "INFO");
        assert!(config.system_prompt.is_none());
        assert_eq!(config.transport.connect_timeout_secs, 5);
        assert!(!config.transport.use_env_proxy);
        assert_eq!(config.endpoints[0].format, WireFormat::Delta);
        assert!(!config.endpoints[0].is_default);
    }

    #[test]
    fn test_default_endpoint_falls_back_to_first() {
        let config = parse_config(
            "
endpoints:
  - name: a
    url: http://localhost:1/a
  - name: b
    format: multiplexed
    url: http://localhost:1/b
",
        )
        .unwrap();
        assert_eq!(config.endpoint(None).unwrap().name, "a");
    }

    #[test]
    fn test_explicit_default_endpoint_wins() {
        let config = parse_config(
            "
endpoints:
  - name: a
    url: http://localhost:1/a
  - name: b
    format: multiplexed
    url: http://localhost:1/b
    is_default: true
",
        )
        .unwrap();
        assert_eq!(config.endpoint(None).unwrap().name, "b");
    }

    #[test]
    fn test_unknown_endpoint_name() {
        let config = parse_config(MINIMAL).unwrap();
        let err = config.endpoint(Some("missing")).unwrap_err();
        assert!(matches!(&err, ConfigError::UnknownEndpoint { name, .. } if name == "missing"));
        assert_eq!(
            err.to_string(),
            "Unknown endpoint 'missing'; available: deepseek (delta)"
        );
    }

    #[test]
    fn test_endpoint_summary_includes_description() {
        let config = load_config("config.example.yaml").unwrap();
        assert_eq!(
            config.endpoint(Some("weather-agent")).unwrap().summary(),
            "weather-agent (multiplexed): Agent with tool calls"
        );
        let err = config.endpoint(Some("nope")).unwrap_err().to_string();
        assert!(err.contains("deepseek (delta): DeepSeek chat"));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = parse_config(
            "
endpoints:
  - name: a
    format: websocket
    url: http://localhost:1/a
",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config("does-not-exist.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
