//! Configuration for the Pun Distribution Network.

use punster_agent::HttpBackend;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::registry::{validate_catalog, ChannelSpec};
use crate::schedule::CronSchedule;
use crate::types::{NetworkError, Result};

/// Environment variable overriding the Punster API base URL.
pub const API_URL_ENV: &str = "PUNSTER_API_URL";
/// Environment variable overriding the Punster API token.
pub const API_TOKEN_ENV: &str = "PUNSTER_API_TOKEN";

/// Configuration for a network instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Immunity ledger configuration
    pub ledger: LedgerConfig,
    /// Retry configuration for Punster calls
    pub retry: RetryConfig,
    /// Channel catalog, in declaration order
    pub channels: Vec<ChannelSpec>,
    /// Report renderer configuration
    pub renderer: RendererConfig,
    /// Punster API connection
    pub punster: PunsterConfig,
    /// General settings
    pub general: GeneralConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            retry: RetryConfig::default(),
            channels: ChannelSpec::default_catalog(),
            renderer: RendererConfig::default(),
            punster: PunsterConfig::default(),
            general: GeneralConfig::default(),
        }
    }
}

impl NetworkConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load and validate config from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Override Punster settings from `PUNSTER_API_URL` / `PUNSTER_API_TOKEN`.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Override Punster settings from an arbitrary variable source.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.is_empty()) {
            self.punster.api_url = Some(url);
        }
        if let Some(token) = lookup(API_TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.punster.api_token = Some(token);
        }
    }

    /// Punster API client for the configured URL, `None` if no URL is set.
    pub fn http_backend(&self) -> Result<Option<HttpBackend>> {
        let Some(url) = &self.punster.api_url else {
            return Ok(None);
        };
        let token = self.punster.api_token.as_deref().ok_or_else(|| {
            NetworkError::Config(format!("{} is required when using the Punster API", API_TOKEN_ENV))
        })?;

        Ok(Some(HttpBackend::new(url.clone(), token)?))
    }

    /// Parsed reset schedule.
    pub fn reset_schedule(&self) -> Result<CronSchedule> {
        Ok(CronSchedule::parse(&self.ledger.reset_schedule)?)
    }

    /// Check the schedule, catalog and renderer layout.
    pub fn validate(&self) -> Result<()> {
        self.reset_schedule()?;

        if self.channels.is_empty() {
            return Err(NetworkError::Config("channel catalog is empty".to_string()));
        }
        validate_catalog(&self.channels)?;

        if self.renderer.width < RendererConfig::MIN_WIDTH {
            return Err(NetworkError::Config(format!(
                "renderer width {} is below the minimum of {}",
                self.renderer.width,
                RendererConfig::MIN_WIDTH
            )));
        }
        if self.renderer.bar_length == 0 {
            return Err(NetworkError::Config("renderer bar_length must be positive".to_string()));
        }

        Ok(())
    }
}

/// Immunity ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Cron expression for clearing all balances (UTC)
    pub reset_schedule: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            reset_schedule: CronSchedule::DAILY_MIDNIGHT.to_string(),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Additional attempts after the first failure
    pub max_retries: u32,
    /// Base delay between retries (ms), multiplied by the retry number
    pub retry_delay_ms: u64,
    /// Timeout for a single attempt (ms)
    pub attempt_timeout_ms: u64,
    /// Retry schema-invalid responses like transport failures
    pub retry_malformed: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 250,
            attempt_timeout_ms: 30_000,
            retry_malformed: false,
        }
    }
}

/// Report renderer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Line width in columns
    pub width: usize,
    /// Progress bar cells
    pub bar_length: usize,
}

impl RendererConfig {
    /// Narrowest supported layout.
    pub const MIN_WIDTH: usize = 40;
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 80,
            bar_length: 20,
        }
    }
}

/// Punster API connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PunsterConfig {
    /// Base URL of the Punster API
    pub api_url: Option<String>,
    /// Bearer token
    pub api_token: Option<String>,
}

/// General settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use punster_agent::ChannelType;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.ledger.reset_schedule, "0 0 * * *");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.renderer.width, 80);
        assert_eq!(config.renderer.bar_length, 20);
        assert_eq!(config.channels.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
ledger:
  reset_schedule: "30 3 * * 1"
retry:
  max_retries: 5
channels:
  - channel_type: CarRide
    receptivity: 70
    cooldown_secs: 600
"#;
        let config = NetworkConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.ledger.reset_schedule, "30 3 * * 1");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.retry_delay_ms, 250);
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.channels[0].channel_type, ChannelType::CarRide);
        assert_eq!(config.general.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = NetworkConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(NetworkConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = NetworkConfig::default();
        config.ledger.reset_schedule = "every midnight".to_string();
        assert!(matches!(config.validate(), Err(NetworkError::Schedule(_))));

        let mut config = NetworkConfig::default();
        config.channels.push(ChannelSpec::default_catalog()[0].clone());
        assert!(matches!(config.validate(), Err(NetworkError::Registry(_))));

        let mut config = NetworkConfig::default();
        config.channels.clear();
        assert!(matches!(config.validate(), Err(NetworkError::Config(_))));

        let mut config = NetworkConfig::default();
        config.renderer.width = 10;
        assert!(matches!(config.validate(), Err(NetworkError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (API_URL_ENV, "https://punster.example"),
            (API_TOKEN_ENV, ""),
        ]
        .into_iter()
        .collect();

        let mut config = NetworkConfig::default();
        config.punster.api_token = Some("from-file".to_string());
        config.apply_env_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.punster.api_url.as_deref(), Some("https://punster.example"));
        assert_eq!(config.punster.api_token.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_http_backend_from_punster_section() {
        let mut config = NetworkConfig::default();
        assert!(config.http_backend().unwrap().is_none());

        config.punster.api_url = Some("https://punster.example/".to_string());
        assert!(matches!(config.http_backend(), Err(NetworkError::Config(_))));

        config.punster.api_token = Some("secret".to_string());
        let backend = config.http_backend().unwrap().unwrap();
        assert_eq!(backend.base_url(), "https://punster.example");

        config.punster.api_url = Some("not a url".to_string());
        assert!(matches!(config.http_backend(), Err(NetworkError::Punster(_))));
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            NetworkConfig::from_file("/nonexistent/pun-network.yaml"),
            Err(NetworkError::Io(_))
        ));
    }
}
