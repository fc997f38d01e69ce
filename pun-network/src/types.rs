//! Crate-level error type for configuration and startup.

use punster_agent::PunsterError;

use crate::registry::RegistryError;
use crate::schedule::ScheduleError;

/// Error types for setting up the network.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid reset schedule
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Invalid channel catalog
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Punster client could not be built
    #[error("Punster client error: {0}")]
    Punster(#[from] PunsterError),

    /// Config file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for network setup.
pub type Result<T> = std::result::Result<T, NetworkError>;
