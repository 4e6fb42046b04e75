//! Error handling - one hierarchy for the whole gateway

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Counter Bridge error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (bad broker spec, invalid simulator config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shared memory errors (shmget/shmat failures)
    #[error("Shared memory error: {0}")]
    Shm(String),

    /// Wire-format layout mismatch against the legacy ABI
    #[error("Layout error: {0}")]
    Layout(String),

    /// Broker plugin errors (not logged in, send failure)
    #[error("Broker error: {0}")]
    Broker(String),

    /// Risk pre-check rejections
    #[error("Risk error: {0}")]
    Risk(String),

    /// Invalid state transitions (cancel of a filled order, double login)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O errors (position snapshot file, config file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML config parse errors
    #[error("Config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
