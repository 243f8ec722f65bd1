//! Layered configuration for the orchestrator: defaults, then an optional TOML
//! file, then `GPU_ORCH__`-prefixed environment overrides.

pub mod settings;

pub use settings::{
    AvatarConfig, AvatarEntry, EngineConfig, GpuSlotConfig, GpuTopology, PathsConfig,
    RuntimeEnvironment, Settings, load_settings,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("failed to parse configuration: {0}")]
    ParseError(String),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
    #[error("environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(path) => ConfigError::FileNotFound(path),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}
