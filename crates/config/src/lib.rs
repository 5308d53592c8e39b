//! Configuration for the StreamScribe server
//!
//! Settings are layered: built-in defaults, then `config/default.yaml`,
//! then an environment-specific file, then `SCRIBE__*` environment
//! variables.

pub mod settings;

pub use settings::{
    load_settings, EngineConfig, ObservabilityConfig, RateLimitConfig, ServerConfig, Settings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
