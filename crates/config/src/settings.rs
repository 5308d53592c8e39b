//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Transcription engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_sessions".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "server.ws_path".to_string(),
                message: "must be an absolute path".to_string(),
            });
        }

        if !matches!(self.engine.device.as_str(), "auto" | "cpu" | "gpu") {
            return Err(ConfigError::InvalidValue {
                field: "engine.device".to_string(),
                message: format!(
                    "unknown device '{}', expected auto, cpu, or gpu",
                    self.engine.device
                ),
            });
        }

        // A sub-second inference deadline cannot fit even a tiny model pass.
        if self.engine.inference_timeout_ms > 0 && self.engine.inference_timeout_ms < 1000 {
            return Err(ConfigError::InvalidValue {
                field: "engine.inference_timeout_ms".to_string(),
                message: "must be 0 (disabled) or at least 1000".to_string(),
            });
        }

        if self.engine.load_timeout_ms > 0 && self.engine.load_timeout_ms < 1000 {
            return Err(ConfigError::InvalidValue {
                field: "engine.load_timeout_ms".to_string(),
                message: "must be 0 (disabled) or at least 1000".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket path for streaming sessions
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Maximum concurrent streaming sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle session timeout in seconds
    #[serde(default = "default_session_timeout")]
    pub session_timeout_seconds: u64,

    /// Interval between idle-session sweeps, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins; empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_ws_path() -> String {
    "/ws/stream".to_string()
}
fn default_max_sessions() -> usize {
    256
}
fn default_session_timeout() -> u64 {
    3600
}
fn default_sweep_interval() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            max_sessions: default_max_sessions(),
            session_timeout_seconds: default_session_timeout(),
            sweep_interval_seconds: default_sweep_interval(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum inbound messages per second per connection
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: u32,

    /// Maximum decoded audio bytes per second per connection
    #[serde(default = "default_audio_bytes_per_second")]
    pub audio_bytes_per_second: u32,

    /// Burst allowance (multiple of the steady rate)
    #[serde(default = "default_burst_multiplier")]
    pub burst_multiplier: f32,
}

fn default_messages_per_second() -> u32 {
    50
}
fn default_audio_bytes_per_second() -> u32 {
    // 16 kHz * 2 bytes, with generous headroom for container overhead
    256_000
}
fn default_burst_multiplier() -> f32 {
    2.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            messages_per_second: default_messages_per_second(),
            audio_bytes_per_second: default_audio_bytes_per_second(),
            burst_multiplier: default_burst_multiplier(),
        }
    }
}

/// Transcription engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding model artifacts
    #[serde(default = "default_models_dir")]
    pub models_dir: String,

    /// Model used by sessions that never send a config message
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Compute device: auto, cpu, or gpu
    #[serde(default = "default_device")]
    pub device: String,

    /// Load the default model at startup
    #[serde(default = "default_true")]
    pub preload_default: bool,

    /// Deadline for a single inference pass in milliseconds; 0 disables
    #[serde(default = "default_inference_timeout")]
    pub inference_timeout_ms: u64,

    /// Deadline for a model load in milliseconds; 0 disables
    #[serde(default = "default_load_timeout")]
    pub load_timeout_ms: u64,
}

fn default_models_dir() -> String {
    "models".to_string()
}
fn default_model() -> String {
    "base".to_string()
}
fn default_device() -> String {
    "auto".to_string()
}
fn default_inference_timeout() -> u64 {
    30_000
}
fn default_load_timeout() -> u64 {
    120_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            default_model: default_model(),
            device: default_device(),
            preload_default: default_true(),
            inference_timeout_ms: default_inference_timeout(),
            load_timeout_ms: default_load_timeout(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (`SCRIBE` prefix, `__` separator)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("SCRIBE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.engine.default_model, "base");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_sessions() {
        let mut settings = Settings::default();
        settings.server.max_sessions = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_device() {
        let mut settings = Settings::default();
        settings.engine.device = "tpu".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_sub_second_deadline() {
        let mut settings = Settings::default();
        settings.engine.inference_timeout_ms = 250;
        assert!(settings.validate().is_err());

        settings.engine.inference_timeout_ms = 0;
        assert!(settings.validate().is_ok());
    }
}
