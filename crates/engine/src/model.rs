//! Model identifiers and compute devices

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// The fixed set of supported model tiers, fastest to most accurate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelId {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelId {
    /// All supported model tiers, in tier order.
    pub const ALL: [ModelId; 5] = [
        ModelId::Tiny,
        ModelId::Base,
        ModelId::Small,
        ModelId::Medium,
        ModelId::Large,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Tiny => "tiny",
            ModelId::Base => "base",
            ModelId::Small => "small",
            ModelId::Medium => "medium",
            ModelId::Large => "large",
        }
    }

    /// Model artifact file name under the models directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            ModelId::Tiny => "ggml-tiny.bin",
            ModelId::Base => "ggml-base.bin",
            ModelId::Small => "ggml-small.bin",
            ModelId::Medium => "ggml-medium.bin",
            ModelId::Large => "ggml-large-v3.bin",
        }
    }

    /// Comma-separated list of valid model names, for error messages.
    pub fn available_names() -> String {
        Self::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tiny" => Ok(ModelId::Tiny),
            "base" => Ok(ModelId::Base),
            "small" => Ok(ModelId::Small),
            "medium" => Ok(ModelId::Medium),
            "large" => Ok(ModelId::Large),
            other => Err(EngineError::InvalidModel {
                requested: other.to_string(),
                available: ModelId::available_names(),
            }),
        }
    }
}

/// Compute device a model is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Prefer GPU when the backend supports it
    Auto,
    Cpu,
    Gpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cpu => "cpu",
            Device::Gpu => "gpu",
        }
    }

    /// Whether the backend should attempt GPU acceleration.
    pub fn use_gpu(&self) -> bool {
        matches!(self, Device::Auto | Device::Gpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "gpu" => Ok(Device::Gpu),
            other => Err(EngineError::InvalidDevice(other.to_string())),
        }
    }
}
