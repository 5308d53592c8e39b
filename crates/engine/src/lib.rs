//! Streaming transcription engine
//!
//! This crate provides the model- and audio-side building blocks of the
//! streaming transcription server:
//! - Model identifiers and the shared model cache
//! - The inference backend boundary and its whisper implementation
//! - Off-loop execution of blocking inference calls
//! - Audio segment accumulation and the chunk-count trigger policy

pub mod accumulator;
pub mod backend;
pub mod cache;
pub mod codec;
pub mod executor;
pub mod model;
pub mod trigger;
pub mod whisper;

pub use accumulator::AudioAccumulator;
pub use backend::{InferenceBackend, InferenceOptions, ModelHandle, Quality};
pub use cache::ModelCache;
pub use codec::{decode_segment, CodecError, Resampler, TARGET_SAMPLE_RATE};
pub use executor::InferenceExecutor;
pub use model::{Device, ModelId};
pub use trigger::TriggerPolicy;
pub use whisper::WhisperBackend;

use thiserror::Error;

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("model '{requested}' is not available, choose from: {available}")]
    InvalidModel { requested: String, available: String },

    #[error("unknown compute device '{0}', expected auto, cpu, or gpu")]
    InvalidDevice(String),

    #[error("model load failed: {0}")]
    Load(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),
}
