//! Inference backend boundary
//!
//! The acoustic model is an opaque capability behind two object-safe
//! traits: a backend that loads models, and the loaded handle that runs
//! transcription. Both calls are blocking; callers dispatch them to the
//! blocking pool (see [`crate::cache::ModelCache`] and
//! [`crate::executor::InferenceExecutor`]).

use std::sync::Arc;

use crate::model::{Device, ModelId};
use crate::EngineError;

/// Decoding effort for a transcription call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// Greedy decoding, tuned for short low-latency streaming passes
    Streaming,
    /// Beam search, for one-shot full-quality transcription
    Accurate,
}

/// Options for a single transcription call.
#[derive(Debug, Clone)]
pub struct InferenceOptions {
    /// Language hint (ISO 639-1 code); autodetect when absent
    pub language: Option<String>,
    pub quality: Quality,
}

impl InferenceOptions {
    /// Low-latency options for streaming passes.
    pub fn streaming(language: Option<String>) -> Self {
        Self {
            language,
            quality: Quality::Streaming,
        }
    }

    /// Full-quality options for one-shot transcription.
    pub fn accurate(language: Option<String>) -> Self {
        Self {
            language,
            quality: Quality::Accurate,
        }
    }
}

/// An opaque loaded model, bound to a compute device and ready for use.
pub trait ModelHandle: Send + Sync {
    fn model_id(&self) -> ModelId;

    fn device(&self) -> Device;

    /// Transcribe a mono f32 buffer at [`crate::codec::TARGET_SAMPLE_RATE`].
    ///
    /// Blocking; run on the blocking pool.
    fn transcribe(&self, audio: &[f32], options: &InferenceOptions) -> Result<String, EngineError>;
}

/// Loads models. Loading is expensive (possibly multi-second) and blocking.
pub trait InferenceBackend: Send + Sync {
    fn load(&self, model: ModelId, device: Device) -> Result<Arc<dyn ModelHandle>, EngineError>;
}
