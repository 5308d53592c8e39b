//! Whisper inference backend
//!
//! Production [`InferenceBackend`] over whisper.cpp via `whisper-rs`.
//! Model artifacts are ggml files looked up under a models directory.

use std::path::PathBuf;
use std::sync::Arc;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::backend::{InferenceBackend, InferenceOptions, ModelHandle, Quality};
use crate::codec::TARGET_SAMPLE_RATE;
use crate::model::{Device, ModelId};
use crate::EngineError;

/// Buffers shorter than this are treated as silence rather than handed to
/// the model, which rejects sub-100ms input.
const MIN_SAMPLES: usize = TARGET_SAMPLE_RATE as usize / 10;

pub struct WhisperBackend {
    models_dir: PathBuf,
}

impl WhisperBackend {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }
}

impl InferenceBackend for WhisperBackend {
    fn load(&self, model: ModelId, device: Device) -> Result<Arc<dyn ModelHandle>, EngineError> {
        let path = self.models_dir.join(model.file_name());
        if !path.exists() {
            return Err(EngineError::Load(format!(
                "model file not found: {}",
                path.display()
            )));
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| EngineError::Load(format!("non-UTF-8 model path: {}", path.display())))?;

        let mut params = WhisperContextParameters::default();
        params.use_gpu(device.use_gpu());

        let context = WhisperContext::new_with_params(path_str, params)
            .map_err(|e| EngineError::Load(format!("failed to load '{}': {}", model, e)))?;

        Ok(Arc::new(WhisperModel {
            context,
            model,
            device,
        }))
    }
}

struct WhisperModel {
    context: WhisperContext,
    model: ModelId,
    device: Device,
}

impl ModelHandle for WhisperModel {
    fn model_id(&self) -> ModelId {
        self.model
    }

    fn device(&self) -> Device {
        self.device
    }

    fn transcribe(&self, audio: &[f32], options: &InferenceOptions) -> Result<String, EngineError> {
        if audio.len() < MIN_SAMPLES {
            return Ok(String::new());
        }

        let mut state = self
            .context
            .create_state()
            .map_err(|e| EngineError::Inference(format!("failed to create state: {}", e)))?;

        let strategy = match options.quality {
            Quality::Streaming => SamplingStrategy::Greedy { best_of: 1 },
            Quality::Accurate => SamplingStrategy::BeamSearch {
                beam_size: 5,
                patience: 1.0,
            },
        };

        let mut params = FullParams::new(strategy);
        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_translate(false);
        if let Some(lang) = options.language.as_deref() {
            params.set_language(Some(lang));
        }

        state
            .full(params, audio)
            .map_err(|e| EngineError::Inference(e.to_string()))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| EngineError::Inference(e.to_string()))?;

        let mut text = String::new();
        for i in 0..num_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| EngineError::Inference(e.to_string()))?;
            text.push_str(&segment);
        }

        Ok(strip_noise_markers(&text))
    }
}

/// Remove bracketed non-speech markers the model emits on silence or
/// background noise, e.g. `[BLANK_AUDIO]` or `(upbeat music)`.
fn strip_noise_markers(text: &str) -> String {
    let mut text = text.trim().to_string();

    while let Some(start) = text.find(|c| c == '[' || c == '(') {
        if let Some(end) = text[start..].find(|c| c == ']' || c == ')') {
            text.replace_range(start..start + end + 1, "");
        } else {
            break;
        }
    }

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_model_file() {
        let backend = WhisperBackend::new("/nonexistent/models");
        let err = backend.load(ModelId::Tiny, Device::Cpu).err().unwrap();
        assert!(matches!(err, EngineError::Load(_)));
        assert!(err.to_string().contains("ggml-tiny.bin"));
    }

    #[test]
    fn test_strip_noise_markers() {
        assert_eq!(strip_noise_markers("[BLANK_AUDIO]"), "");
        assert_eq!(strip_noise_markers("hello (coughs) world"), "hello  world");
        assert_eq!(strip_noise_markers("  plain text  "), "plain text");
    }
}
