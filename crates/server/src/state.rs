//! Application state
//!
//! Shared state across all handlers.

use std::sync::Arc;
use std::time::Duration;

use scribe_config::Settings;
use scribe_engine::{Device, InferenceBackend, InferenceExecutor, ModelCache, ModelId};

use crate::registry::SessionRegistry;
use crate::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub registry: Arc<SessionRegistry>,
    pub models: Arc<ModelCache>,
    pub executor: Arc<InferenceExecutor>,
    pub default_model: ModelId,
}

impl AppState {
    /// Build the shared state from validated settings and an inference
    /// backend.
    pub fn new(config: Settings, backend: Arc<dyn InferenceBackend>) -> Result<Self, ServerError> {
        let default_model: ModelId = config.engine.default_model.parse()?;
        let device: Device = config.engine.device.parse()?;

        let models = Arc::new(
            ModelCache::new(backend, device)
                .with_load_timeout(timeout_from_ms(config.engine.load_timeout_ms)),
        );
        let executor = Arc::new(InferenceExecutor::new(timeout_from_ms(
            config.engine.inference_timeout_ms,
        )));

        let registry = Arc::new(
            SessionRegistry::new(
                Arc::clone(&models),
                Arc::clone(&executor),
                default_model,
                config.server.max_sessions,
            )
            .with_timeouts(
                Duration::from_secs(config.server.session_timeout_seconds),
                Duration::from_secs(config.server.sweep_interval_seconds),
            ),
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            models,
            executor,
            default_model,
        })
    }
}

fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_engine::WhisperBackend;

    #[test]
    fn test_state_from_default_settings() {
        let state = AppState::new(Settings::default(), Arc::new(WhisperBackend::new("models")));
        assert!(state.is_ok());
        assert_eq!(state.unwrap().default_model, ModelId::Base);
    }

    #[test]
    fn test_state_rejects_unknown_default_model() {
        let mut settings = Settings::default();
        settings.engine.default_model = "enormous".to_string();
        let state = AppState::new(settings, Arc::new(WhisperBackend::new("models")));
        assert!(state.is_err());
    }
}
