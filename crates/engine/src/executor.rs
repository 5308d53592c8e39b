//! Inference executor
//!
//! Runs blocking transcription calls off the session's message loop. The
//! call is dispatched to the blocking pool and joined asynchronously so
//! other sessions, and further messages on the same session, keep making
//! progress while inference runs.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{InferenceOptions, ModelHandle};
use crate::EngineError;

pub struct InferenceExecutor {
    timeout: Option<Duration>,
}

impl InferenceExecutor {
    /// `timeout` bounds a single transcription call; `None` waits
    /// indefinitely. On expiry the blocking call keeps running on its
    /// worker thread, but the caller is released.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub async fn transcribe(
        &self,
        handle: Arc<dyn ModelHandle>,
        audio: Vec<f32>,
        options: InferenceOptions,
    ) -> Result<String, EngineError> {
        let task = tokio::task::spawn_blocking(move || handle.transcribe(&audio, &options));

        let joined = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, task)
                .await
                .map_err(|_| EngineError::Timeout(timeout.as_millis() as u64))?,
            None => task.await,
        };

        joined.map_err(|e| EngineError::Inference(format!("inference task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Device, ModelId};
    use std::time::Duration;

    struct StubHandle {
        text: &'static str,
        delay: Duration,
    }

    impl ModelHandle for StubHandle {
        fn model_id(&self) -> ModelId {
            ModelId::Tiny
        }

        fn device(&self) -> Device {
            Device::Cpu
        }

        fn transcribe(&self, _: &[f32], _: &InferenceOptions) -> Result<String, EngineError> {
            std::thread::sleep(self.delay);
            Ok(self.text.to_string())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_transcribe_returns_backend_text() {
        let executor = InferenceExecutor::new(None);
        let handle = Arc::new(StubHandle {
            text: "hello world",
            delay: Duration::ZERO,
        });

        let text = executor
            .transcribe(handle, vec![0.0; 16], InferenceOptions::streaming(None))
            .await
            .unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_expires() {
        let executor = InferenceExecutor::new(Some(Duration::from_millis(30)));
        let handle = Arc::new(StubHandle {
            text: "too late",
            delay: Duration::from_millis(300),
        });

        let err = executor
            .transcribe(handle, vec![0.0; 16], InferenceOptions::streaming(None))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout(30)));
    }
}
