//! Shared model cache
//!
//! Process-wide cache of loaded model handles, shared by every session.
//! Loads are single-flighted per model id: concurrent first requests for
//! one id pay the load cost once, while loads of distinct ids proceed
//! independently. The map lock is only ever held to fetch or insert a
//! cell, never across a load.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::backend::{InferenceBackend, ModelHandle};
use crate::model::{Device, ModelId};
use crate::EngineError;

type HandleCell = Arc<OnceCell<Arc<dyn ModelHandle>>>;

pub struct ModelCache {
    backend: Arc<dyn InferenceBackend>,
    device: Device,
    load_timeout: Option<Duration>,
    entries: Mutex<HashMap<ModelId, HandleCell>>,
}

impl ModelCache {
    pub fn new(backend: Arc<dyn InferenceBackend>, device: Device) -> Self {
        Self {
            backend,
            device,
            load_timeout: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Apply a deadline to each model load; `None` waits indefinitely.
    pub fn with_load_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Return the cached handle for `model`, loading it first if needed.
    ///
    /// A failed load leaves no cache entry, so a later resolve retries.
    pub async fn resolve(&self, model: ModelId) -> Result<Arc<dyn ModelHandle>, EngineError> {
        let cell = {
            let mut entries = self.entries.lock();
            entries
                .entry(model)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let handle = cell
            .get_or_try_init(|| self.load(model))
            .await?;

        Ok(Arc::clone(handle))
    }

    async fn load(&self, model: ModelId) -> Result<Arc<dyn ModelHandle>, EngineError> {
        tracing::info!(model = %model, device = %self.device, "loading model");
        let started = Instant::now();

        let backend = Arc::clone(&self.backend);
        let device = self.device;
        let task = tokio::task::spawn_blocking(move || backend.load(model, device));

        let joined = match self.load_timeout {
            Some(timeout) => tokio::time::timeout(timeout, task)
                .await
                .map_err(|_| EngineError::Timeout(timeout.as_millis() as u64))?,
            None => task.await,
        };

        let handle = joined.map_err(|e| EngineError::Load(format!("load task failed: {}", e)))??;

        tracing::info!(
            model = %model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model loaded"
        );

        Ok(handle)
    }

    pub fn is_loaded(&self, model: ModelId) -> bool {
        self.entries
            .lock()
            .get(&model)
            .is_some_and(|cell| cell.initialized())
    }

    /// Model ids with a materialized handle.
    pub fn loaded(&self) -> Vec<ModelId> {
        let entries = self.entries.lock();
        ModelId::ALL
            .into_iter()
            .filter(|id| entries.get(id).is_some_and(|cell| cell.initialized()))
            .collect()
    }

    /// Drop every cached handle so backing resources can be reclaimed.
    ///
    /// Safe with sessions in flight: a pass keeps its already-borrowed
    /// handle alive through its own `Arc`; any subsequent resolve reloads
    /// from scratch.
    pub fn release_all(&self) {
        let released = {
            let mut entries = self.entries.lock();
            let count = entries.values().filter(|cell| cell.initialized()).count();
            entries.clear();
            count
        };
        tracing::info!(released, "released cached model handles");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InferenceOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubModel {
        id: ModelId,
    }

    impl ModelHandle for StubModel {
        fn model_id(&self) -> ModelId {
            self.id
        }

        fn device(&self) -> Device {
            Device::Cpu
        }

        fn transcribe(&self, _: &[f32], _: &InferenceOptions) -> Result<String, EngineError> {
            Ok(String::new())
        }
    }

    struct StubBackend {
        loads: AtomicUsize,
        delay: Duration,
        slow_model: Option<ModelId>,
        fail: bool,
    }

    impl StubBackend {
        fn new(delay: Duration) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                delay,
                slow_model: None,
                fail: false,
            }
        }

        /// Delay only loads of `model`; other ids load instantly.
        fn slow_for(model: ModelId, delay: Duration) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                delay,
                slow_model: Some(model),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                loads: AtomicUsize::new(0),
                delay: Duration::ZERO,
                slow_model: None,
                fail: true,
            }
        }
    }

    impl InferenceBackend for StubBackend {
        fn load(&self, model: ModelId, _: Device) -> Result<Arc<dyn ModelHandle>, EngineError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.slow_model.is_none() || self.slow_model == Some(model) {
                std::thread::sleep(self.delay);
            }
            if self.fail {
                return Err(EngineError::Load("stub load failure".to_string()));
            }
            Ok(Arc::new(StubModel { id: model }))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolves_load_once() {
        let backend = Arc::new(StubBackend::new(Duration::from_millis(50)));
        let cache = Arc::new(ModelCache::new(backend.clone(), Device::Cpu));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move { cache.resolve(ModelId::Base).await }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
        for pair in handles.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_models_load_independently() {
        let backend = Arc::new(StubBackend::slow_for(ModelId::Large, Duration::from_millis(400)));
        let cache = Arc::new(ModelCache::new(backend.clone(), Device::Cpu));

        // Start the slow load, then resolve a different id; the second
        // resolve must not wait for the first to finish.
        let slow = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.resolve(ModelId::Large).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let quick = tokio::time::timeout(Duration::from_millis(150), cache.resolve(ModelId::Tiny))
            .await
            .expect("resolve of a different model id was blocked by an unrelated load");
        assert!(quick.is_ok());

        assert!(slow.await.unwrap().is_ok());
        assert_eq!(backend.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_release_all_forces_reload() {
        let backend = Arc::new(StubBackend::new(Duration::ZERO));
        let cache = ModelCache::new(backend.clone(), Device::Cpu);

        cache.resolve(ModelId::Base).await.unwrap();
        assert!(cache.is_loaded(ModelId::Base));

        cache.release_all();
        assert!(!cache.is_loaded(ModelId::Base));
        assert!(cache.loaded().is_empty());

        cache.resolve(ModelId::Base).await.unwrap();
        assert_eq!(backend.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_load_is_retried() {
        let backend = Arc::new(StubBackend::failing());
        let cache = ModelCache::new(backend.clone(), Device::Cpu);

        assert!(cache.resolve(ModelId::Base).await.is_err());
        assert!(!cache.is_loaded(ModelId::Base));

        assert!(cache.resolve(ModelId::Base).await.is_err());
        assert_eq!(backend.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_load_deadline() {
        let backend = Arc::new(StubBackend::new(Duration::from_millis(300)));
        let cache = ModelCache::new(backend, Device::Cpu)
            .with_load_timeout(Some(Duration::from_millis(30)));

        let err = cache.resolve(ModelId::Base).await.err().unwrap();
        assert!(matches!(err, EngineError::Timeout(_)));
    }
}
