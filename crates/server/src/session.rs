//! Streaming transcription session
//!
//! One session per connection. The session buffers inbound audio
//! segments, schedules transcription passes per the trigger policy
//! without blocking its message loop, dedups emitted text, and releases
//! its scratch state exactly once on teardown.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use scribe_engine::{
    AudioAccumulator, InferenceExecutor, InferenceOptions, ModelCache, ModelId, TriggerPolicy,
};

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection open, no config received yet
    Connecting,
    /// Configured and idle
    Ready,
    /// Accumulating audio chunks
    Buffering,
    /// At least one transcription pass scheduled
    Triggering,
    /// Tearing down: final pass and drain of in-flight passes
    Stopping,
    /// Terminal; scratch storage released
    Closed,
}

/// Outbound events, delivered to the transport layer via the session's
/// event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Status(String),
    Transcription(String),
    Error(String),
}

pub struct Session {
    pub id: String,
    state: RwLock<SessionState>,
    model_id: RwLock<ModelId>,
    language: RwLock<Option<String>>,
    chunk_count: AtomicU64,
    /// Chunk count at the moment the most recent pass was scheduled;
    /// gates the final pass on stop.
    chunks_at_last_pass: AtomicU64,
    last_emitted_text: Mutex<String>,
    accumulator: Mutex<AudioAccumulator>,
    trigger: TriggerPolicy,
    models: Arc<ModelCache>,
    executor: Arc<InferenceExecutor>,
    events: mpsc::Sender<SessionEvent>,
    /// In-flight transcription passes, drained deterministically on stop.
    passes: tokio::sync::Mutex<JoinSet<()>>,
    cleaned: AtomicBool,
    created_at: Instant,
    last_activity: RwLock<Instant>,
}

impl Session {
    pub(crate) fn new(
        id: impl Into<String>,
        model: ModelId,
        models: Arc<ModelCache>,
        executor: Arc<InferenceExecutor>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            id: id.into(),
            state: RwLock::new(SessionState::Connecting),
            model_id: RwLock::new(model),
            language: RwLock::new(None),
            chunk_count: AtomicU64::new(0),
            chunks_at_last_pass: AtomicU64::new(0),
            last_emitted_text: Mutex::new(String::new()),
            accumulator: Mutex::new(AudioAccumulator::new()),
            trigger: TriggerPolicy,
            models,
            executor,
            events,
            passes: tokio::sync::Mutex::new(JoinSet::new()),
            cleaned: AtomicBool::new(false),
            created_at: Instant::now(),
            last_activity: RwLock::new(Instant::now()),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn model(&self) -> ModelId {
        *self.model_id.read()
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunk_count.load(Ordering::SeqCst)
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }

    /// Apply a config message: update model and language, then resolve the
    /// model eagerly so the first pass is not delayed by a cold load.
    ///
    /// An unknown model name is reported and the previous model kept; a
    /// load failure is reported. Neither closes the session.
    pub async fn handle_config(&self, model: Option<&str>, language: Option<String>) {
        self.touch();
        self.advance_from_connecting();

        if let Some(lang) = language {
            tracing::info!(session = %self.id, language = %lang, "language configured");
            *self.language.write() = Some(lang);
        }

        if let Some(name) = model {
            match name.parse::<ModelId>() {
                Ok(id) => {
                    tracing::info!(session = %self.id, model = %id, "model configured");
                    *self.model_id.write() = id;
                }
                Err(e) => {
                    self.emit(SessionEvent::Error(e.to_string())).await;
                    return;
                }
            }
        }

        let id = self.model();
        match self.models.resolve(id).await {
            Ok(_) => {
                self.emit(SessionEvent::Status(format!("model '{}' loaded", id)))
                    .await;
            }
            Err(e) => {
                self.emit(SessionEvent::Error(format!(
                    "failed to load model '{}': {}",
                    id, e
                )))
                .await;
            }
        }
    }

    /// Ingest one decoded audio segment and schedule a transcription pass
    /// when the trigger policy fires. Never waits for inference; further
    /// chunks are accepted while passes are in flight.
    pub async fn handle_chunk(self: &Arc<Self>, data: Vec<u8>) {
        if matches!(self.state(), SessionState::Stopping | SessionState::Closed) {
            tracing::debug!(session = %self.id, "dropping chunk received after stop");
            return;
        }

        self.touch();
        self.accumulator.lock().append(data);
        let count = self.chunk_count.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.write() = SessionState::Buffering;

        if self.trigger.should_trigger(count) {
            self.chunks_at_last_pass.store(count, Ordering::SeqCst);
            self.schedule_pass().await;
        }
    }

    async fn schedule_pass(self: &Arc<Self>) {
        *self.state.write() = SessionState::Triggering;

        let session = Arc::clone(self);
        let mut passes = self.passes.lock().await;
        passes.spawn(async move {
            session.run_pass().await;
        });

        // Reap already-finished passes so the set does not grow for the
        // life of a long session.
        while let Some(result) = passes.try_join_next() {
            if let Err(e) = result {
                tracing::warn!(session = %self.id, error = %e, "transcription pass task failed");
            }
        }
    }

    /// One transcription pass over the full accumulator as of this moment.
    async fn run_pass(&self) {
        let model = self.model();
        let language = self.language.read().clone();

        let handle = match self.models.resolve(model).await {
            Ok(handle) => handle,
            Err(e) => {
                self.emit(SessionEvent::Error(format!("transcription failed: {}", e)))
                    .await;
                return;
            }
        };

        let audio = self.accumulator.lock().concatenate();
        if audio.is_empty() {
            return;
        }

        match self
            .executor
            .transcribe(handle, audio, InferenceOptions::streaming(language))
            .await
        {
            Ok(text) => self.emit_transcription(text).await,
            Err(e) => {
                self.emit(SessionEvent::Error(format!("transcription failed: {}", e)))
                    .await;
            }
        }
    }

    /// Emit a transcription unless it is empty or repeats the last one.
    async fn emit_transcription(&self, text: String) {
        let text = text.trim().to_string();
        {
            let mut last = self.last_emitted_text.lock();
            if text.is_empty() || *last == text {
                return;
            }
            *last = text.clone();
        }
        self.emit(SessionEvent::Transcription(text)).await;
    }

    /// Explicit stop: run a final pass when chunks arrived since the last
    /// scheduled pass, wait for every in-flight pass, then release.
    pub async fn stop(&self) {
        if self.state() == SessionState::Closed {
            return;
        }
        *self.state.write() = SessionState::Stopping;

        let count = self.chunk_count.load(Ordering::SeqCst);
        let needs_final = count > self.chunks_at_last_pass.load(Ordering::SeqCst)
            && !self.accumulator.lock().is_empty();
        if needs_final {
            self.chunks_at_last_pass.store(count, Ordering::SeqCst);
            self.run_pass().await;
        }

        self.drain_passes().await;
        self.cleanup();
    }

    /// Abnormal close (transport error): same release path as stop, but
    /// no final pass is attempted.
    pub async fn close_abnormal(&self) {
        if self.state() == SessionState::Closed {
            return;
        }
        *self.state.write() = SessionState::Stopping;

        self.drain_passes().await;
        self.cleanup();
    }

    async fn drain_passes(&self) {
        let mut passes = self.passes.lock().await;
        while let Some(result) = passes.join_next().await {
            if let Err(e) = result {
                tracing::warn!(session = %self.id, error = %e, "transcription pass task failed");
            }
        }
    }

    /// Release session resources. Idempotent and infallible: a second
    /// call is a no-op, and failures have nothing left to raise to.
    pub fn cleanup(&self) {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }

        self.accumulator.lock().clear();
        *self.state.write() = SessionState::Closed;

        tracing::info!(
            session = %self.id,
            chunks = self.chunk_count.load(Ordering::SeqCst),
            "session closed"
        );
    }

    fn advance_from_connecting(&self) {
        let mut state = self.state.write();
        if *state == SessionState::Connecting {
            *state = SessionState::Ready;
        }
    }

    async fn emit(&self, event: SessionEvent) {
        // The receiver disappears with the transport; nothing to do then.
        let _ = self.events.send(event).await;
    }
}
