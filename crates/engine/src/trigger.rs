//! Chunk-count trigger policy
//!
//! Decides when to schedule a transcription pass: once on the very first
//! chunk for early feedback, then every third chunk to bound inference
//! frequency while keeping perceived latency low. Purely a function of the
//! running chunk count; no timers and no audio-duration awareness.

/// Chunks between scheduled passes after the first.
const TRIGGER_INTERVAL: u64 = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerPolicy;

impl TriggerPolicy {
    /// Whether a pass should be scheduled after receiving chunk `chunk_count`.
    ///
    /// `chunk_count` is 1-based; a count of zero never triggers.
    pub fn should_trigger(&self, chunk_count: u64) -> bool {
        chunk_count == 1 || (chunk_count > 0 && chunk_count % TRIGGER_INTERVAL == 0)
    }
}
