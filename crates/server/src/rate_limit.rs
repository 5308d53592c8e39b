//! Per-connection rate limiting
//!
//! A token bucket over inbound messages and decoded audio bytes. Buckets
//! refill continuously and start with burst headroom, so a client can
//! front-load a few chunks without tripping the limiter.

use std::time::Instant;

use thiserror::Error;

use scribe_config::RateLimitConfig;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("message rate exceeded")]
    Messages,

    #[error("audio byte rate exceeded")]
    AudioBytes,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    message_tokens: f64,
    audio_tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let burst = config.burst_multiplier as f64;
        Self {
            message_tokens: config.messages_per_second as f64 * burst,
            audio_tokens: config.audio_bytes_per_second as f64 * burst,
            last_refill: Instant::now(),
            config,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }

        let burst = self.config.burst_multiplier as f64;
        let message_cap = self.config.messages_per_second as f64 * burst;
        let audio_cap = self.config.audio_bytes_per_second as f64 * burst;

        self.message_tokens =
            (self.message_tokens + elapsed * self.config.messages_per_second as f64).min(message_cap);
        self.audio_tokens =
            (self.audio_tokens + elapsed * self.config.audio_bytes_per_second as f64).min(audio_cap);
        self.last_refill = now;
    }

    /// Account one inbound message.
    pub fn check_message(&mut self) -> Result<(), RateLimitError> {
        if !self.config.enabled {
            return Ok(());
        }

        self.refill();
        if self.message_tokens >= 1.0 {
            self.message_tokens -= 1.0;
            Ok(())
        } else {
            Err(RateLimitError::Messages)
        }
    }

    /// Account one audio chunk of `bytes` decoded bytes.
    pub fn check_audio(&mut self, bytes: usize) -> Result<(), RateLimitError> {
        if !self.config.enabled {
            return Ok(());
        }

        self.refill();
        let bytes = bytes as f64;
        if self.audio_tokens >= bytes {
            self.audio_tokens -= bytes;
            Ok(())
        } else {
            Err(RateLimitError::AudioBytes)
        }
    }
}
