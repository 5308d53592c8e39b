//! WebSocket transport for streaming sessions
//!
//! One session per connection. The receive loop never waits on
//! inference: chunk handling appends synchronously and passes run on the
//! blocking pool, so further messages keep flowing while transcription is
//! in flight.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::rate_limit::RateLimiter;
use crate::session::{Session, SessionEvent};
use crate::state::AppState;

/// WebSocket message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Session configuration
    Config {
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        language: Option<String>,
    },
    /// One audio segment, base64 encoded
    AudioChunk { data: String },
    /// End the session after a final transcription pass
    Stop,
    /// Status update
    Status { message: String },
    /// Transcription result
    Transcription { text: String },
    /// Error report
    Error { message: String },
}

impl From<SessionEvent> for WsMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Status(message) => WsMessage::Status { message },
            SessionEvent::Transcription(text) => WsMessage::Transcription { text },
            SessionEvent::Error(message) => WsMessage::Error { message },
        }
    }
}

type WsSender = Arc<tokio::sync::Mutex<futures::stream::SplitSink<WebSocket, Message>>>;

/// WebSocket handler
pub struct WsHandler;

impl WsHandler {
    /// Handle WebSocket upgrade: register a session for the connection.
    pub async fn handle(
        ws: WebSocketUpgrade,
        State(state): State<AppState>,
    ) -> Result<Response, axum::http::StatusCode> {
        let (session, events) = state
            .registry
            .create()
            .map_err(|_| axum::http::StatusCode::SERVICE_UNAVAILABLE)?;

        let limiter = RateLimiter::new(state.config.server.rate_limit.clone());

        Ok(ws.on_upgrade(move |socket| Self::handle_socket(socket, session, state, events, limiter)))
    }

    async fn handle_socket(
        socket: WebSocket,
        session: Arc<Session>,
        state: AppState,
        mut events: mpsc::Receiver<SessionEvent>,
        mut limiter: RateLimiter,
    ) {
        let (sender, mut receiver) = socket.split();
        let sender: WsSender = Arc::new(tokio::sync::Mutex::new(sender));

        let _ = send(
            &sender,
            WsMessage::Status {
                message: "connected".to_string(),
            },
        )
        .await;

        // Forward session events to the client until the session's event
        // channel closes.
        let forwarder = {
            let sender = Arc::clone(&sender);
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    if send(&sender, event.into()).await.is_err() {
                        break;
                    }
                }
            })
        };

        let mut stopped = false;

        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if limiter.check_message().is_err() {
                        tracing::warn!(session = %session.id, "message rate limit exceeded");
                        let _ = send(
                            &sender,
                            WsMessage::Error {
                                message: "message rate limit exceeded".to_string(),
                            },
                        )
                        .await;
                        continue;
                    }

                    let parsed: WsMessage = match serde_json::from_str(&text) {
                        Ok(message) => message,
                        Err(e) => {
                            // Malformed message: report and carry on.
                            let _ = send(
                                &sender,
                                WsMessage::Error {
                                    message: format!("invalid message: {}", e),
                                },
                            )
                            .await;
                            continue;
                        }
                    };

                    match parsed {
                        WsMessage::Config { model, language } => {
                            session.handle_config(model.as_deref(), language).await;
                        }
                        WsMessage::AudioChunk { data } => match decode_chunk_payload(&data) {
                            Ok(bytes) => {
                                if limiter.check_audio(bytes.len()).is_err() {
                                    tracing::warn!(
                                        session = %session.id,
                                        bytes = bytes.len(),
                                        "audio rate limit exceeded"
                                    );
                                    let _ = send(
                                        &sender,
                                        WsMessage::Error {
                                            message: "audio rate limit exceeded".to_string(),
                                        },
                                    )
                                    .await;
                                    continue;
                                }
                                session.handle_chunk(bytes).await;
                            }
                            Err(e) => {
                                let _ = send(
                                    &sender,
                                    WsMessage::Error {
                                        message: format!("invalid audio chunk: {}", e),
                                    },
                                )
                                .await;
                            }
                        },
                        WsMessage::Stop => {
                            session.stop().await;
                            stopped = true;
                            break;
                        }
                        // Outbound-only types are not valid from clients.
                        WsMessage::Status { .. }
                        | WsMessage::Transcription { .. }
                        | WsMessage::Error { .. } => {
                            let _ = send(
                                &sender,
                                WsMessage::Error {
                                    message: "unexpected message type".to_string(),
                                },
                            )
                            .await;
                        }
                    }
                }
                Ok(Message::Ping(data)) => {
                    let _ = sender.lock().await.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {} // binary and pong frames are not part of the protocol
                Err(e) => {
                    tracing::warn!(session = %session.id, error = %e, "websocket transport error");
                    break;
                }
            }
        }

        if !stopped {
            session.close_abnormal().await;
        }

        let session_id = session.id.clone();
        state.registry.remove(&session_id);

        // Dropping the last session handle closes its event channel, which
        // lets the forwarder flush remaining events and exit.
        drop(session);
        let _ = forwarder.await;

        tracing::info!(session = %session_id, "connection closed");
    }
}

async fn send(sender: &WsSender, message: WsMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(&message)
        .map_err(|e| axum::Error::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    sender.lock().await.send(Message::Text(json)).await
}

/// Decode a chunk payload, tolerating `data:` URL prefixes from browser
/// recorders (`data:audio/wav;base64,...`).
pub(crate) fn decode_chunk_payload(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let encoded = match data.rsplit_once(',') {
        Some((_, tail)) => tail,
        None => data,
    };
    BASE64.decode(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_message() {
        let message: WsMessage =
            serde_json::from_str(r#"{"type":"config","model":"tiny","language":"en"}"#).unwrap();
        assert!(matches!(
            message,
            WsMessage::Config { model: Some(m), language: Some(l) } if m == "tiny" && l == "en"
        ));
    }

    #[test]
    fn test_parse_config_without_fields() {
        let message: WsMessage = serde_json::from_str(r#"{"type":"config"}"#).unwrap();
        assert!(matches!(
            message,
            WsMessage::Config {
                model: None,
                language: None
            }
        ));
    }

    #[test]
    fn test_parse_stop_message() {
        let message: WsMessage = serde_json::from_str(r#"{"type":"stop"}"#).unwrap();
        assert!(matches!(message, WsMessage::Stop));
    }

    #[test]
    fn test_serialize_transcription_event() {
        let json = serde_json::to_string(&WsMessage::Transcription {
            text: "hello".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"transcription","text":"hello"}"#);
    }

    #[test]
    fn test_decode_plain_base64_payload() {
        let encoded = BASE64.encode(b"raw audio");
        assert_eq!(decode_chunk_payload(&encoded).unwrap(), b"raw audio");
    }

    #[test]
    fn test_decode_data_url_payload() {
        let encoded = format!("data:audio/wav;base64,{}", BASE64.encode(b"raw audio"));
        assert_eq!(decode_chunk_payload(&encoded).unwrap(), b"raw audio");
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        assert!(decode_chunk_payload("!!not base64!!").is_err());
    }
}
