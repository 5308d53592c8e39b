//! HTTP endpoints
//!
//! Health and model introspection, one-shot transcription, and the
//! WebSocket upgrade for streaming sessions.

use std::time::Instant;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use scribe_engine::{decode_segment, InferenceOptions, ModelId};

use crate::state::AppState;
use crate::websocket::{decode_chunk_payload, WsHandler};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let ws_path = state.config.server.ws_path.clone();

    Router::new()
        .route("/health", get(health_check))
        .route("/models", get(list_models))
        .route("/api/transcribe", post(transcribe))
        .route(&ws_path, get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state))
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    if !state.config.server.cors_enabled {
        return CorsLayer::new();
    }

    let origins: Vec<axum::http::HeaderValue> = state
        .config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Health check
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let model_status = if state.models.is_loaded(state.default_model) {
        "loaded"
    } else {
        "not loaded"
    };

    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model_status": model_status,
        "device": state.models.device().as_str(),
        "sessions": state.registry.count(),
    }))
}

/// List supported models and their load state
async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let loaded = state.models.loaded();
    let models: Vec<_> = ModelId::ALL
        .iter()
        .map(|id| {
            serde_json::json!({
                "id": id.as_str(),
                "loaded": loaded.contains(id),
            })
        })
        .collect();

    Json(serde_json::json!({ "available_models": models }))
}

#[derive(Debug, Deserialize)]
struct TranscribeRequest {
    audio_data: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Serialize)]
struct TranscribeResponse {
    text: String,
    model: ModelId,
    processing_ms: u64,
}

type ErrorResponse = (StatusCode, Json<serde_json::Value>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ErrorResponse {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

/// One-shot full-quality transcription.
///
/// Unlike streaming passes this uses beam-search decoding, but it resolves
/// its model through the same shared cache.
async fn transcribe(
    State(state): State<AppState>,
    Json(request): Json<TranscribeRequest>,
) -> Result<Json<TranscribeResponse>, ErrorResponse> {
    let model = match request.model.as_deref() {
        Some(name) => name
            .parse::<ModelId>()
            .map_err(|e| error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?,
        None => state.default_model,
    };

    let bytes = decode_chunk_payload(&request.audio_data)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("invalid audio data: {}", e)))?;

    let audio = decode_segment(&bytes)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("could not decode audio: {}", e)))?;

    let handle = state
        .models
        .resolve(model)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let started = Instant::now();
    let text = state
        .executor
        .transcribe(handle, audio, InferenceOptions::accurate(request.language))
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(TranscribeResponse {
        text,
        model,
        processing_ms: started.elapsed().as_millis() as u64,
    }))
}

/// WebSocket handler wrapper
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    WsHandler::handle(ws, State(state)).await
}
