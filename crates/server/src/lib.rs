//! StreamScribe server
//!
//! WebSocket streaming sessions and the HTTP surface around them.

pub mod http;
pub mod rate_limit;
pub mod registry;
pub mod session;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use rate_limit::{RateLimitError, RateLimiter};
pub use registry::SessionRegistry;
pub use session::{Session, SessionEvent, SessionState};
pub use state::AppState;
pub use websocket::WsHandler;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("session error: {0}")]
    Session(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("engine error: {0}")]
    Engine(#[from] scribe_engine::EngineError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Engine(_) => axum::http::StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
