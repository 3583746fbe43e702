//! Voice Turn Server
//!
//! Session registry plus the WebSocket and HTTP endpoints for the turn
//! orchestrator.

pub mod http;
pub mod metrics;
pub mod session;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use metrics::init_metrics;
pub use session::{SessionRegistry, SessionSummary};
pub use state::AppState;
pub use websocket::{WebSocketHandler, WsMessage};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use voice_turn_core::{Error, ErrorKind, ToolError};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session limit reached ({0})")]
    AtCapacity(usize),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Core(#[from] Error),
}

impl ServerError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::SessionNotFound(_) => ErrorKind::NotFound.as_str(),
            ServerError::AtCapacity(_) => "at_capacity",
            ServerError::InvalidRequest(_) => ErrorKind::Validation.as_str(),
            ServerError::Core(e) => e.kind().as_str(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::AtCapacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Core(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<ToolError> for ServerError {
    fn from(err: ToolError) -> Self {
        ServerError::Core(err.into())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(serde_json::json!({
            "error": self.kind(),
            "detail": self.to_string(),
        }));
        (status, body).into_response()
    }
}
