//! Error taxonomy for proxied traffic.
//!
//! Every failure is local to the request or session that produced it. Nothing
//! here is ever retried: a signed trading request that is replayed can execute
//! a financial operation twice.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Dial or connect failure towards an upstream, REST or WebSocket.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Inbound request could not be upgraded to a WebSocket session.
    #[error("websocket upgrade failed: {0}")]
    UpgradeFailure(String),

    /// I/O or protocol failure on an established relay session.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Invalid configuration detected at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ProxyError {
    fn status(&self) -> StatusCode {
        match self {
            ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpgradeFailure(_) => StatusCode::BAD_REQUEST,
            ProxyError::Transport(_) | ProxyError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ProxyError::UpstreamUnreachable(_) => "Upstream request failed",
            ProxyError::UpgradeFailure(_) => "WebSocket upgrade failed",
            _ => "Internal server error",
        };
        (status, body).into_response()
    }
}
