//! Shared error type for the gateway's HTTP-facing surfaces.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing authentication token")]
    NoToken,

    #[error("right-verifier unreachable: {0}")]
    RightVerifierUnreachable(String),

    #[error("upstream dial failed: {0}")]
    UpstreamUnreachable(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoToken => StatusCode::UNAUTHORIZED,
            Self::RightVerifierUnreachable(_) | Self::UpstreamUnreachable(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_name(&self) -> &'static str {
        match self {
            Self::NoToken => "NoToken",
            Self::RightVerifierUnreachable(_) => "RightVerifierUnreachable",
            Self::UpstreamUnreachable(_) => "UpstreamUnreachable",
            Self::Config(_) => "ConfigError",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_name = self.error_name();
        tracing::error!(error = %self, error_name, "gateway error");
        (
            status,
            Json(json!({ "error": error_name, "message": self.to_string() })),
        )
            .into_response()
    }
}
