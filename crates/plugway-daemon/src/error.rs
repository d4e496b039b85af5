//! API error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use plugway_core::ControlError;
use plugway_discovery::{ResolveError, ScanError};
use serde_json::json;
use tracing::warn;

/// Errors surfaced to HTTP callers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("Scan is already in progress. Try again later.")]
    ScanInProgress,

    #[error("Scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Resolve(ResolveError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Resolve(ResolveError::Unreachable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Resolve(ResolveError::Catalog(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Control(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ScanInProgress => StatusCode::BAD_REQUEST,
            Self::Scan(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Resolve(e) => e.kind(),
            Self::Control(_) => "DeviceControlError",
            Self::ScanInProgress => "ScanAlreadyInProgress",
            Self::Scan(_) => "ScanFailed",
            Self::Internal(_) => "InternalError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        if let Self::Control(e) = &self {
            body["reason"] = json!(e.kind());
        }

        if status.is_server_error() {
            warn!(kind = self.kind(), error = %self, "Request failed");
        }

        (status, Json(body)).into_response()
    }
}
