use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors returned to API clients.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("invalid value for query parameter `{name}`: {reason}")]
    InvalidQueryParameter { name: &'static str, reason: String },
    #[error("no probe target given and none configured")]
    MissingProbeTarget,
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidQueryParameter { .. } => "invalid_query_parameter",
            Self::MissingProbeTarget => "missing_probe_target",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}
