use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use melo_core::SynthError;
use serde::Serialize;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthError),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Synthesis(e) if e.is_input_error() => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Synthesis(e) => {
                tracing::error!("Synthesis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Synthesis error: {}", e))
            }
            ApiError::ModelUnavailable(msg) => {
                tracing::warn!("Model unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
