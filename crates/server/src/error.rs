use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cinepost_core::error::{ApiError, ErrorEnvelope};
use cinepost_metadata::CascadeError;

/// Newtype wrapper so we can implement `IntoResponse` in this crate.
///
/// `details` lands in the envelope's `error.details` object.
pub struct AppError {
    pub error: ApiError,
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut envelope = ErrorEnvelope::from(&self.error);
        if let Some(details) = self.details {
            envelope = envelope.with_details(details);
        }
        (status, Json(envelope)).into_response()
    }
}

impl From<ApiError> for AppError {
    fn from(error: ApiError) -> Self {
        Self {
            error,
            details: None,
        }
    }
}

impl From<CascadeError> for AppError {
    fn from(e: CascadeError) -> Self {
        let message = e.to_string();
        match e {
            CascadeError::NotConfigured { advisories, .. } => Self {
                error: ApiError::NotConfigured(message),
                details: Some(serde_json::json!({ "advisories": advisories })),
            },
            CascadeError::Exhausted(failure) => Self {
                error: ApiError::ProvidersExhausted(message),
                details: Some(serde_json::json!({
                    "attempts": failure.attempts,
                    "advisories": failure.advisories,
                })),
            },
        }
    }
}
