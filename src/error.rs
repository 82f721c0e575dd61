//! Closed error taxonomy shared by every pipeline stage and HTTP handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Result alias used across the library.
pub type AppResult<T> = Result<T, AppError>;

/// Failure kinds surfaced by the assistant.
///
/// Each kind maps to a distinct HTTP status so callers can tell a broken
/// index from an unreachable model without parsing messages.
#[derive(Debug, Error)]
pub enum AppError {
    /// Knowledge-base or resume content could not be read or was empty.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// The persisted vector index is missing, corrupt or incompatible.
    #[error("index error: {0}")]
    Index(String),

    /// Embedding or search failed while narrowing retrieved context.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The language model was unreachable or returned nothing usable.
    #[error("model call failed: {0}")]
    Model(String),

    /// Audio conversion, transcription or synthesis failed.
    #[error("audio processing failed: {0}")]
    Audio(String),

    /// The caller sent something malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Startup configuration is missing or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Stable machine-readable label for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ingestion(_) => "ingestion",
            Self::Index(_) => "index",
            Self::Retrieval(_) => "retrieval",
            Self::Model(_) => "model",
            Self::Audio(_) => "audio",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Config(_) => "config",
        }
    }

    /// HTTP status reported for this kind.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Ingestion(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Index(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Retrieval(_) | Self::Model(_) | Self::Audio(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Wraps an upstream error chain as a retrieval failure.
    pub fn retrieval(err: anyhow::Error) -> Self {
        Self::Retrieval(format!("{err:#}"))
    }

    /// Wraps an upstream error chain as a model failure.
    pub fn model(err: anyhow::Error) -> Self {
        Self::Model(format!("{err:#}"))
    }

    /// Wraps an upstream error chain as an audio failure.
    pub fn audio(err: anyhow::Error) -> Self {
        Self::Audio(format!("{err:#}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "{self}");
        } else {
            tracing::warn!(kind = self.kind(), "{self}");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_distinct_statuses() {
        assert_eq!(
            AppError::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Ingestion("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AppError::Model("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::Index("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn wrapped_chains_keep_context() {
        let err = anyhow::anyhow!("connection refused").context("failed to call Gemini");
        let wrapped = AppError::model(err);
        assert_eq!(wrapped.kind(), "model");
        assert!(wrapped.to_string().contains("connection refused"));
        assert!(wrapped.to_string().contains("failed to call Gemini"));
    }
}
