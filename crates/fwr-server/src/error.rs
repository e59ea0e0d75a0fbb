//! Pipeline and HTTP error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Every way processing a firmware artifact can fail.
///
/// The `Display` text is what ends up in the `error` attribute of the
/// persisted error record.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Schema(String),

    #[error("manifest.json missing")]
    MissingManifest,

    #[error("Archive extraction failed: {0}")]
    Extraction(String),

    #[error("Missing file: {0}")]
    MissingFile(String),

    #[error("SHA256 mismatch for {name}: expected {expected}, got {actual}")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Processing exceeded the {0:?} invocation budget")]
    Timeout(Duration),

    #[error("Verification cancelled")]
    Cancelled,

    #[error("Scratch space error: {0}")]
    Scratch(#[from] std::io::Error),
}

impl PipelineError {
    pub fn storage(context: impl std::fmt::Display, err: anyhow::Error) -> Self {
        PipelineError::Storage(format!("{context}: {err:#}"))
    }

    pub fn persistence(context: impl std::fmt::Display, err: anyhow::Error) -> Self {
        PipelineError::Persistence(format!("{context}: {err:#}"))
    }

    /// Stable short name, used as a structured log field and in API bodies
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Schema(_) => "schema",
            PipelineError::MissingManifest => "missing_manifest",
            PipelineError::Extraction(_) => "extraction",
            PipelineError::MissingFile(_) => "missing_file",
            PipelineError::HashMismatch { .. } => "hash_mismatch",
            PipelineError::Storage(_) => "storage",
            PipelineError::Persistence(_) => "persistence",
            PipelineError::Timeout(_) => "timeout",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Scratch(_) => "scratch",
        }
    }

    /// True when the uploaded artifact itself is at fault rather than the
    /// infrastructure around it.
    pub fn is_artifact_fault(&self) -> bool {
        matches!(
            self,
            PipelineError::Schema(_)
                | PipelineError::MissingManifest
                | PipelineError::Extraction(_)
                | PipelineError::MissingFile(_)
                | PipelineError::HashMismatch { .. }
        )
    }
}

/// Errors surfaced by the HTTP ingress
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            AppError::Pipeline(e) if e.is_artifact_fault() => {
                tracing::warn!(kind = e.kind(), error = %e, "Artifact rejected");
                (StatusCode::UNPROCESSABLE_ENTITY, e.kind(), e.to_string())
            }
            AppError::Pipeline(e) => {
                tracing::error!(kind = e.kind(), error = %e, "Event processing failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.kind(), e.to_string())
            }
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message.clone()),
        };

        let body = Json(json!({
            "error": {
                "kind": kind,
                "message": message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_file() {
        let err = PipelineError::HashMismatch {
            name: "firmware.bin".to_string(),
            expected: "a".repeat(64),
            actual: "b".repeat(64),
        };
        assert!(err.to_string().starts_with("SHA256 mismatch for firmware.bin"));
        assert_eq!(PipelineError::MissingManifest.to_string(), "manifest.json missing");
        assert_eq!(
            PipelineError::MissingFile("boot/loader.bin".into()).to_string(),
            "Missing file: boot/loader.bin"
        );
    }

    #[test]
    fn test_artifact_faults() {
        assert!(PipelineError::MissingManifest.is_artifact_fault());
        assert!(PipelineError::Schema("x".into()).is_artifact_fault());
        assert!(!PipelineError::Storage("x".into()).is_artifact_fault());
        assert!(!PipelineError::Timeout(Duration::from_secs(1)).is_artifact_fault());
        assert!(!PipelineError::Cancelled.is_artifact_fault());
    }

    #[test]
    fn test_status_mapping() {
        let response = AppError::from(PipelineError::MissingManifest).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = AppError::from(PipelineError::Persistence("down".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = AppError::BadRequest("no records".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
