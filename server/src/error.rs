use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use voice_core::{AudioError, PipelineError};

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Voice cloning system not ready")]
    NotReady,

    #[error("Failed to extract voice characteristics: {0}")]
    Extraction(String),

    #[error("Error uploading reference: {0}")]
    Upload(#[from] AudioError),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::NotReady => ApiError::NotReady,
            PipelineError::Extraction(e) => ApiError::Extraction(e.to_string()),
            PipelineError::Output(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
    code: u16,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_)
            | ApiError::Upload(
                AudioError::UnsupportedSampleRate(_) | AudioError::ReferenceTooLong { .. },
            ) => StatusCode::BAD_REQUEST,
            ApiError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Extraction(_) | ApiError::Upload(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Extraction(msg) => tracing::error!(stage = "extraction", "{}", msg),
            ApiError::Upload(e) => tracing::error!(stage = "upload", "{}", e),
            ApiError::InternalError(msg) => tracing::error!(stage = "internal", "{}", msg),
            _ => {}
        }

        let body = Json(ErrorResponse {
            success: false,
            message: self.to_string(),
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_core::ExtractionError;

    #[test]
    fn test_pipeline_errors_map_to_status_codes() {
        assert_eq!(
            ApiError::from(PipelineError::NotReady).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(PipelineError::Extraction(ExtractionError::EmptyWaveform)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::InvalidInput("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_unacceptable_uploads_are_client_errors() {
        assert_eq!(
            ApiError::from(AudioError::UnsupportedSampleRate(1)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AudioError::ReferenceTooLong { secs: 600.0 }).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AudioError::NoChannels).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages_are_readable() {
        let e = ApiError::from(PipelineError::Extraction(ExtractionError::EmptyWaveform));
        assert_eq!(
            e.to_string(),
            "Failed to extract voice characteristics: reference waveform is empty"
        );
        assert_eq!(ApiError::NotReady.to_string(), "Voice cloning system not ready");
    }
}
