use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pricelens_ocr::PipelineError;
use serde::Serialize;
use tracing::{info, warn};

/// Everything a handler can fail with, mapped to a status code at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed request fields. Never retried.
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::InvalidInput(message) | ApiError::PayloadTooLarge(message) => ErrorBody {
                error: message.clone(),
                details: None,
            },
            ApiError::Pipeline(e) => {
                let error = match e {
                    PipelineError::Preprocess(_) => "Image preprocessing failed",
                    PipelineError::EngineInit(_) => "Recognition engine unavailable",
                    PipelineError::Recognition(_) => "OCR failed",
                };
                ErrorBody { error: error.to_string(), details: Some(e.details()) }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(%status, error = %self, "Request failed");
        } else {
            info!(%status, error = %self, "Request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}
