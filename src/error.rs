//! Error types for the OCR gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::capability::{Language, Modality};
use crate::pool::WorkerKey;

/// Gateway-wide result type
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway error type
///
/// `Clone` so that one load outcome can be handed to every caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Invalid language code: {0}")]
    InvalidLanguage(String),

    #[error("Invalid modality: {0}")]
    InvalidModality(String),

    #[error("No model for {modality} {language} text at version {version}")]
    NoModelForCombination {
        modality: Modality,
        language: Language,
        version: String,
    },

    #[error("Unknown model version: {0}")]
    UnknownVersion(String),

    #[error("Worker {key} not ready after {secs} seconds")]
    LoadTimeout { key: WorkerKey, secs: u64 },

    #[error("Failed to load worker {key}: {reason}")]
    LoadFailed { key: WorkerKey, reason: String },

    #[error("Error while decoding and saving image #{0}")]
    ImageTransferError(usize),

    #[error("Error while parsing the OCR output: {0}")]
    OutputParseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl GatewayError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidLanguage(_) => StatusCode::BAD_REQUEST,
            Self::InvalidModality(_) => StatusCode::BAD_REQUEST,
            Self::NoModelForCombination { .. } => StatusCode::BAD_REQUEST,
            Self::UnknownVersion(_) => StatusCode::BAD_REQUEST,
            Self::ImageTransferError(_) => StatusCode::BAD_REQUEST,
            Self::LoadTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::LoadFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::OutputParseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidLanguage(_) => "INVALID_LANGUAGE",
            Self::InvalidModality(_) => "INVALID_MODALITY",
            Self::NoModelForCombination { .. } => "NO_MODEL_FOR_COMBINATION",
            Self::UnknownVersion(_) => "UNKNOWN_VERSION",
            Self::LoadTimeout { .. } => "LOAD_TIMEOUT",
            Self::LoadFailed { .. } => "LOAD_FAILED",
            Self::ImageTransferError(_) => "IMAGE_TRANSFER_ERROR",
            Self::OutputParseError(_) => "OUTPUT_PARSE_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}
