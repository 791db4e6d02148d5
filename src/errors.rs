// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::retry::{FailureClass, Retryable, classify};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LuxeError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No API key has been configured for this session")]
    MissingApiKey,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error{}: {message}", status_suffix(.status))]
    Upstream { status: Option<u16>, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("The model response contained no image")]
    NoImageReturned,

    #[error("The video job finished without a video")]
    NoVideoReturned,

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

const REGION_UNSUPPORTED_SIGNATURES: &[&str] = &[
    "location is not supported",
    "unsupported region",
    "region not supported",
    "not available in your country",
];

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl LuxeError {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        LuxeError::Upstream {
            status,
            message: message.into(),
        }
    }

    /// True for failures caused by the backend refusing the caller's region.
    pub fn is_region_unsupported(&self) -> bool {
        let text = self.to_string().to_lowercase();
        REGION_UNSUPPORTED_SIGNATURES
            .iter()
            .any(|signature| text.contains(signature))
    }

    /// Message stored on an asset when a generation fails.
    pub fn user_message(&self) -> String {
        if self.is_region_unsupported() {
            return "The image service is not available from your current network region. \
                    Check your network connection or switch networks, then try again."
                .to_string();
        }
        match self {
            LuxeError::MissingApiKey => {
                "Select an API key before generating images.".to_string()
            }
            LuxeError::NoImageReturned => {
                "The model did not return an image. Try again or adjust your feedback.".to_string()
            }
            LuxeError::NoVideoReturned => {
                "The video service finished without returning a video. Please try again."
                    .to_string()
            }
            _ => "Generation failed. Please try again.".to_string(),
        }
    }
}

impl Retryable for LuxeError {
    fn is_retryable(&self) -> bool {
        match self {
            LuxeError::Upstream { status, message } => {
                classify(*status, message) == FailureClass::Retryable
            }
            LuxeError::Transport(message) => classify(None, message) == FailureClass::Retryable,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for LuxeError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => LuxeError::upstream(Some(status.as_u16()), err.to_string()),
            None if err.is_decode() => {
                LuxeError::Transport(format!("Failed to parse response stream: {err}"))
            }
            None => LuxeError::Transport(format!("Network request failed: {err}")),
        }
    }
}

impl From<serde_json::Error> for LuxeError {
    fn from(err: serde_json::Error) -> Self {
        LuxeError::Serialization(err.to_string())
    }
}

impl ResponseError for LuxeError {
    fn error_response(&self) -> HttpResponse {
        match self {
            LuxeError::Validation(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Validation error",
                "message": self.to_string()
            })),
            LuxeError::MissingApiKey => HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "API key required",
                "message": self.to_string()
            })),
            LuxeError::NotFound(_) => HttpResponse::NotFound().json(serde_json::json!({
                "error": "Not found",
                "message": self.to_string()
            })),
            LuxeError::Upstream { .. }
            | LuxeError::Transport(_)
            | LuxeError::NoImageReturned
            | LuxeError::NoVideoReturned => {
                HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "error": "AI service error",
                    "message": self.user_message()
                }))
            }
            LuxeError::ImageProcessing(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Image processing error",
                "message": self.to_string()
            })),
            LuxeError::Serialization(_) | LuxeError::Config(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Internal error",
                    "message": self.to_string()
                }))
            }
        }
    }
}
