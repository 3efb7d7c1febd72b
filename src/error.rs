use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::warn;
use serde::Serialize;
use serde_json::json;

use crate::provider::CaptionError;

/// Echoed in place of the request URL when it could not be determined
pub const UNKNOWN_URL: &str = "unknown";

/// Failures while turning a URL into a transcript
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("invalid YouTube URL")]
    InvalidUrl,

    #[error(transparent)]
    TranscriptUnavailable(CaptionError),

    #[error("{0}")]
    UnexpectedFailure(String),
}

impl From<CaptionError> for TranscriptError {
    fn from(e: CaptionError) -> Self {
        if e.is_unavailable() {
            TranscriptError::TranscriptUnavailable(e)
        } else {
            TranscriptError::UnexpectedFailure(e.to_string())
        }
    }
}

/// Which endpoint flavour a usage example should describe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    Query,
    Body,
}

impl Usage {
    fn example(self) -> serde_json::Value {
        match self {
            Usage::Query => json!("/api/transcript?url=https://youtube.com/watch?v=VIDEO_ID&lang=pl"),
            Usage::Body => json!({"url": "https://youtube.com/watch?v=VIDEO_ID", "language": "pl"}),
        }
    }
}

/// Errors surfaced at the HTTP boundary
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{}", missing_input_message(.0))]
    MissingInput(Usage),

    #[error("invalid JSON body: {0}")]
    MalformedRequestBody(#[source] serde_json::Error),

    #[error("Error: {source}")]
    Transcript {
        url: String,
        #[source]
        source: TranscriptError,
    },

    #[error("not found: {0}")]
    NotFound(String),
}

fn missing_input_message(usage: &Usage) -> &'static str {
    match usage {
        Usage::Query => "missing 'url' parameter",
        Usage::Body => "missing 'url' field in JSON body",
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    example: Option<serde_json::Value>,
}

impl ApiError {
    pub fn failed(url: impl Into<String>, source: impl Into<TranscriptError>) -> Self {
        ApiError::Transcript {
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingInput(_) | ApiError::MalformedRequestBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Transcript { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn body(&self) -> ErrorBody {
        let (url, example) = match self {
            ApiError::MissingInput(usage) => (None, Some(usage.example())),
            ApiError::Transcript { url, .. } => (Some(url.clone()), None),
            ApiError::MalformedRequestBody(_) | ApiError::NotFound(_) => (None, None),
        };
        ErrorBody {
            error: self.to_string(),
            url,
            example,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("{} {}", self.status().as_u16(), self);
        (self.status(), Json(self.body())).into_response()
    }
}
