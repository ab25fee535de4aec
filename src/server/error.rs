use crate::error::MathGenError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::any::Any;
use thiserror::Error;

/// Every failure an API route can answer with.
///
/// Rendered as JSON `{error, details?, latexCode?, texUrl?}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    /// The model produced LaTeX but the compiler rejected it. The source is
    /// still downloadable.
    #[error("LaTeX compilation failed")]
    CompileFailed {
        details: String,
        latex_code: String,
        tex_url: String,
    },

    /// Upstream or pipeline failure surfaced with its own message.
    #[error("{0}")]
    Processing(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    latex_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tex_url: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::CompileFailed { .. } | ApiError::Processing(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<MathGenError> for ApiError {
    fn from(e: MathGenError) -> Self {
        if e.is_client_error() {
            ApiError::BadRequest(e.to_string())
        } else {
            ApiError::Processing(e.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}: {}", status, self);
        } else {
            tracing::warn!("{}: {}", status, self);
        }

        let error = self.to_string();
        let body = match self {
            ApiError::CompileFailed {
                details,
                latex_code,
                tex_url,
            } => ErrorBody {
                error,
                details: Some(details),
                latex_code: Some(latex_code),
                tex_url: Some(tex_url),
            },
            _ => ErrorBody {
                error,
                details: None,
                latex_code: None,
                tex_url: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// A handler panicked: log the payload, answer with the usual JSON 500.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else {
        "non-string panic payload"
    };
    tracing::error!("Request handler panicked: {}", detail);
    ApiError::Internal("Internal server error".to_string()).into_response()
}
