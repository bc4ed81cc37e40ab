use crate::types::GrantView;
use auth_grants::{Grant, GrantError};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Cache policy for rejected input; the same input will be rejected again.
pub const CACHE_BAD_REQUEST: &str = "public, max-age=60";
/// Cache policy for negative answers and failures.
pub const CACHE_NEGATIVE: &str = "public, max-age=5";
/// Cache policy for a positive check.
pub const CACHE_POSITIVE: &str = "public, max-age=1";

/// Main API error enum
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { message: String },

    #[error("forbidden")]
    Forbidden,

    #[error("duplicate grant")]
    Conflict { conflicting: Box<Grant> },

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("{message}")]
    Internal { message: String },
}

/// Body sent with a 409.
#[derive(Debug, Serialize)]
struct ConflictBody {
    error: &'static str,
    conflicting: GrantView,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn cache_control(&self) -> &'static str {
        match self {
            ApiError::BadRequest { .. } | ApiError::MethodNotAllowed => CACHE_BAD_REQUEST,
            _ => CACHE_NEGATIVE,
        }
    }
}

impl From<GrantError> for ApiError {
    fn from(err: GrantError) -> Self {
        match err {
            GrantError::InvalidArgument(message) => ApiError::BadRequest { message },
            GrantError::DuplicateGrant { conflicting } => ApiError::Conflict { conflicting },
            other => {
                error!("Grant engine failure: {}", other);
                ApiError::internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let cache_control = HeaderValue::from_static(self.cache_control());

        let mut response = match self {
            ApiError::Conflict { conflicting } => {
                let body = ConflictBody {
                    error: "duplicate grant",
                    conflicting: GrantView::from(*conflicting),
                };
                (status, Json(body)).into_response()
            }
            other => (
                status,
                [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
                other.to_string(),
            )
                .into_response(),
        };
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, cache_control);
        response
    }
}
