use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON envelope for every API answer. Exactly one of `data` and `error` is set.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
    pub meta: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::envelope(Some(data), None, None)
    }

    pub fn success_with_meta(data: T, meta: Value) -> Self {
        Self::envelope(Some(data), None, Some(meta))
    }

    fn envelope(data: Option<T>, error: Option<ErrorBody>, meta: Option<Value>) -> Self {
        Self {
            success: error.is_none(),
            data,
            error,
            meta,
            timestamp: Utc::now(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        let error = ErrorBody {
            code: code.to_string(),
            message: message.into(),
        };
        Self::envelope(None, Some(error), None)
    }
}

/// What a handler can fail with. Catalog errors convert via `From`, and
/// storage details stay in the logs.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal,
    RequestTimeout,
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Internal server error",
            ),
            Self::RequestTimeout => {
                (StatusCode::REQUEST_TIMEOUT, "REQUEST_TIMEOUT", "Request timed out")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        (status, Json(ApiResponse::<()>::error(code, message))).into_response()
    }
}

impl From<crate::AppError> for AppError {
    fn from(err: crate::AppError) -> Self {
        match err {
            crate::AppError::Validation(msg) => Self::BadRequest(msg),
            crate::AppError::NotFound { resource } => {
                Self::NotFound(format!("{} not found", resource))
            }
            crate::AppError::Conflict(msg) => Self::Conflict(msg),
            other => {
                tracing::error!(error = %other, "Request failed");
                Self::Internal
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now(),
        }
    }
}
