use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error};

use crate::accounts::repo::{ConflictField, StoreError};

/// Every failure a handler can surface. Each variant maps to one status and a
/// stable machine-readable code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{field} already taken")]
    Conflict { field: ConflictField },
    /// Missing or bad session, or bad credentials; deliberately undifferentiated.
    #[error("{0}")]
    Authentication(&'static str),
    #[error("Upgrade required to access this feature")]
    PaymentRequired,
    /// Absence and non-ownership look the same to the caller.
    #[error("Not found")]
    NotFound,
    #[error("Webhook verification failed")]
    Signature,
    #[error(transparent)]
    Dependency(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict { .. } | ApiError::Signature => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Conflict { .. } => "CONFLICT",
            ApiError::Authentication(_) => "UNAUTHORIZED",
            ApiError::PaymentRequired => "UPGRADE_REQUIRED",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Signature => "INVALID_SIGNATURE",
            ApiError::Dependency(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Conflict(field) => ApiError::Conflict { field },
            StoreError::Backend(e) => ApiError::Dependency(e),
        }
    }
}

// Extractor rejections carry serde's parse detail; keep it in the logs only.
impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        debug!(status = %e.status(), reason = %e.body_text(), "json body rejected");
        ApiError::validation("Invalid JSON input")
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        debug!(reason = %e.body_text(), "query string rejected");
        ApiError::validation("Invalid query parameters")
    }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self {
        debug!(reason = %e.body_text(), "path parameter rejected");
        ApiError::validation("Invalid path parameter")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Dependency(e) => {
                error!(error = ?e, "request failed");
                json!({ "error": "Internal server error", "code": self.code() })
            }
            ApiError::Conflict { field } => json!({
                "error": self.to_string(),
                "code": self.code(),
                "field": field.as_str(),
            }),
            _ => json!({ "error": self.to_string(), "code": self.code() }),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
