//! API error type: a thiserror enum with an `IntoResponse` impl, mapping
//! onto the engine's own `ErrorCode` taxonomy where an error originated in
//! a provider or the job store.

use aura_jobstore::StoreError;
use aura_providers::error::ProviderError;
use aura_types::ErrorCode;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Domain { code: ErrorCode, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("rate limited")]
    RateLimited,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Domain { code, .. } => match code {
                ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorCode::OfflinePolicyViolation => StatusCode::CONFLICT,
                ErrorCode::NoProviderAvailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::AuthFailure => StatusCode::UNAUTHORIZED,
                ErrorCode::RateLimit => StatusCode::TOO_MANY_REQUESTS,
                ErrorCode::InsufficientResources => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(error: ProviderError) -> Self {
        ApiError::Domain {
            code: error.kind,
            message: error.message,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => ApiError::NotFound(format!("job {id} not found")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error_code: Option<&'static str>,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = match &self {
            ApiError::Domain { code, .. } => Some(code.code()),
            _ => None,
        };
        let body = ErrorResponse {
            error_code,
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
