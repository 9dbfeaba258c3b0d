//! API error types.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use cdn_models::TransformError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Detail returned for every upstream failure.
pub const INTERNAL_ERROR_DETAIL: &str = "An internal error occurred";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("password required")]
    PasswordRequired,

    #[error("invalid password")]
    InvalidPassword,

    #[error("download limit reached")]
    DownloadLimitReached,

    #[error("transform not allowed")]
    TransformNotAllowed,

    /// Unknown, malformed and expired tokens all look the same.
    #[error("share not found")]
    NotFound,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] cdn_storage::StorageError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] cdn_firestore::FirestoreError),

    #[error("Processor error: {0}")]
    Processor(#[from] cdn_processor::ProcessorError),
}

impl From<TransformError> for ApiError {
    fn from(err: TransformError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PasswordRequired | ApiError::InvalidPassword => StatusCode::UNAUTHORIZED,
            ApiError::DownloadLimitReached | ApiError::TransformNotAllowed => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_)
            | ApiError::Storage(_)
            | ApiError::Firestore(_)
            | ApiError::Processor(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::PasswordRequired => "password_required",
            ApiError::InvalidPassword => "invalid_password",
            ApiError::DownloadLimitReached => "download_limit_reached",
            ApiError::TransformNotAllowed => "transform_not_allowed",
            ApiError::NotFound => "not_found",
            ApiError::RateLimited => "rate_limited",
            ApiError::Internal(_)
            | ApiError::Storage(_)
            | ApiError::Firestore(_)
            | ApiError::Processor(_) => "internal_error",
        }
    }

    fn is_upstream(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // The cause is logged, never returned
        let detail = if self.is_upstream() {
            error!(error = %self, code = self.code(), "Upstream failure");
            INTERNAL_ERROR_DETAIL.to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            detail,
            code: self.code(),
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, ApiError::RateLimited) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use cdn_storage::StorageError;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_client_errors_name_the_problem() {
        let err: ApiError = TransformError::OutOfRange {
            field: "quality",
            min: 1,
            max: 100,
        }
        .into();
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "quality must be between 1 and 100");
        assert_eq!(body["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_upstream_errors_are_generic() {
        let err: ApiError = StorageError::download_failed("bucket exploded at key secret/file").into();
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], INTERNAL_ERROR_DETAIL);
        assert_eq!(body["code"], "internal_error");
    }

    #[tokio::test]
    async fn test_authorization_statuses() {
        assert_eq!(body_json(ApiError::PasswordRequired).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(ApiError::InvalidPassword).await.1["detail"], "invalid password");
        assert_eq!(body_json(ApiError::DownloadLimitReached).await.0, StatusCode::FORBIDDEN);
        assert_eq!(body_json(ApiError::TransformNotAllowed).await.1["code"], "transform_not_allowed");
        assert_eq!(body_json(ApiError::NotFound).await.0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }
}
