//! API error type for the content handlers.
//!
//! Shares the `{code, message, details?}` body with the auth layer. Server
//! errors are logged inside the request span and returned as a generic 500.

use alog_auth::middleware::ErrorBody;
use alog_core::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::BadRequest(msg) => ErrorBody::new("bad_request", msg.clone()),
            ApiError::Forbidden(msg) => ErrorBody::new("forbidden", msg.clone()),
            ApiError::NotFound(msg) => ErrorBody::new("not_found", msg.clone()),
            ApiError::Conflict(msg) => ErrorBody::new("conflict", msg.clone()),
            ApiError::Internal(_) => ErrorBody::internal(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => Self::NotFound(format!("{entity} {id}")),
            StorageError::Conflict { entity, id } => {
                Self::Conflict(format!("{entity} already exists: {id}"))
            }
            StorageError::InvalidInput { message } => Self::BadRequest(message),
            err @ StorageError::Backend { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_client_error_body() {
        let response = ApiError::forbidden("only authors may edit this log").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["code"], "forbidden");
        assert_eq!(body["message"], "only authors may edit this log");
    }

    #[tokio::test]
    async fn test_backend_error_is_generic() {
        let err: ApiError = StorageError::backend("connection refused to 10.0.0.5").into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "internal_error");
        assert!(!body.to_string().contains("10.0.0.5"));
    }

    #[test]
    fn test_storage_mapping() {
        let err: ApiError = StorageError::not_found("log", 7).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let err: ApiError = StorageError::invalid_input("title too long").into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let err: ApiError = StorageError::conflict("user", 1).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
