//! Error responses.
//!
//! 4xx responses carry `{code, message, details?}`. 5xx responses carry a
//! generic message; the cause is logged inside the current request span.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::AuthError;

/// JSON error body shared by every API error.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// The body for every 5xx response.
    #[must_use]
    pub fn internal() -> Self {
        Self::new("internal_error", "Internal server error")
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, body) = error_details(&self);

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

fn error_details(error: &AuthError) -> (StatusCode, ErrorBody) {
    match error {
        AuthError::BadRequest { message } => (
            StatusCode::BAD_REQUEST,
            ErrorBody::new("bad_request", message.clone()),
        ),
        AuthError::Unauthorized { .. } => (
            StatusCode::UNAUTHORIZED,
            ErrorBody::new("unauthorized", "Authentication required"),
        ),
        AuthError::InvalidState => (
            StatusCode::UNAUTHORIZED,
            ErrorBody::new("invalid_state", "Invalid or expired authorization state"),
        ),
        AuthError::Forbidden { message } => (
            StatusCode::FORBIDDEN,
            ErrorBody::new("forbidden", message.clone()),
        ),
        AuthError::NotFound { message } => (
            StatusCode::NOT_FOUND,
            ErrorBody::new("not_found", message.clone()),
        ),
        AuthError::Conflict { message } => (
            StatusCode::CONFLICT,
            ErrorBody::new("conflict", message.clone()),
        ),
        AuthError::IdentityProvider(_) | AuthError::Storage(_) | AuthError::Internal { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::internal())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::IdpError;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_bad_request_body() {
        let response = AuthError::bad_request("redirectUri is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "bad_request");
        assert_eq!(body["message"], "redirectUri is required");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_hides_reason() {
        let response = AuthError::unauthorized("invalid refresh token").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        let body = body_json(response).await;
        assert_eq!(body["message"], "Authentication required");
    }

    #[tokio::test]
    async fn test_provider_error_is_generic_500() {
        let err = AuthError::IdentityProvider(IdpError::TokenRequestFailed {
            status: 400,
            body: "secret provider detail".into(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "internal_error");
        assert!(!body.to_string().contains("secret provider detail"));
    }

    #[tokio::test]
    async fn test_conflict_and_not_found() {
        assert_eq!(
            AuthError::conflict("exists").into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AuthError::not_found("missing").into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
