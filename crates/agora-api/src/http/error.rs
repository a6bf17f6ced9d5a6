//! Application error type mapping to HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use agora_types::error::IdentityError;

/// Errors returned before a connection is upgraded.
#[derive(Debug)]
pub enum AppError {
    /// The `{identity}` path segment failed validation.
    InvalidIdentity(IdentityError),
}

impl From<IdentityError> for AppError {
    fn from(e: IdentityError) -> Self {
        AppError::InvalidIdentity(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::InvalidIdentity(e) => {
                (StatusCode::BAD_REQUEST, "INVALID_IDENTITY", e.to_string())
            }
        };

        let body = json!({
            "data": null,
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
