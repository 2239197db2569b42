//! Error responses for the JSON API and the HTML pages.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use rimay_core::error::RimayError;

/// Generic body for failures whose cause is only logged.
pub const INTERNAL_ERROR: &str = "Internal server error";

/// A JSON error response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    /// `{"error": message}`
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, json!({ "error": message.into() }))
    }

    /// `{"detail": message}`
    pub fn detail(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, json!({ "detail": message.into() }))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::detail(StatusCode::UNAUTHORIZED, message)
    }
}

impl From<RimayError> for ApiError {
    fn from(e: RimayError) -> Self {
        match e {
            RimayError::Validation(errors) => Self::new(StatusCode::BAD_REQUEST, json!({ "errors": errors })),
            RimayError::Conflict(msg) => Self::new(StatusCode::BAD_REQUEST, json!({ "errors": msg })),
            RimayError::AuthFailed(msg) => Self::unauthorized(msg),
            RimayError::PermissionDenied(msg) => Self::detail(StatusCode::FORBIDDEN, msg),
            RimayError::NotFound(msg) => Self::detail(StatusCode::NOT_FOUND, msg),
            other => {
                error!("request failed: {other}");
                Self::detail(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::detail(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Failures of the HTML pages.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("page not found")]
    NotFound,

    #[error(transparent)]
    Service(#[from] RimayError),
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        match self {
            PageError::NotFound => (
                StatusCode::NOT_FOUND,
                Html("<h1>No encontrado</h1><p>La página solicitada no existe.</p>"),
            )
                .into_response(),
            PageError::Service(RimayError::NotFound(msg)) => {
                tracing::debug!("page lookup failed: {msg}");
                PageError::NotFound.into_response()
            }
            PageError::Service(e) => {
                error!("page failed: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html("<h1>Error del servidor</h1><p>Inténtalo de nuevo más tarde.</p>"),
                )
                    .into_response()
            }
        }
    }
}

pub type PageResult<T = Response> = Result<T, PageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_field_errors() {
        let err: ApiError = RimayError::field("email", "Este campo es obligatorio.").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body, json!({ "errors": { "email": ["Este campo es obligatorio."] } }));
    }

    #[test]
    fn test_internal_errors_hide_cause() {
        let err: ApiError = RimayError::Database("disk I/O error".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body["detail"], INTERNAL_ERROR);
    }

    #[test]
    fn test_auth_and_lookup_statuses() {
        let err: ApiError = RimayError::AuthFailed("Token inválido.".into()).into();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        let err: ApiError = RimayError::NotFound("incident 9".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
