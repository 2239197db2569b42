//! Token login, mobile registration and device tokens.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use rimay_core::error::RimayError;
use rimay_services::auth::{FcmTokenRequest, RegisterRequest};

use crate::error::{ApiError, ApiResult, INTERNAL_ERROR};
use crate::extract::{JsonBody, TokenUser};
use crate::state::AppState;

pub const LOGIN_OK: &str = "Inicio de sesión exitoso";
pub const REGISTERED: &str = "User registered successfully";
pub const ALREADY_EXISTS: &str = "User with this information already exists";
pub const FCM_UPDATED: &str = "Token FCM actualizado exitosamente";
pub const FCM_REJECTED: &str = "No se pudo actualizar el token";
pub const SERVER_ERROR_ES: &str = "Error interno del servidor";

#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// `POST /api/auth/token`
pub async fn obtain_token(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TokenRequest>,
) -> ApiResult<impl IntoResponse> {
    match state.registry.auth.login(req.username.as_deref(), req.password.as_deref()) {
        Ok((user, token)) => {
            info!("api login for {}", user.username);
            Ok(Json(json!({ "message": LOGIN_OK, "token": token.key })))
        }
        Err(RimayError::AuthFailed(msg)) => Err(ApiError::detail(StatusCode::BAD_REQUEST, msg)),
        Err(RimayError::Validation(errors)) => Err(ApiError::detail(
            StatusCode::BAD_REQUEST,
            errors.to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// `POST /api/register/user`
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    match state.registry.auth.register(&req) {
        Ok(_) => Ok((StatusCode::CREATED, Json(json!({ "message": REGISTERED })))),
        Err(RimayError::Validation(errors)) => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            json!({ "errors": errors }),
        )),
        Err(RimayError::Conflict(msg)) => {
            warn!("registration conflict: {msg}");
            Err(ApiError::new(StatusCode::BAD_REQUEST, json!({ "errors": ALREADY_EXISTS })))
        }
        Err(e) => {
            error!("registration failed: {e}");
            Err(ApiError::detail(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR))
        }
    }
}

/// `POST /api/register/update_fcm_token`
pub async fn update_fcm_token(
    State(state): State<AppState>,
    user: TokenUser,
    JsonBody(req): JsonBody<FcmTokenRequest>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user.id()?;
    match state.registry.auth.update_fcm_token(user_id, &req) {
        Ok(_) => Ok(Json(json!({ "message": FCM_UPDATED }))),
        Err(RimayError::Validation(errors)) => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            json!({ "error": FCM_REJECTED, "errors": errors }),
        )),
        Err(e) => {
            error!("fcm token update for user {user_id} failed: {e}");
            Err(ApiError::error(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_ES))
        }
    }
}
