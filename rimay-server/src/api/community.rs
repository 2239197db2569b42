//! Community membership endpoints for the mobile app.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use rimay_core::error::RimayError;

use crate::error::{ApiError, ApiResult};
use crate::extract::{JsonBody, TokenUser};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CoordinatesRequest {
    pub latitude: Option<Value>,
    pub longitude: Option<Value>,
}

/// Coordinate and lookup failures answer `{"error": ...}`.
fn community_error(e: RimayError) -> ApiError {
    match e {
        RimayError::Validation(errors) => ApiError::error(
            StatusCode::BAD_REQUEST,
            errors.first_message().unwrap_or_default(),
        ),
        RimayError::NotFound(msg) => ApiError::error(StatusCode::NOT_FOUND, msg),
        other => other.into(),
    }
}

fn created_or_ok(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

/// `GET /api/community/check`
pub async fn check(State(state): State<AppState>, user: TokenUser) -> ApiResult<impl IntoResponse> {
    let status = state.registry.community.check_user_community(user.id()?)?;
    Ok(Json(status))
}

/// `POST /api/community/assign`
pub async fn assign(
    State(state): State<AppState>,
    user: TokenUser,
    JsonBody(req): JsonBody<CoordinatesRequest>,
) -> ApiResult<impl IntoResponse> {
    let assignment = state
        .registry
        .community
        .assign_user(user.id()?, req.latitude.as_ref(), req.longitude.as_ref())
        .map_err(community_error)?;
    Ok((created_or_ok(assignment.created), Json(assignment)))
}

/// `POST /api/community/validate`
pub async fn validate(
    State(state): State<AppState>,
    user: TokenUser,
    JsonBody(req): JsonBody<CoordinatesRequest>,
) -> ApiResult<impl IntoResponse> {
    let placement = state
        .registry
        .community
        .validate_or_create(user.id()?, req.latitude.as_ref(), req.longitude.as_ref())
        .map_err(community_error)?;
    let body = json!({
        "hasCommunity": true,
        "community": placement.community,
        "message": placement.kind.message(),
    });
    Ok((created_or_ok(placement.kind.is_created()), Json(body)))
}
