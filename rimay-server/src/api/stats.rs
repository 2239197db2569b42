use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::{error, info};

use rimay_core::constants::APP_VERSION;

use crate::error::{ApiError, ApiResult};
use crate::extract::TokenUser;
use crate::state::AppState;

pub const STATS_FAILED: &str = "Error retrieving user stats.";

/// `GET /api/stats/list`
pub async fn user_stats(State(state): State<AppState>, user: TokenUser) -> ApiResult<impl IntoResponse> {
    let user_id = user.id()?;
    info!("loading stats for user {user_id}");
    match state.registry.stats.user_stats(user_id) {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            error!("stats for user {user_id} failed: {e}");
            Err(ApiError::detail(StatusCode::INTERNAL_SERVER_ERROR, STATS_FAILED))
        }
    }
}

/// `GET /health`: 503 while any service is unhealthy.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let services: Vec<_> = state
        .registry
        .health_check()
        .into_iter()
        .map(|(name, svc_state, healthy)| json!({ "name": name, "state": svc_state.to_string(), "healthy": healthy }))
        .collect();
    let healthy = services.iter().all(|s| s["healthy"] == true);
    let database = state.registry.database.conn().is_ok();

    let status = if healthy && database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "version": APP_VERSION,
            "database": database,
            "services": services,
        })),
    )
}
