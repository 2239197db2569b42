//! JSON API used by the mobile app.
//!
//! Every route except token login and registration requires an
//! `Authorization: Token <key>` header.

pub mod auth;
pub mod community;
pub mod incident;
pub mod stats;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/token", post(auth::obtain_token))
        .route("/api/register/user", post(auth::register_user))
        .route("/api/register/update_fcm_token", post(auth::update_fcm_token))
        .route("/api/community/check", get(community::check))
        .route("/api/community/assign", post(community::assign))
        .route("/api/community/validate", post(community::validate))
        .route("/api/incident/create", post(incident::create))
        .route("/api/incident/list", get(incident::list))
        .route("/api/incident/map", get(incident::map))
        .route("/api/incident/:id/read", post(incident::mark_read))
        .route("/api/stats/list", get(stats::user_stats))
        .route("/health", get(stats::health))
}
