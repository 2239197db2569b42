//! Server-rendered management pages.
//!
//! Pages authenticate with the session cookie. One-shot flash messages are
//! stored on the session and shown on the next rendered page.

pub mod auth;
pub mod community;
pub mod dashboard;
pub mod html;
pub mod incident;

use axum::http::header::LOCATION;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

use rimay_models::models::session::FlashLevel;

use crate::error::PageResult;
use crate::extract::SessionUser;
use crate::state::AppState;

/// `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// Render a page for a logged-in user, draining their flash messages.
pub fn render(state: &AppState, current: &SessionUser, title: &str, body: &str) -> PageResult {
    let flashes = state.registry.auth.take_flash(&current.session.key)?;
    Ok(Html(html::layout(title, Some(&current.user.username), &flashes, body)).into_response())
}

pub fn render_anonymous(title: &str, body: &str) -> Response {
    Html(html::layout(title, None, &[], body)).into_response()
}

/// Queue a flash message then redirect.
pub fn flash_and_redirect(
    state: &AppState,
    current: &SessionUser,
    level: FlashLevel,
    message: &str,
    location: &str,
) -> PageResult {
    state.registry.auth.flash(&current.session.key, level, message)?;
    Ok(found(location))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(auth::login_form).post(auth::login))
        .route("/signup/", get(auth::signup_form).post(auth::signup))
        .route("/logout/", get(auth::logout))
        .route("/profile/", get(auth::profile_form).post(auth::update_profile))
        .route("/dashboard/", get(dashboard::dashboard))
        .route("/community/", get(community::my_community))
        .route("/community/members/", get(community::members))
        .route("/community/members/:id/verify", post(community::verify_member))
        .route("/community/list/", get(community::list))
        .route("/community/new/", get(community::create_form).post(community::create))
        .route("/community/:id/", get(community::detail))
        .route("/incident/", get(incident::list))
        .route("/incident/:id/", get(incident::detail))
        .route("/incident/:id/resolve", post(incident::resolve))
}
