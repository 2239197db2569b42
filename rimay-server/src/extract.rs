//! Request extractors resolving the caller.
//!
//! API routes authenticate with `Authorization: Token <key>` (the mobile
//! app) or `Bearer <key>`. Pages authenticate with the session cookie and
//! send anonymous visitors back to the login page.

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use rimay_core::constants::permissions::CAN_MANAGE_COMMUNITY;
use rimay_core::constants::SESSION_COOKIE;
use rimay_core::error::RimayError;
use rimay_models::{Session, User};

use crate::error::{ApiError, PageError};
use crate::pages::found;
use crate::state::AppState;

pub const NOT_AUTHENTICATED: &str = "Las credenciales de autenticación no se proveyeron.";

/// Key from an `Authorization` header value.
pub fn token_key(header: &str) -> Option<&str> {
    let header = header.trim();
    header
        .strip_prefix("Token ")
        .or_else(|| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

/// Session key from the request cookies.
pub fn session_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `Json` body whose rejections come back as `{"detail": …}` with the
/// rejection's status.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// The user owning the request's API token.
pub struct TokenUser(pub User);

impl TokenUser {
    pub fn id(&self) -> Result<i64, ApiError> {
        Ok(self.0.require_id()?)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for TokenUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized(NOT_AUTHENTICATED))?;
        let key = token_key(header).ok_or_else(|| ApiError::unauthorized(NOT_AUTHENTICATED))?;

        match state.registry.auth.authenticate_token(key) {
            Ok(user) => Ok(TokenUser(user)),
            Err(RimayError::AuthFailed(msg)) => Err(ApiError::unauthorized(msg)),
            Err(e) => Err(e.into()),
        }
    }
}

/// A logged-in browser session.
pub struct SessionUser {
    pub session: Session,
    pub user: User,
}

impl SessionUser {
    pub fn id(&self) -> i64 {
        self.session.user_id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(key) = session_key(&parts.headers) else {
            return Err(found("/"));
        };
        match state.registry.auth.session_user(&key) {
            Ok(Some((session, user))) => Ok(SessionUser { session, user }),
            Ok(None) => {
                debug!("stale session cookie");
                Err(found("/"))
            }
            Err(e) => Err(PageError::from(e).into_response()),
        }
    }
}

/// A session whose group grants `can_manage_community`.
pub struct Manager(pub SessionUser);

#[async_trait]
impl FromRequestParts<AppState> for Manager {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let mut current = SessionUser::from_request_parts(parts, state).await?;
        match state.registry.permission.check(&mut current.session, &[CAN_MANAGE_COMMUNITY]) {
            Ok(true) => Ok(Manager(current)),
            Ok(false) => Err(found("/")),
            Err(e) => {
                tracing::warn!("permission check failed: {e}");
                Err(found("/"))
            }
        }
    }
}
