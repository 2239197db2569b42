//! Shared test utilities for the HTTP integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use rimay_core::config::{AppConfig, DatabaseConfig};
use rimay_core::constants::permissions::CAN_MANAGE_COMMUNITY;
use rimay_models::{Database, Group};
use rimay_push::DisabledSender;
use rimay_server::{router, AppState};
use rimay_services::auth::RegisterRequest;
use rimay_services::ServiceRegistry;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    _dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response is not JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get("location").and_then(|v| v.to_str().ok())
    }

    /// `name=value` of the first `Set-Cookie` header.
    pub fn cookie(&self) -> Option<String> {
        self.headers
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

/// Router over a fresh database with push disabled.
pub fn create_app() -> TestApp {
    let dir = TempDir::new().expect("failed to create temp dir");
    let db = Database::init(&dir.path().join("test.db"), &DatabaseConfig::default())
        .expect("failed to init test database");

    let mut config = AppConfig::default();
    config.media.root = dir.path().join("media").to_string_lossy().into_owned();
    config.server.password_iterations = 1_000;
    config.server.maps_api_key = "test-maps-key".into();

    let registry = ServiceRegistry::build(&config, db, Arc::new(DisabledSender)).expect("failed to build registry");
    registry.init_all().expect("failed to init services");
    let state = AppState::new(Arc::new(registry), config.server.clone(), config.media.max_upload_bytes);

    TestApp {
        app: router(state.clone()),
        state,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.expect("request failed");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.expect("body failed").to_bytes();
        TestResponse { status, headers, body }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Token {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Token {token}"));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn get_page(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, cookie: Option<&str>, form: &str) -> TestResponse {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.to_string())).unwrap()).await
    }

    /// Register through the service layer and return (user id, API token).
    pub fn register(&self, username: &str, location: Option<(f64, f64)>) -> (i64, String) {
        let mut body = json!({
            "username": username,
            "password": "secret-pass-1",
            "dni": format!("dni-{username}"),
            "firstName": "Test",
            "lastName": username,
            "email": format!("{username}@example.com"),
        });
        if let Some((lat, lng)) = location {
            body["latitude"] = json!(lat);
            body["longitude"] = json!(lng);
        }
        let req: RegisterRequest = serde_json::from_value(body).unwrap();
        let auth = &self.state.registry.auth;
        let user = auth.register(&req).expect("register failed");
        let (_, token) = auth.login(Some(username), Some("secret-pass-1")).expect("login failed");
        (user.id.unwrap(), token.key)
    }

    /// Log in through the page and return the session cookie.
    pub async fn login_page(&self, username: &str) -> String {
        let res = self
            .post_form("/", None, &format!("username={username}&password=secret-pass-1"))
            .await;
        assert_eq!(res.status, StatusCode::FOUND, "login failed: {}", res.text());
        res.cookie().expect("no session cookie")
    }

    /// Put the user in a group granting `can_manage_community`.
    pub fn make_manager(&self, user_id: i64) {
        let conn = self.state.registry.database.conn().unwrap();
        let group = match Group::find_by_name(&conn, "Gestores").unwrap() {
            Some(g) => g,
            None => {
                let g = Group::create(&conn, "Gestores").unwrap();
                Group::grant(&conn, g.id, CAN_MANAGE_COMMUNITY).unwrap();
                g
            }
        };
        Group::add_user(&conn, group.id, user_id).unwrap();
    }
}
