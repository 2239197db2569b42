//! FcmClient against a local stand-in for the FCM endpoint.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use rimay_core::config::PushConfig;
use rimay_core::error::RimayError;
use rimay_push::{FcmClient, PushMessage, PushSender, RetryConfig};

#[derive(Clone, Default)]
struct FakeFcm {
    calls: Arc<AtomicU32>,
    /// Number of leading calls answered with 503.
    fail_first: u32,
}

async fn send(
    State(fake): State<FakeFcm>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let n = fake.calls.fetch_add(1, Ordering::SeqCst);
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer ya29.test") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": {"code": 401, "message": "no"}})));
    }
    if n < fake.fail_first {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})));
    }
    let token = body["message"]["token"].as_str().unwrap_or_default();
    if token == "stale" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {
                "code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND",
                "details": [{"@type": "type.googleapis.com/google.firebase.fcm.v1.FcmError",
                             "errorCode": "UNREGISTERED"}]}})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"name": format!("projects/demo/messages/{n}")})),
    )
}

async fn start(fake: FakeFcm) -> String {
    let app = Router::new()
        .route("/v1/projects/demo/messages:send", post(send))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client_for(endpoint: String) -> FcmClient {
    let config = PushConfig {
        project_id: "demo".into(),
        endpoint,
        access_token: "ya29.test".into(),
        ..PushConfig::default()
    };
    FcmClient::from_config(&config).unwrap().with_retry_config(RetryConfig {
        max_retries: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        retryable_statuses: vec![503],
    })
}

#[tokio::test]
async fn delivers_and_returns_message_name() {
    let fake = FakeFcm::default();
    let client = client_for(start(fake.clone()).await);

    let name = client
        .send("device-1", &PushMessage::new("Alerta", "Cerca"))
        .await
        .unwrap();
    assert_eq!(name, "projects/demo/messages/0");
    assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retries_transient_failures() {
    let fake = FakeFcm {
        fail_first: 2,
        ..FakeFcm::default()
    };
    let client = client_for(start(fake.clone()).await);

    client
        .send("device-1", &PushMessage::new("Alerta", "Cerca"))
        .await
        .unwrap();
    assert_eq!(fake.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let fake = FakeFcm {
        fail_first: 10,
        ..FakeFcm::default()
    };
    let client = client_for(start(fake.clone()).await);

    let err = client
        .send("device-1", &PushMessage::new("Alerta", "Cerca"))
        .await
        .unwrap_err();
    assert!(matches!(err, RimayError::Push { status: 503, .. }));
    assert_eq!(fake.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unregistered_token_is_reported() {
    let client = client_for(start(FakeFcm::default()).await);

    let err = client
        .send("stale", &PushMessage::new("Alerta", "Cerca"))
        .await
        .unwrap_err();
    assert!(matches!(err, RimayError::Unregistered(_)));
}
