//! Shared test utilities for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rimay_core::config::{AppConfig, DatabaseConfig};
use rimay_core::error::{RimayError, RimayResult};
use rimay_models::{Database, FcmToken, GeoPoint, User, UserProfile};
use rimay_push::{PushMessage, PushSender};
use rimay_services::ServiceRegistry;
use tempfile::TempDir;

/// Create a temporary database with full schema and migrations applied.
/// Returns the Database and the TempDir (must be held alive for the duration of the test).
pub fn create_test_db() -> (Database, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("test.db");
    let db = Database::init(&path, &DatabaseConfig::default()).expect("failed to init test database");
    (db, dir)
}

/// Test configuration rooted in `dir`, with cheap password hashing.
pub fn create_test_config(dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.media.root = dir.join("media").to_string_lossy().into_owned();
    config.server.password_iterations = 1_000;
    config
}

/// A delivered push, as seen by the recorder.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub token: String,
    pub message: PushMessage,
}

/// Push sender that records every delivery. Tokens starting with `gone`
/// are reported as unregistered.
#[derive(Default)]
pub struct RecordingSender {
    pub deliveries: Mutex<Vec<Delivery>>,
    /// Time each send takes, to imitate a slow provider.
    pub latency: Duration,
}

impl RecordingSender {
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency, ..Default::default() }
    }

    pub fn delivered(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushSender for RecordingSender {
    async fn send(&self, token: &str, message: &PushMessage) -> RimayResult<String> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.deliveries.lock().unwrap().push(Delivery {
            token: token.to_string(),
            message: message.clone(),
        });
        if token.starts_with("gone") {
            return Err(RimayError::Unregistered(token.to_string()));
        }
        Ok(format!("projects/test/messages/{}", self.deliveries.lock().unwrap().len()))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Registry wired to a recording sender, initialized.
pub fn create_registry() -> (ServiceRegistry, Arc<RecordingSender>, TempDir) {
    create_registry_with(RecordingSender::default())
}

/// Registry wired to the given recording sender, initialized.
pub fn create_registry_with(sender: RecordingSender) -> (ServiceRegistry, Arc<RecordingSender>, TempDir) {
    let (db, dir) = create_test_db();
    let sender = Arc::new(sender);
    let registry = ServiceRegistry::build(&create_test_config(dir.path()), db, sender.clone())
        .expect("failed to build registry");
    registry.init_all().expect("failed to init services");
    (registry, sender, dir)
}

/// Insert a user with an optional profile location and device token.
pub fn seed_user(db: &Database, username: &str, at: Option<GeoPoint>, token: Option<&str>) -> i64 {
    let conn = db.conn().expect("failed to get connection for seeding");
    let uid = User::new(username, &format!("dni-{username}"), &format!("{username}@example.com"), username, "Test")
        .save(&conn)
        .expect("failed to insert user");
    let mut profile = UserProfile::new(uid);
    profile.set_location(at);
    profile.save(&conn).expect("failed to insert profile");
    if let Some(token) = token {
        FcmToken::upsert(&conn, uid, token, Some("test-device")).expect("failed to insert token");
    }
    uid
}
