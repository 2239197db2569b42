//! Cross-service flows without push delivery.

mod common;

use rimay_core::error::RimayError;
use rimay_models::{CommunityMembership, GeoPoint};
use rimay_services::auth::RegisterRequest;
use rimay_services::community::PlacementKind;
use serde_json::json;

fn register(registry: &rimay_services::ServiceRegistry, username: &str, lat: f64, lng: f64) -> i64 {
    let req = RegisterRequest {
        username: Some(username.into()),
        password: Some("s3cret-pass".into()),
        dni: Some(format!("17{username}")),
        first_name: Some("Test".into()),
        last_name: Some("User".into()),
        email: Some(format!("{username}@example.com")),
        latitude: Some(json!(lat)),
        longitude: Some(json!(lng)),
        fcm_token: Some(format!("{username}-token")),
        ..Default::default()
    };
    registry.auth.register(&req).unwrap().id.unwrap()
}

#[test]
fn registered_users_share_an_auto_created_community() {
    let (registry, _sender, _dir) = common::create_registry();
    let first = register(&registry, "first", -0.2, -78.5);
    let second = register(&registry, "second", -0.2, -78.5);

    let a = registry.community.validate_or_create(first, Some(&json!(-0.2)), Some(&json!(-78.5))).unwrap();
    assert_eq!(a.kind, PlacementKind::NewCommunity);
    assert_eq!(a.community.name, "Comunidad -0.2000,-78.5000");

    let b = registry.community.assign_user(second, Some(&json!("-0.2")), Some(&json!("-78.5"))).unwrap();
    assert!(b.created);
    assert_eq!(b.community_id, a.community.id);

    let conn = registry.database.conn().unwrap();
    assert!(CommunityMembership::find(&conn, second, a.community.id).unwrap().is_some());
}

#[test]
fn login_then_token_resolves_user() {
    let (registry, _sender, _dir) = common::create_registry();
    let uid = register(&registry, "ana", 0.0, 0.0);

    let (user, token) = registry.auth.login(Some("ana"), Some("s3cret-pass")).unwrap();
    assert_eq!(user.id, Some(uid));
    let found = registry.auth.authenticate_token(&token.key).unwrap();
    assert_eq!(found.username, "ana");

    assert!(matches!(
        registry.auth.login(Some("ana"), Some("wrong-pass")),
        Err(RimayError::AuthFailed(_))
    ));
}

#[test]
fn stats_follow_report_and_resolution() {
    let (registry, _sender, _dir) = common::create_registry();
    let uid = common::seed_user(&registry.database, "ana", Some(GeoPoint::new(0.0, 0.0)), None);
    assert_eq!(registry.stats.user_stats(uid).unwrap(), json!({}));

    let data = json!({"type": "Asalto"}).to_string();
    let id = registry.incident.create_from_json(uid, Some(&data), None).unwrap().id.unwrap();
    assert_eq!(registry.stats.user_stats(uid).unwrap()["total_alerts_pending"], 1);

    registry.incident.resolve(id).unwrap();
    let stats = registry.stats.user_stats(uid).unwrap();
    assert_eq!(stats["total_alerts_pending"], 0);
    assert_eq!(stats["total_alerts_resolved"], 1);

    let recent = registry.dashboard.recent_incidents().unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].status_name, "Resuelto");
}
