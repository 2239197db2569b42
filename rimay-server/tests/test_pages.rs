//! Session-authenticated management pages.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use rimay_core::constants::roles;
use rimay_models::CommunityMembership;
use rimay_services::auth::RegisterRequest;
use rimay_services::incident::IncidentPayload;

use common::create_app;

fn form_encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}

#[tokio::test]
async fn test_anonymous_is_redirected_to_login() {
    let app = create_app();
    for uri in ["/dashboard/", "/profile/", "/community/", "/incident/"] {
        let res = app.get_page(uri, None).await;
        assert_eq!(res.status, StatusCode::FOUND, "{uri}");
        assert_eq!(res.location(), Some("/"));
    }

    let res = app.get_page("/dashboard/", Some("rimay_session=bogus")).await;
    assert_eq!(res.status, StatusCode::FOUND);
}

#[tokio::test]
async fn test_login_page_and_bad_credentials() {
    let app = create_app();
    let res = app.get_page("/", None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.text().contains("name=\"username\""));

    app.register("marta", None);
    let res = app.post_form("/", None, "username=marta&password=incorrecta").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.text().contains("nombre de usuario y clave correctos"));
    assert!(res.cookie().is_none());
}

#[tokio::test]
async fn test_login_dashboard_logout() {
    let app = create_app();
    app.register("tomas", Some((-0.18, -78.47)));
    let cookie = app.login_page("tomas").await;
    assert!(cookie.starts_with("rimay_session="));

    let res = app.get_page("/dashboard/", Some(&cookie)).await;
    assert_eq!(res.status, StatusCode::OK);
    let html = res.text();
    assert!(html.contains("tomas"));
    assert!(html.contains("No hay incidentes recientes."));

    let res = app.get_page("/logout/", Some(&cookie)).await;
    assert_eq!(res.status, StatusCode::FOUND);
    assert_eq!(res.location(), Some("/"));
    assert!(res.headers["set-cookie"].to_str().unwrap().contains("Max-Age=0"));

    let res = app.get_page("/dashboard/", Some(&cookie)).await;
    assert_eq!(res.status, StatusCode::FOUND);
}

#[tokio::test]
async fn test_signup_redirects_without_logging_in() {
    let app = create_app();
    let form = "username=nuevo&dni=12345678&first_name=Nu&last_name=Evo&email=nuevo%40example.com\
                &password1=clave-larga-1&password2=clave-larga-1";
    let res = app.post_form("/signup/", None, form).await;
    assert_eq!(res.status, StatusCode::FOUND);
    assert_eq!(res.location(), Some("/"));
    assert!(res.cookie().is_none());

    let res = app.post_form("/", None, "username=nuevo&password=clave-larga-1").await;
    assert_eq!(res.status, StatusCode::FOUND);
    assert_eq!(res.location(), Some("/dashboard/"));
}

#[tokio::test]
async fn test_signup_errors_rerender_form() {
    let app = create_app();
    app.register("ocupado", None);
    let form = "username=ocupado&dni=1&first_name=A&last_name=B&email=a%40example.com\
                &password1=clave-larga-1&password2=otra-clave-2";
    let res = app.post_form("/signup/", None, form).await;
    assert_eq!(res.status, StatusCode::OK);
    let html = res.text();
    assert!(html.contains("Los dos campos de contraseña no coinciden."));
    assert!(html.contains("Ya existe un usuario con este username."));
    assert!(html.contains("value=\"ocupado\""));
}

#[tokio::test]
async fn test_profile_update_flashes_once() {
    let app = create_app();
    app.register("perfil", None);
    let cookie = app.login_page("perfil").await;

    let res = app
        .post_form("/profile/", Some(&cookie), "bio=Hola&alias_name=Perfi&latitude=-0.2&longitude=-78.5")
        .await;
    assert_eq!(res.status, StatusCode::FOUND);
    assert_eq!(res.location(), Some("/profile/"));

    let html = app.get_page("/profile/", Some(&cookie)).await.text();
    assert!(html.contains("alert alert-success"));
    assert!(html.contains("Perfil actualizado exitosamente."));
    assert!(html.contains("value=\"Perfi\""));
    assert!(html.contains("value=\"-78.5\""));

    let html = app.get_page("/profile/", Some(&cookie)).await.text();
    assert!(!html.contains("Perfil actualizado exitosamente."));
}

#[tokio::test]
async fn test_incident_pages_need_manage_permission() {
    let app = create_app();
    let (user_id, _) = app.register("vecino", None);
    let cookie = app.login_page("vecino").await;

    let res = app.get_page("/incident/", Some(&cookie)).await;
    assert_eq!(res.status, StatusCode::FOUND);
    assert_eq!(res.location(), Some("/"));
    let res = app.get_page("/community/list/", Some(&cookie)).await;
    assert_eq!(res.status, StatusCode::FOUND);

    app.make_manager(user_id);
    let res = app.get_page("/incident/", Some(&cookie)).await;
    assert_eq!(res.status, StatusCode::OK);
    let res = app.get_page("/community/list/", Some(&cookie)).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_manager_resolves_incident() {
    let app = create_app();
    let (reporter_id, _) = app.register("reportero", None);
    let (manager_id, _) = app.register("gestor", None);
    app.make_manager(manager_id);
    let cookie = app.login_page("gestor").await;

    let payload = IncidentPayload {
        incident_type: Some("Robo".into()),
        description: Some("Robo <en> la esquina".into()),
        ..Default::default()
    };
    let incident = app.state.registry.incident.create_incident(reporter_id, &payload, None).unwrap();
    let id = incident.id.unwrap();

    let res = app.get_page(&format!("/incident/{id}/"), Some(&cookie)).await;
    assert_eq!(res.status, StatusCode::OK);
    let html = res.text();
    assert!(html.contains("Robo &lt;en&gt; la esquina"));
    assert!(html.contains(&format!("/incident/{id}/resolve")));

    let res = app.post_form(&format!("/incident/{id}/resolve"), Some(&cookie), "").await;
    assert_eq!(res.status, StatusCode::FOUND);
    assert_eq!(res.location(), Some("/incident/"));

    let html = app.get_page("/incident/", Some(&cookie)).await.text();
    assert!(html.contains("Incidente marcado como resuelto exitosamente."));

    let view = app.state.registry.incident.detail(id).unwrap().unwrap();
    assert_eq!(view.detail.status_code, "003");
    let html = app.get_page(&format!("/incident/{id}/"), Some(&cookie)).await.text();
    assert!(!html.contains(&format!("/incident/{id}/resolve")));

    let stats = app.state.registry.stats.user_stats(reporter_id).unwrap();
    assert_eq!(stats["total_alerts_resolved"], 1);
    assert_eq!(stats["total_alerts_pending"], 0);

    let res = app.get_page("/incident/99999/", Some(&cookie)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_verify_member_toggles_and_escapes_username() {
    let app = create_app();
    let (moderator_id, _) = app.register("moderadora", None);
    let community = &app.state.registry.community;
    let point = (json!(-0.3), json!(-78.6));
    community.validate_or_create(moderator_id, Some(&point.0), Some(&point.1)).unwrap();

    let req: RegisterRequest = serde_json::from_value(json!({
        "username": "ana<b>",
        "password": "secret-pass-1",
        "dni": "dni-ana",
        "firstName": "Ana",
        "lastName": "B",
        "email": "ana@example.com"
    }))
    .unwrap();
    let target = app.state.registry.auth.register(&req).unwrap().id.unwrap();
    community.validate_or_create(target, Some(&point.0), Some(&point.1)).unwrap();

    let conn = app.state.registry.database.conn().unwrap();
    let community_id = CommunityMembership::first_for_user(&conn, moderator_id).unwrap().unwrap().community_id;
    let own = CommunityMembership::find(&conn, moderator_id, community_id).unwrap().unwrap();
    let membership = CommunityMembership::find(&conn, target, community_id).unwrap().unwrap();
    let membership_id = membership.id.unwrap();

    let cookie = app.login_page("moderadora").await;
    let verify = format!("/community/members/{membership_id}/verify");

    // Plain members cannot verify.
    let res = app.post_form(&verify, Some(&cookie), "").await;
    assert_eq!(res.location(), Some("/community/members/"));
    let html = app.get_page("/community/members/", Some(&cookie)).await.text();
    assert!(html.contains("No tienes permisos para verificar miembros."));

    CommunityMembership::set_role(&conn, own.id.unwrap(), roles::MODERATOR).unwrap();
    let res = app.post_form(&verify, Some(&cookie), "").await;
    assert_eq!(res.status, StatusCode::FOUND);
    let html = app.get_page("/community/members/", Some(&cookie)).await.text();
    assert!(html.contains("alert alert-success"));
    assert!(html.contains("<strong>ana&lt;b&gt;</strong> ha sido verificado exitosamente."));

    app.post_form(&verify, Some(&cookie), "").await;
    let html = app.get_page("/community/members/", Some(&cookie)).await.text();
    assert!(html.contains("alert alert-warning"));
    assert!(html.contains("Se ha removido la verificación de <strong>ana&lt;b&gt;</strong>."));
}

#[tokio::test]
async fn test_verify_outside_own_community() {
    let app = create_app();
    let (outsider, _) = app.register("afuera", None);
    let (member, _) = app.register("adentro", None);
    let community = &app.state.registry.community;
    community.validate_or_create(member, Some(&json!(10.0)), Some(&json!(10.0))).unwrap();

    let conn = app.state.registry.database.conn().unwrap();
    let membership = CommunityMembership::first_for_user(&conn, member).unwrap().unwrap();
    let cookie = app.login_page("afuera").await;
    let res = app
        .post_form(&format!("/community/members/{}/verify", membership.id.unwrap()), Some(&cookie), "")
        .await;
    assert_eq!(res.location(), Some("/dashboard/"));
    let html = app.get_page("/dashboard/", Some(&cookie)).await.text();
    assert!(html.contains("No tienes acceso a esta comunidad."));
    assert!(CommunityMembership::first_for_user(&conn, outsider).unwrap().is_none());
}

#[tokio::test]
async fn test_manager_creates_community() {
    let app = create_app();
    let (manager_id, _) = app.register("admin", None);
    app.make_manager(manager_id);
    let cookie = app.login_page("admin").await;

    let res = app.get_page("/community/new/", Some(&cookie)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.text().contains("data-maps-key=\"test-maps-key\""));

    let res = app.post_form("/community/new/", Some(&cookie), "name=Centro&postal_code=170101").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.text().contains("Debes dibujar el área límite de la comunidad en el mapa."));

    let boundary = json!({
        "type": "Polygon",
        "coordinates": [[[-78.5, -0.2], [-78.4, -0.2], [-78.4, -0.1], [-78.5, -0.1], [-78.5, -0.2]]]
    })
    .to_string();
    let form = format!(
        "name=Centro&description=Casco+hist%C3%B3rico&postal_code=170101&boundary_area_json={}",
        form_encode(&boundary)
    );
    let res = app.post_form("/community/new/", Some(&cookie), &form).await;
    assert_eq!(res.status, StatusCode::FOUND);
    let location = res.location().unwrap().to_string();
    assert!(location.starts_with("/community/"));

    let html = app.get_page(&location, Some(&cookie)).await.text();
    assert!(html.contains("Comunidad creada exitosamente."));
    assert!(html.contains("<h2>Centro</h2>"));
    assert!(html.contains("Casco histórico"));
    assert!(html.contains("Miembros: 0"));

    let html = app.get_page("/community/list/", Some(&cookie)).await.text();
    assert!(html.contains(&format!("href=\"{location}\"")));
}
