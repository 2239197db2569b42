//! Community pages: the user's community, its members, and community
//! management.

use std::fmt::Write;

use axum::extract::{Path, Query, State};
use axum::Form;

use rimay_core::constants::roles;
use rimay_core::error::{FieldErrors, RimayError};
use rimay_models::models::session::FlashLevel;
use rimay_models::Community;
use rimay_services::community::{CommunityForm, CommunitySearch, MemberSearch, VerifyOutcome};

use crate::error::{PageError, PageResult};
use crate::extract::{Manager, SessionUser};
use crate::pages::html::{escape, field_errors, input, pager, query_string, select, yes_no};
use crate::pages::{flash_and_redirect, render};
use crate::state::AppState;

pub const NO_ACCESS: &str = "No tienes acceso a esta comunidad.";
pub const NOT_ALLOWED: &str = "No tienes permisos para verificar miembros.";
pub const COMMUNITY_CREATED: &str = "Comunidad creada exitosamente.";

fn tristate_options() -> Vec<(String, String)> {
    vec![("true".into(), "Sí".into()), ("false".into(), "No".into())]
}

/// Boundary JSON and maps key for the map widget.
fn community_map(state: &AppState, community: &Community) -> String {
    let boundary = community.boundary_area.as_deref().unwrap_or("null");
    format!(
        "<div id=\"map\" data-maps-key=\"{}\" data-boundary=\"{}\"></div>\n",
        escape(&state.server.maps_api_key),
        escape(boundary)
    )
}

fn community_summary(state: &AppState, community: &Community, members: Option<i64>) -> String {
    let mut body = format!(
        "<h2>{}</h2>\n<p>{}</p>\n<p>Código postal: {}</p>\n<p>Activa: {}</p>\n",
        escape(&community.name),
        escape(&community.description),
        escape(&community.postal_code),
        yes_no(community.is_active)
    );
    if let Some(n) = members {
        let _ = writeln!(body, "<p>Miembros: {n}</p>");
    }
    body.push_str(&community_map(state, community));
    body
}

/// `GET /community/`
pub async fn my_community(State(state): State<AppState>, current: SessionUser) -> PageResult {
    let body = match state.registry.community.my_community(current.id())? {
        Some(community) => community_summary(&state, &community, None),
        None => "<p>Aún no perteneces a una comunidad.</p>".to_string(),
    };
    render(&state, &current, "Mi comunidad", &body)
}

/// `GET /community/members/`
pub async fn members(
    State(state): State<AppState>,
    current: SessionUser,
    Query(search): Query<MemberSearch>,
) -> PageResult {
    let Some((community, page)) = state.registry.community.members(current.id(), &search)? else {
        return render(&state, &current, "Miembros", "<p>Aún no perteneces a una comunidad.</p>");
    };

    let role_options: Vec<(String, String)> = roles::ALL.iter().map(|r| (r.to_string(), r.to_string())).collect();
    let mut body = format!("<h2>{}</h2>\n<form method=\"get\">\n", escape(&community.name));
    body.push_str(&select("role", "Rol", &role_options, search.role.as_deref()));
    body.push_str(&select("is_verified", "Verificado", &tristate_options(), search.is_verified.as_deref()));
    body.push_str("<button type=\"submit\">Filtrar</button>\n</form>\n");

    body.push_str(
        "<table>\n<tr><th>Usuario</th><th>Nombre</th><th>Correo</th><th>Rol</th>\
         <th>Verificado</th><th>Desde</th><th></th></tr>\n",
    );
    for row in &page.items {
        let m = &row.membership;
        let action = if m.is_verified { "Quitar verificación" } else { "Verificar" };
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td><form method=\"post\" action=\"/community/members/{}/verify\">\
             <button type=\"submit\">{action}</button></form></td></tr>",
            escape(&row.username),
            escape(&row.full_name),
            escape(&row.email),
            escape(&m.role),
            yes_no(m.is_verified),
            escape(&m.joined_at),
            m.id.unwrap_or_default(),
        );
    }
    body.push_str("</table>\n");
    body.push_str(&pager(
        &page,
        &query_string(&[("role", search.role.as_deref()), ("is_verified", search.is_verified.as_deref())]),
    ));
    render(&state, &current, "Miembros", &body)
}

/// `POST /community/members/{id}/verify`
pub async fn verify_member(
    State(state): State<AppState>,
    current: SessionUser,
    Path(membership_id): Path<i64>,
) -> PageResult {
    let outcome = state.registry.community.toggle_verification(current.id(), membership_id)?;
    let (level, message, location) = match outcome {
        VerifyOutcome::NoAccess => (FlashLevel::Error, NO_ACCESS.to_string(), "/dashboard/"),
        VerifyOutcome::NotAllowed => (FlashLevel::Error, NOT_ALLOWED.to_string(), "/community/members/"),
        VerifyOutcome::Verified { username } => (
            FlashLevel::Success,
            format!("<strong>{}</strong> ha sido verificado exitosamente.", escape(&username)),
            "/community/members/",
        ),
        VerifyOutcome::Unverified { username } => (
            FlashLevel::Warning,
            format!("Se ha removido la verificación de <strong>{}</strong>.", escape(&username)),
            "/community/members/",
        ),
    };
    flash_and_redirect(&state, &current, level, &message, location)
}

/// `GET /community/list/`
pub async fn list(
    State(state): State<AppState>,
    Manager(current): Manager,
    Query(search): Query<CommunitySearch>,
) -> PageResult {
    let page = state.registry.community.list(&search)?;

    let mut body = String::from("<form method=\"get\">\n");
    body.push_str(&select("is_active", "Activa", &tristate_options(), search.is_active.as_deref()));
    body.push_str(&input(
        "text",
        "postal_code",
        "Código postal",
        search.postal_code.as_deref().unwrap_or_default(),
        &FieldErrors::new(),
    ));
    body.push_str("<button type=\"submit\">Filtrar</button>\n</form>\n");
    body.push_str("<p><a href=\"/community/new/\">Nueva comunidad</a></p>\n");

    body.push_str("<table>\n<tr><th>Nombre</th><th>Código postal</th><th>Activa</th><th>Creada</th></tr>\n");
    for c in &page.items {
        let _ = writeln!(
            body,
            "<tr><td><a href=\"/community/{}/\">{}</a></td><td>{}</td><td>{}</td><td>{}</td></tr>",
            c.id.unwrap_or_default(),
            escape(&c.name),
            escape(&c.postal_code),
            yes_no(c.is_active),
            escape(&c.created_at),
        );
    }
    body.push_str("</table>\n");
    body.push_str(&pager(
        &page,
        &query_string(&[("is_active", search.is_active.as_deref()), ("postal_code", search.postal_code.as_deref())]),
    ));
    render(&state, &current, "Comunidades", &body)
}

fn create_body(state: &AppState, form: &CommunityForm, errors: &FieldErrors) -> String {
    let value = |v: &Option<String>| v.clone().unwrap_or_default();
    let mut body = String::from("<form method=\"post\" action=\"/community/new/\">\n");
    body.push_str(&input("text", "name", "Nombre", &value(&form.name), errors));
    body.push_str(&format!(
        "<p><label for=\"id_description\">Descripción</label>\
         <textarea name=\"description\" id=\"id_description\" rows=\"3\">{}</textarea></p>\n",
        escape(&value(&form.description))
    ));
    body.push_str(&input("text", "postal_code", "Código postal", &value(&form.postal_code), errors));
    body.push_str(&format!(
        "<input type=\"hidden\" name=\"boundary_area_json\" id=\"id_boundary_area_json\" value=\"{}\">{}\n",
        escape(&value(&form.boundary_area)),
        field_errors(errors, "boundary_area")
    ));
    let _ = writeln!(
        body,
        "<div id=\"map\" data-maps-key=\"{}\" data-draw=\"polygon\"></div>",
        escape(&state.server.maps_api_key)
    );
    body.push_str("<button type=\"submit\">Guardar</button>\n</form>");
    body
}

/// `GET /community/new/`
pub async fn create_form(State(state): State<AppState>, Manager(current): Manager) -> PageResult {
    let body = create_body(&state, &CommunityForm::default(), &FieldErrors::new());
    render(&state, &current, "Nueva comunidad", &body)
}

/// `POST /community/new/`
pub async fn create(
    State(state): State<AppState>,
    Manager(current): Manager,
    Form(form): Form<CommunityForm>,
) -> PageResult {
    match state.registry.community.create(&form) {
        Ok(community) => {
            let location = format!("/community/{}/", community.id.unwrap_or_default());
            flash_and_redirect(&state, &current, FlashLevel::Success, COMMUNITY_CREATED, &location)
        }
        Err(RimayError::Validation(errors)) => {
            let body = create_body(&state, &form, &errors);
            render(&state, &current, "Nueva comunidad", &body)
        }
        Err(e) => Err(e.into()),
    }
}

/// `GET /community/{id}/`
pub async fn detail(
    State(state): State<AppState>,
    Manager(current): Manager,
    Path(id): Path<i64>,
) -> PageResult {
    let (community, members) = state.registry.community.detail(id)?.ok_or(PageError::NotFound)?;
    let mut body = community_summary(&state, &community, Some(members));
    body.push_str("<p><a href=\"/community/list/\">Volver</a></p>");
    render(&state, &current, "Comunidad", &body)
}
