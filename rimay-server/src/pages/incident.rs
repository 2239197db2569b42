//! Incident management pages. All require `can_manage_community`.

use std::fmt::Write;

use axum::extract::{Path, Query, State};

use rimay_models::models::session::FlashLevel;
use rimay_services::dashboard::incident_type_icon;
use rimay_services::incident::IncidentSearch;

use crate::error::{PageError, PageResult};
use crate::extract::Manager;
use crate::pages::html::{escape, pager, query_string, select, yes_no};
use crate::pages::{flash_and_redirect, render};
use crate::state::AppState;

pub const RESOLVED: &str = "Incidente marcado como resuelto exitosamente.";

/// `GET /incident/`
pub async fn list(
    State(state): State<AppState>,
    Manager(current): Manager,
    Query(search): Query<IncidentSearch>,
) -> PageResult {
    let incidents = &state.registry.incident;
    let page = incidents.list(&search)?;
    let types: Vec<(String, String)> = incidents
        .types()?
        .into_iter()
        .filter_map(|t| t.id.map(|id| (id.to_string(), t.name)))
        .collect();
    let statuses: Vec<(String, String)> = incidents
        .statuses()?
        .into_iter()
        .filter_map(|s| s.id.map(|id| (id.to_string(), s.name)))
        .collect();

    let mut body = String::from("<form method=\"get\">\n");
    body.push_str(&select("incident_type", "Tipo", &types, search.incident_type.as_deref()));
    body.push_str(&select("status", "Estado", &statuses, search.status.as_deref()));
    body.push_str("<button type=\"submit\">Filtrar</button>\n</form>\n");

    body.push_str(
        "<table>\n<tr><th>Tipo</th><th>Título</th><th>Estado</th><th>Reportado por</th>\
         <th>Fecha</th><th>Activo</th></tr>\n",
    );
    for d in &page.items {
        let i = &d.incident;
        let _ = writeln!(
            body,
            "<tr><td><i class=\"{}\"></i> {}</td><td><a href=\"/incident/{}/\">{}</a></td>\
             <td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(incident_type_icon(Some(d.type_icon.as_str()))),
            escape(&d.type_name),
            i.id.unwrap_or_default(),
            escape(&i.title),
            escape(&d.status_name),
            escape(&d.reporter_username),
            escape(&i.reported_at),
            yes_no(i.is_active),
        );
    }
    body.push_str("</table>\n");
    body.push_str(&pager(
        &page,
        &query_string(&[("incident_type", search.incident_type.as_deref()), ("status", search.status.as_deref())]),
    ));
    render(&state, &current, "Incidentes", &body)
}

/// `GET /incident/{id}/`
pub async fn detail(
    State(state): State<AppState>,
    Manager(current): Manager,
    Path(id): Path<i64>,
) -> PageResult {
    let view = state.registry.incident.detail(id)?.ok_or(PageError::NotFound)?;
    let d = &view.detail;
    let i = &d.incident;

    let mut body = format!(
        "<h2><i class=\"{}\"></i> {}</h2>\n<p>{}</p>\n<dl>\n\
         <dt>Estado</dt><dd>{}</dd>\n<dt>Reportado por</dt><dd>{}</dd>\n\
         <dt>Dirección</dt><dd>{}</dd>\n<dt>Ocurrió</dt><dd>{}</dd>\n<dt>Reportado</dt><dd>{}</dd>\n</dl>\n",
        escape(incident_type_icon(Some(d.type_icon.as_str()))),
        escape(&i.title),
        escape(&i.description),
        escape(&d.status_name),
        escape(&d.reporter_full_name),
        escape(i.address.as_deref().unwrap_or("-")),
        escape(i.occurred_at.as_deref().unwrap_or("-")),
        escape(&i.reported_at),
    );
    if let (Some(lat), Some(lng)) = (i.latitude, i.longitude) {
        let _ = writeln!(
            body,
            "<div id=\"map\" data-maps-key=\"{}\" data-lat=\"{lat}\" data-lng=\"{lng}\"></div>",
            escape(&state.server.maps_api_key)
        );
    }

    if !view.media.is_empty() {
        body.push_str("<h3>Archivos</h3>\n<ul class=\"media\">\n");
        for m in &view.media {
            let Some(path) = m.file_path.as_deref() else { continue };
            let url = format!("/media/{}", path.trim_start_matches('/'));
            if m.is_image() {
                let _ = writeln!(body, "<li><img src=\"{}\" alt=\"imagen\"></li>", escape(&url));
            } else {
                let _ = writeln!(body, "<li><a href=\"{}\">{}</a></li>", escape(&url), escape(&m.media_type));
            }
        }
        body.push_str("</ul>\n");
    }

    body.push_str("<h3>Comentarios</h3>\n");
    if view.comments.is_empty() {
        body.push_str("<p>Sin comentarios.</p>\n");
    } else {
        body.push_str("<ul class=\"comments\">\n");
        for c in &view.comments {
            let author = if c.comment.is_anonymous { "Anónimo" } else { c.username.as_str() };
            let _ = writeln!(
                body,
                "<li><strong>{}</strong>: {}</li>",
                escape(author),
                escape(&c.comment.comment)
            );
        }
        body.push_str("</ul>\n");
    }

    if d.status_code != rimay_core::constants::status_codes::RESOLVED {
        let _ = writeln!(
            body,
            "<form method=\"post\" action=\"/incident/{id}/resolve\"><button type=\"submit\">Marcar como resuelto</button></form>"
        );
    }
    body.push_str("<p><a href=\"/incident/\">Volver</a></p>");
    render(&state, &current, "Incidente", &body)
}

/// `POST /incident/{id}/resolve`
pub async fn resolve(
    State(state): State<AppState>,
    Manager(current): Manager,
    Path(id): Path<i64>,
) -> PageResult {
    state.registry.incident.resolve(id)?;
    flash_and_redirect(&state, &current, FlashLevel::Success, RESOLVED, "/incident/")
}
