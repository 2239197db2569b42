use std::fmt::Write;

use axum::extract::State;

use rimay_services::dashboard::{incident_type_icon, timesince_short};

use crate::error::PageResult;
use crate::extract::SessionUser;
use crate::pages::html::escape;
use crate::pages::render;
use crate::state::AppState;

/// `GET /dashboard/`: the latest active incidents.
pub async fn dashboard(State(state): State<AppState>, current: SessionUser) -> PageResult {
    let recent = state.registry.dashboard.recent_incidents()?;

    let mut body = String::from("<h2>Incidentes recientes</h2>\n");
    if recent.is_empty() {
        body.push_str("<p>No hay incidentes recientes.</p>");
    } else {
        body.push_str("<ul class=\"incidents\">\n");
        for d in &recent {
            let i = &d.incident;
            let _ = writeln!(
                body,
                "<li><i class=\"{}\"></i> <strong>{}</strong> <span class=\"status\">{}</span> \
                 <span class=\"reporter\">{}</span> <time>{}</time></li>",
                escape(incident_type_icon(Some(d.type_icon.as_str()))),
                escape(&i.title),
                escape(&d.status_name),
                escape(&d.reporter_full_name),
                timesince_short(Some(i.reported_at.as_str())),
            );
        }
        body.push_str("</ul>");
    }
    render(&state, &current, "Dashboard", &body)
}
