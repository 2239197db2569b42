//! Dashboard data and display helpers.

use chrono::{DateTime, Utc};
use tracing::info;

use rimay_core::constants::DASHBOARD_INCIDENTS_LIMIT;
use rimay_core::error::RimayResult;
use rimay_core::time::parse_rfc3339;
use rimay_models::queries::{self, IncidentDetail};
use rimay_models::Database;

use crate::service::{Service, ServiceState, StateCell};

const UNITS: &[(i64, &str, &str)] = &[
    (30 * 24 * 3600, "mes", "meses"),
    (7 * 24 * 3600, "semana", "semanas"),
    (24 * 3600, "día", "días"),
    (3600, "hora", "horas"),
    (60, "min", "min"),
];

/// Compact Spanish "time ago" label, e.g. `Hace 3 horas`.
pub fn timesince_short(t: Option<&str>) -> String {
    timesince_short_at(t.and_then(parse_rfc3339), Utc::now())
}

pub fn timesince_short_at(t: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(t) = t else {
        return String::new();
    };
    let secs = (now - t).num_seconds();
    if secs < 60 {
        return "Justo ahora".to_string();
    }
    for (size, one, many) in UNITS {
        let n = secs / size;
        if n >= 1 {
            return format!("Hace {n} {}", if n == 1 { one } else { many });
        }
    }
    "Justo ahora".to_string()
}

/// CSS icon class for an incident type.
pub fn incident_type_icon(icon: Option<&str>) -> &str {
    match icon {
        None => "fas fa-exclamation-circle",
        Some(i) if i.trim().is_empty() => "fas fa-exclamation-triangle",
        Some(i) => i,
    }
}

pub struct DashboardService {
    state: StateCell,
    database: Database,
}

impl DashboardService {
    pub fn new(database: Database) -> Self {
        Self {
            state: StateCell::new(),
            database,
        }
    }

    /// Most recent active incidents with type, status and reporter.
    pub fn recent_incidents(&self) -> RimayResult<Vec<IncidentDetail>> {
        let conn = self.database.conn()?;
        queries::recent_active_incidents(&conn, DASHBOARD_INCIDENTS_LIMIT)
    }
}

impl Service for DashboardService {
    fn name(&self) -> &str { "dashboard" }
    fn state(&self) -> ServiceState { self.state.get() }
    fn init(&self) -> RimayResult<()> {
        self.state.set(ServiceState::Running);
        info!("dashboard service initialized");
        Ok(())
    }
    fn shutdown(&self) -> RimayResult<()> {
        self.state.set(ServiceState::Stopped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rimay_models::{Incident, IncidentStatus, IncidentType, User};

    #[test]
    fn test_timesince_units() {
        let now = Utc::now();
        let ago = |s: i64| timesince_short_at(Some(now - Duration::seconds(s)), now);
        assert_eq!(timesince_short_at(None, now), "");
        assert_eq!(ago(-30), "Justo ahora");
        assert_eq!(ago(59), "Justo ahora");
        assert_eq!(ago(60), "Hace 1 min");
        assert_eq!(ago(45 * 60), "Hace 45 min");
        assert_eq!(ago(3600), "Hace 1 hora");
        assert_eq!(ago(5 * 3600), "Hace 5 horas");
        assert_eq!(ago(86400), "Hace 1 día");
        assert_eq!(ago(3 * 86400), "Hace 3 días");
        assert_eq!(ago(14 * 86400), "Hace 2 semanas");
        assert_eq!(ago(60 * 86400), "Hace 2 meses");
    }

    #[test]
    fn test_timesince_unparseable_is_empty() {
        assert_eq!(timesince_short(Some("yesterday")), "");
    }

    #[test]
    fn test_icon_fallbacks() {
        assert_eq!(incident_type_icon(None), "fas fa-exclamation-circle");
        assert_eq!(incident_type_icon(Some("")), "fas fa-exclamation-triangle");
        assert_eq!(incident_type_icon(Some("fas fa-fire")), "fas fa-fire");
    }

    #[test]
    fn test_recent_incidents_active_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::init(&dir.path().join("dash.db"), &Default::default()).unwrap();
        let conn = db.conn().unwrap();
        let uid = User::new("a", "1", "a@x.com", "Ana", "Paz").save(&conn).unwrap();
        let (t, _) = IncidentType::get_or_create_by_name(&conn, "Robo").unwrap();
        let s = IncidentStatus::reported(&conn).unwrap();
        for i in 0..7 {
            let mut incident = Incident::new(uid, t.id.unwrap(), s.id.unwrap(), "Robo");
            incident.is_active = i != 0;
            incident.save(&conn).unwrap();
        }

        let svc = DashboardService::new(db.clone());
        let recent = svc.recent_incidents().unwrap();
        assert_eq!(recent.len(), 5);
        assert!(recent.iter().all(|d| d.incident.is_active));
        assert_eq!(recent[0].reporter_full_name, "ANA PAZ");
    }
}
