//! Incident reporting service.
//!
//! Reports arrive from the mobile app as a JSON `data` field plus an
//! optional image. Creating one touches several tables, so the writes run
//! in one transaction and the push fan-out is left to the event bus.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use rimay_core::constants::{media_types, PAGE_SIZE, RECENT_INCIDENTS_LIMIT};
use rimay_core::error::{RimayError, RimayResult};
use rimay_core::time::now_rfc3339;
use rimay_models::models::incident_comment::CommentWithAuthor;
use rimay_models::queries::{self, IncidentDetail, IncidentFilter, Page};
use rimay_models::{
    Database, GeoPoint, Incident, IncidentComment, IncidentMedia, IncidentNotification,
    IncidentStatus, IncidentType, UserProfile, UserStats,
};

use crate::event_bus::{AppEvent, EventBus};
use crate::input::{self, Coordinate};
use crate::service::{Service, ServiceState, StateCell};

pub const DATA_REQUIRED: &str = "Campo \"data\" es requerido";
pub const NO_USER_LOCATION: &str = "Usuario sin ubicación configurada";

/// Fields of the `data` JSON sent by the app.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentPayload {
    #[serde(rename = "type")]
    pub incident_type: Option<String>,
    pub description: Option<String>,
    /// Free-text address.
    pub location: Option<String>,
    pub latitude: Option<Value>,
    pub longitude: Option<Value>,
}

impl IncidentPayload {
    /// Both coordinates when valid, otherwise no location.
    pub fn point(&self) -> Option<GeoPoint> {
        let lat = Coordinate::parse(self.latitude.as_ref()).value();
        let lng = Coordinate::parse(self.longitude.as_ref()).value();
        GeoPoint::from_parts(lat, lng)
    }
}

/// An image attached to a report.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Incidents around a user, split by ownership.
#[derive(Debug, Clone, Serialize)]
pub struct MapView {
    pub my_incidents: Vec<Value>,
    pub other_incidents: Vec<Value>,
    pub total_count: usize,
    pub radius_km: f64,
    pub user_location: GeoPoint,
}

/// An incident with everything the detail page shows.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentView {
    pub detail: IncidentDetail,
    pub media: Vec<IncidentMedia>,
    pub comments: Vec<CommentWithAuthor>,
}

/// Query-string filters of the management list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentSearch {
    pub incident_type: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
}

impl IncidentSearch {
    pub fn filter(&self) -> IncidentFilter {
        let id = |v: &Option<String>| input::non_blank(v).and_then(|s| s.parse::<i64>().ok());
        IncidentFilter {
            incident_type_id: id(&self.incident_type),
            incident_status_id: id(&self.status),
            active_only: false,
        }
    }
}

/// Keep the last path component and only filename-safe characters.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}

/// Service for incident reports.
pub struct IncidentService {
    state: StateCell,
    database: Database,
    event_bus: EventBus,
    media_root: PathBuf,
    max_upload_bytes: usize,
    map_radius_km: f64,
}

impl IncidentService {
    /// Create a new IncidentService.
    pub fn new(
        database: Database,
        event_bus: EventBus,
        media_root: PathBuf,
        max_upload_bytes: usize,
        map_radius_km: f64,
    ) -> Self {
        Self {
            state: StateCell::new(),
            database,
            event_bus,
            media_root,
            max_upload_bytes,
            map_radius_km,
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    // ─── Reporting ───────────────────────────────────────────────────────

    /// Parse the raw `data` field and create the incident.
    pub fn create_from_json(&self, user_id: i64, data: Option<&str>, image: Option<UploadedImage>) -> RimayResult<Incident> {
        let raw = data.map(str::trim).filter(|s| !s.is_empty())
            .ok_or_else(|| RimayError::field("data", DATA_REQUIRED))?;
        let payload: IncidentPayload = serde_json::from_str(raw)?;
        self.create_incident(user_id, &payload, image)
    }

    /// Create an incident reported by `user_id`.
    pub fn create_incident(&self, user_id: i64, payload: &IncidentPayload, image: Option<UploadedImage>) -> RimayResult<Incident> {
        let type_name = input::non_blank(&payload.incident_type)
            .ok_or_else(|| RimayError::field("type", input::REQUIRED))?
            .to_string();

        if let Some(img) = &image {
            if img.bytes.len() > self.max_upload_bytes {
                return Err(RimayError::field(
                    "image",
                    format!("La imagen supera el tamaño máximo de {} bytes.", self.max_upload_bytes),
                ));
            }
        }

        let point = payload.point();
        if point.is_none() && (payload.latitude.is_some() || payload.longitude.is_some()) {
            debug!("ignoring unusable coordinates for report by user {user_id}");
        }

        let stored = match &image {
            Some(img) => Some(self.store_image(img)?),
            None => None,
        };

        let result = self.database.transaction(|conn| {
            let (incident_type, created) = IncidentType::get_or_create_by_name(conn, &type_name)?;
            if created {
                info!("created incident type {type_name}");
            }
            let status = IncidentStatus::reported(conn)?;
            let type_id = incident_type.id.ok_or_else(|| RimayError::Internal("type without id".into()))?;
            let status_id = status.id.ok_or_else(|| RimayError::Internal("status without id".into()))?;

            let mut incident = Incident::new(user_id, type_id, status_id, &type_name);
            incident.description = input::non_blank(&payload.description).unwrap_or_default().to_string();
            incident.address = input::non_blank(&payload.location).map(str::to_string);
            incident.set_location(point);
            incident.is_anonymous = true;
            incident.occurred_at = Some(now_rfc3339());
            let incident_id = incident.save(conn)?;

            UserStats::record_reported(conn, user_id)?;

            if let Some(rel) = &stored {
                IncidentMedia::new(incident_id, media_types::IMAGE, Some(rel.clone())).save(conn)?;
            }
            Ok(incident)
        });

        let incident = match result {
            Ok(i) => i,
            Err(e) => {
                if let Some(rel) = &stored {
                    let _ = std::fs::remove_file(self.media_root.join(rel));
                }
                return Err(e);
            }
        };

        let incident_id = incident.id.unwrap_or_default();
        info!("incident {incident_id} ({type_name}) reported by user {user_id}");
        self.event_bus.emit(AppEvent::IncidentReported {
            incident_id,
            reporter_id: user_id,
            incident_type: type_name,
            location: incident.location(),
        });
        Ok(incident)
    }

    /// Write the image under `incidents/YYYY/MM/DD/` and return the path
    /// relative to the media root.
    fn store_image(&self, image: &UploadedImage) -> RimayResult<String> {
        let dir = Utc::now().format("incidents/%Y/%m/%d").to_string();
        let name = format!("{}-{}", uuid::Uuid::new_v4().simple(), sanitize_file_name(&image.file_name));
        std::fs::create_dir_all(self.media_root.join(&dir))?;
        let rel = format!("{dir}/{name}");
        std::fs::write(self.media_root.join(&rel), &image.bytes)?;
        debug!("stored {} bytes at {rel}", image.bytes.len());
        Ok(rel)
    }

    // ─── Mobile queries ──────────────────────────────────────────────────

    /// The user's most recent reports in API form.
    pub fn list_recent(&self, user_id: i64) -> RimayResult<Vec<Value>> {
        let conn = self.database.conn()?;
        let incidents = Incident::recent_for_user(&conn, user_id, RECENT_INCIDENTS_LIMIT)?;
        Ok(incidents.iter().map(Incident::to_api_json).collect())
    }

    /// Active incidents around the user's profile location.
    pub fn map_incidents(&self, user_id: i64) -> RimayResult<MapView> {
        let conn = self.database.conn()?;
        let center = UserProfile::find_by_user(&conn, user_id)?
            .and_then(|p| p.location())
            .ok_or_else(|| RimayError::field("location", NO_USER_LOCATION))?;

        let nearby = queries::incidents_near(&conn, user_id, &center, self.map_radius_km)?;
        let total_count = nearby.len();
        let (mine, others): (Vec<_>, Vec<_>) = nearby.into_iter().partition(|m| m.is_own);

        Ok(MapView {
            my_incidents: mine.iter().map(|m| m.to_map_json()).collect(),
            other_incidents: others.iter().map(|m| m.to_map_json()).collect(),
            total_count,
            radius_km: self.map_radius_km,
            user_location: center,
        })
    }

    /// Mark the user's notification for the incident as read.
    pub fn mark_read(&self, user_id: i64, incident_id: i64) -> RimayResult<()> {
        let conn = self.database.conn()?;
        if IncidentNotification::mark_read(&conn, incident_id, user_id)? {
            Ok(())
        } else {
            Err(RimayError::NotFound(format!("notification for incident {incident_id}")))
        }
    }

    // ─── Management pages ────────────────────────────────────────────────

    pub fn list(&self, search: &IncidentSearch) -> RimayResult<Page<IncidentDetail>> {
        let conn = self.database.conn()?;
        queries::list_incidents(&conn, &search.filter(), search.page.unwrap_or(1), PAGE_SIZE)
    }

    pub fn detail(&self, id: i64) -> RimayResult<Option<IncidentView>> {
        let conn = self.database.conn()?;
        let Some(detail) = queries::incident_detail(&conn, id)? else {
            return Ok(None);
        };
        Ok(Some(IncidentView {
            media: IncidentMedia::for_incident(&conn, id)?,
            comments: IncidentComment::active_for_incident(&conn, id)?,
            detail,
        }))
    }

    /// Move an incident to the resolved status and update the reporter's
    /// counters. Resolving an already resolved incident changes nothing: the
    /// status stays, the counters are not touched again and no event is
    /// emitted.
    pub fn resolve(&self, id: i64) -> RimayResult<Incident> {
        let (incident, changed) = self.database.transaction(|conn| {
            let mut incident = Incident::find_by_id(conn, id)?
                .ok_or_else(|| RimayError::NotFound(format!("incident {id}")))?;
            let resolved = IncidentStatus::resolved(conn)?
                .ok_or_else(|| RimayError::NotFound("resolved incident status".into()))?;
            let resolved_id = resolved.id.ok_or_else(|| RimayError::Internal("status without id".into()))?;

            if incident.incident_status_id == resolved_id {
                return Ok((incident, false));
            }
            Incident::set_status(conn, id, resolved_id)?;
            UserStats::record_resolved(conn, incident.reported_by)?;
            incident.incident_status_id = resolved_id;
            Ok((incident, true))
        })?;

        if changed {
            info!("incident {id} resolved");
            self.event_bus.emit(AppEvent::IncidentResolved {
                incident_id: id,
                reporter_id: incident.reported_by,
            });
        } else {
            warn!("incident {id} was already resolved");
        }
        Ok(incident)
    }

    pub fn types(&self) -> RimayResult<Vec<IncidentType>> {
        let conn = self.database.conn()?;
        IncidentType::list(&conn)
    }

    pub fn statuses(&self) -> RimayResult<Vec<IncidentStatus>> {
        let conn = self.database.conn()?;
        IncidentStatus::list(&conn)
    }
}

impl Service for IncidentService {
    fn name(&self) -> &str { "incident" }
    fn state(&self) -> ServiceState { self.state.get() }
    fn init(&self) -> RimayResult<()> {
        self.state.set(ServiceState::Initializing);
        std::fs::create_dir_all(&self.media_root)
            .map_err(|e| RimayError::ServiceInit(format!("media root {}: {e}", self.media_root.display())))?;
        self.state.set(ServiceState::Running);
        info!("incident service initialized, media at {}", self.media_root.display());
        Ok(())
    }
    fn shutdown(&self) -> RimayResult<()> {
        self.state.set(ServiceState::Stopped);
        Ok(())
    }
}
