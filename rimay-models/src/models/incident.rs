//! Reported incident entity model.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rimay_core::error::{RimayError, RimayResult};
use rimay_core::time::now_rfc3339;

use crate::db::sql_err;
use crate::geo::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Option<i64>,
    pub reported_by: i64,
    pub incident_type_id: i64,
    pub incident_status_id: i64,
    pub title: String,
    pub description: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub is_anonymous: bool,
    pub severity_level: Option<i64>,
    pub is_active: bool,
    pub occurred_at: Option<String>,
    pub reported_at: String,
    pub updated_at: String,
}

impl Incident {
    pub fn new(reported_by: i64, incident_type_id: i64, incident_status_id: i64, title: &str) -> Self {
        let now = now_rfc3339();
        Self {
            id: None,
            reported_by,
            incident_type_id,
            incident_status_id,
            title: title.to_string(),
            description: String::new(),
            latitude: None,
            longitude: None,
            address: None,
            is_anonymous: false,
            severity_level: None,
            is_active: true,
            occurred_at: None,
            reported_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            reported_by: row.get("reported_by")?,
            incident_type_id: row.get("incident_type_id")?,
            incident_status_id: row.get("incident_status_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            address: row.get("address")?,
            is_anonymous: row.get("is_anonymous")?,
            severity_level: row.get("severity_level")?,
            is_active: row.get("is_active")?,
            occurred_at: row.get("occurred_at")?,
            reported_at: row.get("reported_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM incidents WHERE id = ?1", [id], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    /// The user's most recent reports, newest first.
    pub fn recent_for_user(conn: &Connection, user_id: i64, limit: u32) -> RimayResult<Vec<Self>> {
        let mut stmt = conn
            .prepare(
                "SELECT * FROM incidents WHERE reported_by = ?1
                 ORDER BY reported_at DESC, id DESC LIMIT ?2",
            )
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![user_id, limit], Self::from_row)
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }

    pub fn set_status(conn: &Connection, id: i64, status_id: i64) -> RimayResult<bool> {
        let changed = conn
            .execute(
                "UPDATE incidents SET incident_status_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![status_id, now_rfc3339(), id],
            )
            .map_err(sql_err)?;
        Ok(changed > 0)
    }

    pub fn location(&self) -> Option<GeoPoint> {
        GeoPoint::from_parts(self.latitude, self.longitude)
    }

    pub fn set_location(&mut self, point: Option<GeoPoint>) {
        self.latitude = point.map(|p| p.latitude);
        self.longitude = point.map(|p| p.longitude);
    }

    /// Compact API representation used by the recent-reports listing.
    pub fn to_api_json(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "description": self.description,
            "occurred_at": self.occurred_at,
            "severity_level": self.severity_level,
        })
    }

    pub fn save(&mut self, conn: &Connection) -> RimayResult<i64> {
        self.updated_at = now_rfc3339();
        match self.id {
            None => {
                conn.execute(
                    "INSERT INTO incidents (
                        reported_by, incident_type_id, incident_status_id, title, description,
                        latitude, longitude, address, is_anonymous, severity_level, is_active,
                        occurred_at, reported_at, updated_at
                    ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
                    params![
                        self.reported_by,
                        self.incident_type_id,
                        self.incident_status_id,
                        self.title,
                        self.description,
                        self.latitude,
                        self.longitude,
                        self.address,
                        self.is_anonymous,
                        self.severity_level,
                        self.is_active,
                        self.occurred_at,
                        self.reported_at,
                        self.updated_at,
                    ],
                )
                .map_err(sql_err)?;
                let id = conn.last_insert_rowid();
                self.id = Some(id);
                Ok(id)
            }
            Some(id) => {
                conn.execute(
                    "UPDATE incidents SET
                        incident_type_id = ?1, incident_status_id = ?2, title = ?3,
                        description = ?4, latitude = ?5, longitude = ?6, address = ?7,
                        is_anonymous = ?8, severity_level = ?9, is_active = ?10,
                        occurred_at = ?11, updated_at = ?12
                    WHERE id = ?13",
                    params![
                        self.incident_type_id,
                        self.incident_status_id,
                        self.title,
                        self.description,
                        self.latitude,
                        self.longitude,
                        self.address,
                        self.is_anonymous,
                        self.severity_level,
                        self.is_active,
                        self.occurred_at,
                        self.updated_at,
                        id,
                    ],
                )
                .map_err(sql_err)?;
                Ok(id)
            }
        }
    }
}

impl std::fmt::Display for Incident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title)
    }
}
