//! Files attached to an incident.

use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, Row};
use rimay_core::constants::media_types;
use rimay_core::error::{RimayError, RimayResult};
use rimay_core::time::now_rfc3339;

use crate::db::sql_err;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentMedia {
    pub id: Option<i64>,
    pub incident_id: i64,
    /// One of `image`, `video`, `audio`.
    pub media_type: String,
    /// Path relative to the media root.
    pub file_path: Option<String>,
    pub description: Option<String>,
    pub uploaded_at: String,
}

impl IncidentMedia {
    pub fn new(incident_id: i64, media_type: &str, file_path: Option<String>) -> Self {
        Self {
            id: None,
            incident_id,
            media_type: media_type.to_string(),
            file_path,
            description: None,
            uploaded_at: now_rfc3339(),
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            incident_id: row.get("incident_id")?,
            media_type: row.get("media_type")?,
            file_path: row.get("file_path")?,
            description: row.get("description")?,
            uploaded_at: row.get("uploaded_at")?,
        })
    }

    pub fn for_incident(conn: &Connection, incident_id: i64) -> RimayResult<Vec<Self>> {
        let mut stmt = conn
            .prepare("SELECT * FROM incident_media WHERE incident_id = ?1 ORDER BY id")
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([incident_id], Self::from_row)
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }

    pub fn is_image(&self) -> bool {
        self.media_type == media_types::IMAGE
    }

    pub fn save(&mut self, conn: &Connection) -> RimayResult<i64> {
        if !media_types::ALL.contains(&self.media_type.as_str()) {
            return Err(RimayError::field("media_type", format!("Tipo de medio inválido: {}", self.media_type)));
        }
        conn.execute(
            "INSERT INTO incident_media (incident_id, media_type, file_path, description, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![self.incident_id, self.media_type, self.file_path, self.description, self.uploaded_at],
        )
        .map_err(sql_err)?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }
}
