//! Incident workflow status catalogue.

use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rimay_core::constants::status_codes;
use rimay_core::error::{RimayError, RimayResult};

use crate::db::sql_err;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentStatus {
    pub id: Option<i64>,
    pub name: String,
    pub code: String,
    pub description: String,
}

impl IncidentStatus {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            code: row.get("code")?,
            description: row.get("description")?,
        })
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM incident_statuses WHERE id = ?1", [id], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    pub fn find_by_code(conn: &Connection, code: &str) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM incident_statuses WHERE code = ?1", [code], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    pub fn find_by_name(conn: &Connection, name: &str) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM incident_statuses WHERE name = ?1", [name], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    /// Get a status by code, creating it with `name`/`description` if absent.
    pub fn get_or_create(conn: &Connection, code: &str, name: &str, description: &str) -> RimayResult<Self> {
        if let Some(existing) = Self::find_by_code(conn, code)? {
            return Ok(existing);
        }
        conn.execute(
            "INSERT INTO incident_statuses (code, name, description) VALUES (?1, ?2, ?3)",
            params![code, name, description],
        )
        .map_err(sql_err)?;
        Ok(Self {
            id: Some(conn.last_insert_rowid()),
            name: name.to_string(),
            code: code.to_string(),
            description: description.to_string(),
        })
    }

    /// Status assigned to newly reported incidents.
    pub fn reported(conn: &Connection) -> RimayResult<Self> {
        Self::get_or_create(
            conn,
            status_codes::REPORTED,
            "Reported",
            "Incident has been reported and is pending review.",
        )
    }

    /// The resolved status: by code first, then by name.
    pub fn resolved(conn: &Connection) -> RimayResult<Option<Self>> {
        match Self::find_by_code(conn, status_codes::RESOLVED)? {
            Some(s) => Ok(Some(s)),
            None => Self::find_by_name(conn, status_codes::RESOLVED_NAME),
        }
    }

    pub fn list(conn: &Connection) -> RimayResult<Vec<Self>> {
        let mut stmt = conn
            .prepare("SELECT * FROM incident_statuses ORDER BY id")
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::from_row)
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }
}
