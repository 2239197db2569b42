//! Incident category catalogue.

use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rimay_core::error::{RimayError, RimayResult};

use crate::db::sql_err;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentType {
    pub id: Option<i64>,
    pub name: String,
    pub code: Option<String>,
    pub description: String,
    /// CSS icon class, e.g. `fas fa-fire`.
    pub icon: String,
    pub color_hex: String,
    pub default_severity: Option<i64>,
    pub requires_authority: bool,
}

/// Code derived from a type name: lower-case, spaces replaced by `_`.
pub fn code_for_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_").chars().take(20).collect()
}

impl IncidentType {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            code: Some(code_for_name(name)),
            description: format!("Tipo de incidente: {name}"),
            icon: String::new(),
            color_hex: String::new(),
            default_severity: None,
            requires_authority: false,
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            code: row.get("code")?,
            description: row.get("description")?,
            icon: row.get("icon")?,
            color_hex: row.get("color_hex")?,
            default_severity: row.get("default_severity")?,
            requires_authority: row.get("requires_authority")?,
        })
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM incident_types WHERE id = ?1", [id], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    pub fn find_by_name(conn: &Connection, name: &str) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM incident_types WHERE name = ?1", [name], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    fn code_taken(conn: &Connection, code: &str) -> RimayResult<bool> {
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM incident_types WHERE code = ?1", [code], |r| r.get(0))
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(n > 0)
    }

    /// Find a type by exact name or create it with derived defaults.
    ///
    /// When the derived code already belongs to another type the new type is
    /// stored without a code.
    pub fn get_or_create_by_name(conn: &Connection, name: &str) -> RimayResult<(Self, bool)> {
        if let Some(existing) = Self::find_by_name(conn, name)? {
            return Ok((existing, false));
        }
        let mut t = Self::new(name);
        if let Some(code) = &t.code {
            if Self::code_taken(conn, code)? {
                t.code = None;
            }
        }
        t.save(conn)?;
        Ok((t, true))
    }

    pub fn list(conn: &Connection) -> RimayResult<Vec<Self>> {
        let mut stmt = conn
            .prepare("SELECT * FROM incident_types ORDER BY name")
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::from_row)
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Delete a type. Refused with `Conflict` while incidents reference it.
    pub fn delete(conn: &Connection, id: i64) -> RimayResult<bool> {
        let changed = conn
            .execute("DELETE FROM incident_types WHERE id = ?1", [id])
            .map_err(sql_err)?;
        Ok(changed > 0)
    }

    pub fn save(&mut self, conn: &Connection) -> RimayResult<i64> {
        match self.id {
            None => {
                conn.execute(
                    "INSERT INTO incident_types (
                        name, code, description, icon, color_hex, default_severity, requires_authority
                    ) VALUES (?1,?2,?3,?4,?5,?6,?7)",
                    params![
                        self.name,
                        self.code,
                        self.description,
                        self.icon,
                        self.color_hex,
                        self.default_severity,
                        self.requires_authority,
                    ],
                )
                .map_err(sql_err)?;
                let id = conn.last_insert_rowid();
                self.id = Some(id);
                Ok(id)
            }
            Some(id) => {
                conn.execute(
                    "UPDATE incident_types SET
                        name = ?1, code = ?2, description = ?3, icon = ?4, color_hex = ?5,
                        default_severity = ?6, requires_authority = ?7
                    WHERE id = ?8",
                    params![
                        self.name,
                        self.code,
                        self.description,
                        self.icon,
                        self.color_hex,
                        self.default_severity,
                        self.requires_authority,
                        id,
                    ],
                )
                .map_err(sql_err)?;
                Ok(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_code_for_name() {
        assert_eq!(code_for_name("Robo a mano armada"), "robo_a_mano_armada");
        assert_eq!(code_for_name("Incendio"), "incendio");
        assert_eq!(code_for_name(&"x".repeat(30)).len(), 20);
    }

    #[test]
    fn test_get_or_create_by_name() {
        let conn = setup();
        let (t, created) = IncidentType::get_or_create_by_name(&conn, "Robo").unwrap();
        assert!(created);
        assert_eq!(t.code.as_deref(), Some("robo"));
        assert_eq!(t.description, "Tipo de incidente: Robo");

        let (again, created) = IncidentType::get_or_create_by_name(&conn, "Robo").unwrap();
        assert!(!created);
        assert_eq!(again.id, t.id);
    }

    #[test]
    fn test_code_collision_leaves_code_empty() {
        let conn = setup();
        IncidentType::get_or_create_by_name(&conn, "Robo").unwrap();
        let (other, created) = IncidentType::get_or_create_by_name(&conn, "ROBO").unwrap();
        assert!(created);
        assert!(other.code.is_none());
    }
}
