//! Geographically scoped community.

use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rimay_core::error::{RimayError, RimayResult};
use rimay_core::time::now_rfc3339;

use crate::db::sql_err;
use crate::geo::{GeoPoint, Polygon};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: Option<i64>,
    pub name: String,
    pub description: String,
    /// GeoJSON Polygon text.
    pub boundary_area: Option<String>,
    pub postal_code: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Community {
    pub fn new(name: &str) -> Self {
        let now = now_rfc3339();
        Self {
            id: None,
            name: name.to_string(),
            description: String::new(),
            boundary_area: None,
            postal_code: String::new(),
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            boundary_area: row.get("boundary_area")?,
            postal_code: row.get("postal_code")?,
            is_active: row.get("is_active")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM communities WHERE id = ?1", [id], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    /// First active community (lowest id) whose boundary contains the point.
    pub fn find_containing(conn: &Connection, point: &GeoPoint) -> RimayResult<Option<Self>> {
        let mut stmt = conn
            .prepare(
                "SELECT * FROM communities
                 WHERE is_active = 1 AND boundary_area IS NOT NULL
                   AND min_lat <= ?1 AND max_lat >= ?1
                   AND min_lng <= ?2 AND max_lng >= ?2
                 ORDER BY id",
            )
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let candidates = stmt
            .query_map(params![point.latitude, point.longitude], Self::from_row)
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;

        Ok(candidates
            .into_iter()
            .find(|c| c.boundary().map(|poly| poly.contains(point)).unwrap_or(false)))
    }

    /// Parsed boundary, if present and well formed.
    pub fn boundary(&self) -> Option<Polygon> {
        self.boundary_area
            .as_deref()
            .and_then(|s| Polygon::from_geojson_str(s).ok())
    }

    pub fn set_boundary(&mut self, polygon: Option<&Polygon>) {
        self.boundary_area = polygon.map(|p| p.to_geojson_string());
    }

    pub fn member_count(conn: &Connection, id: i64) -> RimayResult<i64> {
        conn.query_row(
            "SELECT COUNT(*) FROM community_memberships WHERE community_id = ?1",
            [id],
            |r| r.get(0),
        )
        .map_err(|e| RimayError::Database(e.to_string()))
    }

    pub fn delete(conn: &Connection, id: i64) -> RimayResult<bool> {
        let changed = conn
            .execute("DELETE FROM communities WHERE id = ?1", [id])
            .map_err(sql_err)?;
        Ok(changed > 0)
    }

    /// Insert or update. The cached bounding box follows the boundary.
    pub fn save(&mut self, conn: &Connection) -> RimayResult<i64> {
        self.updated_at = now_rfc3339();
        let bbox = self.boundary().map(|p| p.bounding_box());
        let (min_lat, max_lat, min_lng, max_lng) = match bbox {
            Some(b) => (Some(b.min_lat), Some(b.max_lat), Some(b.min_lng), Some(b.max_lng)),
            None => (None, None, None, None),
        };

        match self.id {
            None => {
                conn.execute(
                    "INSERT INTO communities (
                        name, description, boundary_area, min_lat, max_lat, min_lng, max_lng,
                        postal_code, is_active, created_at, updated_at
                    ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                    params![
                        self.name,
                        self.description,
                        self.boundary_area,
                        min_lat,
                        max_lat,
                        min_lng,
                        max_lng,
                        self.postal_code,
                        self.is_active,
                        self.created_at,
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
                    "UPDATE communities SET
                        name = ?1, description = ?2, boundary_area = ?3,
                        min_lat = ?4, max_lat = ?5, min_lng = ?6, max_lng = ?7,
                        postal_code = ?8, is_active = ?9, updated_at = ?10
                    WHERE id = ?11",
                    params![
                        self.name,
                        self.description,
                        self.boundary_area,
                        min_lat,
                        max_lat,
                        min_lng,
                        max_lng,
                        self.postal_code,
                        self.is_active,
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

impl std::fmt::Display for Community {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
