//! Comments left on an incident.

use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, Row};
use rimay_core::error::{RimayError, RimayResult};
use rimay_core::time::now_rfc3339;

use crate::db::sql_err;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentComment {
    pub id: Option<i64>,
    pub incident_id: i64,
    pub user_id: i64,
    pub comment: String,
    pub is_anonymous: bool,
    pub is_active: bool,
    pub created_at: String,
}

/// A comment joined with its author's username.
#[derive(Debug, Clone, Serialize)]
pub struct CommentWithAuthor {
    pub comment: IncidentComment,
    pub username: String,
}

impl IncidentComment {
    pub fn new(incident_id: i64, user_id: i64, comment: &str) -> Self {
        Self {
            id: None,
            incident_id,
            user_id,
            comment: comment.to_string(),
            is_anonymous: false,
            is_active: true,
            created_at: now_rfc3339(),
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            incident_id: row.get("incident_id")?,
            user_id: row.get("user_id")?,
            comment: row.get("comment")?,
            is_anonymous: row.get("is_anonymous")?,
            is_active: row.get("is_active")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Active comments, oldest first.
    pub fn active_for_incident(conn: &Connection, incident_id: i64) -> RimayResult<Vec<CommentWithAuthor>> {
        let mut stmt = conn
            .prepare(
                "SELECT c.*, u.username AS author_username
                 FROM incident_comments c JOIN users u ON u.id = c.user_id
                 WHERE c.incident_id = ?1 AND c.is_active = 1
                 ORDER BY c.created_at, c.id",
            )
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([incident_id], |row| {
                Ok(CommentWithAuthor {
                    comment: Self::from_row(row)?,
                    username: row.get("author_username")?,
                })
            })
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }

    pub fn save(&mut self, conn: &Connection) -> RimayResult<i64> {
        conn.execute(
            "INSERT INTO incident_comments (incident_id, user_id, comment, is_anonymous, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![self.incident_id, self.user_id, self.comment, self.is_anonymous, self.is_active, self.created_at],
        )
        .map_err(sql_err)?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }
}

impl CommentWithAuthor {
    /// Name to show next to the comment.
    pub fn display_author(&self) -> &str {
        if self.comment.is_anonymous {
            "Anónimo"
        } else {
            &self.username
        }
    }
}
