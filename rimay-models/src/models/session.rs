//! Browser session rows backing the `rimay_session` cookie.
//!
//! A session also carries the selected permission group and one-shot flash
//! messages shown on the next rendered page.

use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rimay_core::error::{RimayError, RimayResult};
use rimay_core::time::{now_rfc3339, to_rfc3339};

use crate::db::sql_err;

/// Severity of a flash message; drives the CSS class on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl FlashLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Info => "info",
            FlashLevel::Warning => "warning",
            FlashLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    /// May contain trusted inline markup such as `<strong>`.
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub key: String,
    pub user_id: i64,
    pub group_id: Option<i64>,
    pub created_at: String,
    pub expires_at: String,
}

impl Session {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get("key")?,
            user_id: row.get("user_id")?,
            group_id: row.get("group_id")?,
            created_at: row.get("created_at")?,
            expires_at: row.get("expires_at")?,
        })
    }

    /// Create a session for the user that lasts `ttl_hours`.
    pub fn create(conn: &Connection, key: &str, user_id: i64, ttl_hours: i64) -> RimayResult<Self> {
        let now = chrono::Utc::now();
        let session = Self {
            key: key.to_string(),
            user_id,
            group_id: None,
            created_at: to_rfc3339(now),
            expires_at: to_rfc3339(now + chrono::Duration::hours(ttl_hours)),
        };
        conn.execute(
            "INSERT INTO sessions (key, user_id, group_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session.key, session.user_id, session.group_id, session.created_at, session.expires_at],
        )
        .map_err(sql_err)?;
        Ok(session)
    }

    /// Look up an unexpired session.
    pub fn find_valid(conn: &Connection, key: &str) -> RimayResult<Option<Self>> {
        conn.query_row(
            "SELECT * FROM sessions WHERE key = ?1 AND expires_at > ?2",
            params![key, now_rfc3339()],
            Self::from_row,
        )
        .optional()
        .map_err(|e| RimayError::Database(e.to_string()))
    }

    pub fn set_group(conn: &Connection, key: &str, group_id: Option<i64>) -> RimayResult<()> {
        conn.execute(
            "UPDATE sessions SET group_id = ?1 WHERE key = ?2",
            params![group_id, key],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    /// Queue a flash message for the next page render.
    pub fn push_flash(conn: &Connection, key: &str, level: FlashLevel, message: &str) -> RimayResult<()> {
        let mut pending = Self::read_flash(conn, key)?;
        pending.push(FlashMessage {
            level,
            message: message.to_string(),
        });
        Self::write_flash(conn, key, &pending)
    }

    /// Remove and return all queued flash messages.
    pub fn take_flash(conn: &Connection, key: &str) -> RimayResult<Vec<FlashMessage>> {
        let pending = Self::read_flash(conn, key)?;
        if !pending.is_empty() {
            Self::write_flash(conn, key, &[])?;
        }
        Ok(pending)
    }

    fn read_flash(conn: &Connection, key: &str) -> RimayResult<Vec<FlashMessage>> {
        let raw: Option<String> = conn
            .query_row("SELECT flash FROM sessions WHERE key = ?1", [key], |r| r.get(0))
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json).unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    fn write_flash(conn: &Connection, key: &str, messages: &[FlashMessage]) -> RimayResult<()> {
        let json = serde_json::to_string(messages)?;
        conn.execute("UPDATE sessions SET flash = ?1 WHERE key = ?2", params![json, key])
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(())
    }

    pub fn delete(conn: &Connection, key: &str) -> RimayResult<bool> {
        let changed = conn
            .execute("DELETE FROM sessions WHERE key = ?1", [key])
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Drop expired sessions. Returns how many were removed.
    pub fn purge_expired(conn: &Connection) -> RimayResult<usize> {
        conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now_rfc3339()])
            .map_err(|e| RimayError::Database(e.to_string()))
    }
}
