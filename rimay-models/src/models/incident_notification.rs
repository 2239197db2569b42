//! Record of a user having been notified about an incident.

use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rimay_core::error::{RimayError, RimayResult};
use rimay_core::time::now_rfc3339;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentNotification {
    pub id: Option<i64>,
    pub incident_id: i64,
    pub notified_user_id: i64,
    pub notification_sent_at: String,
    pub was_read: bool,
    pub read_at: Option<String>,
}

impl IncidentNotification {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            incident_id: row.get("incident_id")?,
            notified_user_id: row.get("notified_user_id")?,
            notification_sent_at: row.get("notification_sent_at")?,
            was_read: row.get("was_read")?,
            read_at: row.get("read_at")?,
        })
    }

    pub fn find(conn: &Connection, incident_id: i64, user_id: i64) -> RimayResult<Option<Self>> {
        conn.query_row(
            "SELECT * FROM incident_notifications WHERE incident_id = ?1 AND notified_user_id = ?2",
            params![incident_id, user_id],
            Self::from_row,
        )
        .optional()
        .map_err(|e| RimayError::Database(e.to_string()))
    }

    /// Record notifications for many users, skipping pairs already recorded.
    /// Returns how many rows were inserted.
    pub fn record_many(conn: &Connection, incident_id: i64, user_ids: &[i64]) -> RimayResult<usize> {
        let now = now_rfc3339();
        let mut stmt = conn
            .prepare(
                "INSERT OR IGNORE INTO incident_notifications
                    (incident_id, notified_user_id, notification_sent_at, was_read)
                 VALUES (?1, ?2, ?3, 0)",
            )
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let mut inserted = 0;
        for uid in user_ids {
            inserted += stmt
                .execute(params![incident_id, uid, now])
                .map_err(|e| RimayError::Database(e.to_string()))?;
        }
        Ok(inserted)
    }

    /// Mark the user's notification for the incident as read.
    /// Returns false when no notification exists.
    pub fn mark_read(conn: &Connection, incident_id: i64, user_id: i64) -> RimayResult<bool> {
        let changed = conn
            .execute(
                "UPDATE incident_notifications SET was_read = 1, read_at = COALESCE(read_at, ?1)
                 WHERE incident_id = ?2 AND notified_user_id = ?3",
                params![now_rfc3339(), incident_id, user_id],
            )
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    /// A user's notifications, newest first.
    pub fn for_user(conn: &Connection, user_id: i64, limit: i64) -> RimayResult<Vec<Self>> {
        let mut stmt = conn
            .prepare(
                "SELECT * FROM incident_notifications WHERE notified_user_id = ?1
                 ORDER BY notification_sent_at DESC, id DESC LIMIT ?2",
            )
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![user_id, limit], Self::from_row)
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }
}
