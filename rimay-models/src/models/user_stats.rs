//! Per-user incident counters.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rimay_core::error::{RimayError, RimayResult};
use rimay_core::time::now_rfc3339;

use crate::db::sql_err;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub id: Option<i64>,
    pub user_id: i64,
    pub total_alerts: i64,
    pub total_alerts_resolved: i64,
    pub total_alerts_pending: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl UserStats {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            total_alerts: row.get("total_alerts")?,
            total_alerts_resolved: row.get("total_alerts_resolved")?,
            total_alerts_pending: row.get("total_alerts_pending")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find_by_user(conn: &Connection, user_id: i64) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM user_stats WHERE user_id = ?1", [user_id], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    /// Ensure a zeroed row exists for the user.
    pub fn ensure(conn: &Connection, user_id: i64) -> RimayResult<Self> {
        let now = now_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO user_stats (user_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![user_id, now],
        )
        .map_err(sql_err)?;
        Self::find_by_user(conn, user_id)?
            .ok_or_else(|| RimayError::Database(format!("stats row missing for user {user_id}")))
    }

    /// A new report: total +1, pending +1.
    pub fn record_reported(conn: &Connection, user_id: i64) -> RimayResult<Self> {
        Self::ensure(conn, user_id)?;
        conn.execute(
            "UPDATE user_stats SET
                total_alerts = total_alerts + 1,
                total_alerts_pending = total_alerts_pending + 1,
                updated_at = ?1
             WHERE user_id = ?2",
            params![now_rfc3339(), user_id],
        )
        .map_err(sql_err)?;
        Self::ensure(conn, user_id)
    }

    /// A report resolved: pending -1 (never below zero), resolved +1.
    pub fn record_resolved(conn: &Connection, user_id: i64) -> RimayResult<Self> {
        Self::ensure(conn, user_id)?;
        conn.execute(
            "UPDATE user_stats SET
                total_alerts_pending = MAX(0, total_alerts_pending - 1),
                total_alerts_resolved = total_alerts_resolved + 1,
                updated_at = ?1
             WHERE user_id = ?2",
            params![now_rfc3339(), user_id],
        )
        .map_err(sql_err)?;
        Self::ensure(conn, user_id)
    }

    pub fn to_api_json(&self) -> Value {
        json!({
            "id": self.id,
            "total_alerts": self.total_alerts,
            "total_alerts_resolved": self.total_alerts_resolved,
            "total_alerts_pending": self.total_alerts_pending,
        })
    }
}
