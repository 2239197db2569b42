//! Device push tokens registered by mobile clients.

use serde::{Deserialize, Serialize};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rimay_core::error::{RimayError, RimayResult};
use rimay_core::time::now_rfc3339;

use crate::db::sql_err;

/// A Firebase Cloud Messaging registration token.
///
/// Tokens are globally unique; re-registering a token from another account
/// moves it to that account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmToken {
    pub id: Option<i64>,
    pub user_id: i64,
    pub token: String,
    pub device_id: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl FcmToken {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            token: row.get("token")?,
            device_id: row.get("device_id")?,
            is_active: row.get("is_active")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find_by_token(conn: &Connection, token: &str) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM fcm_tokens WHERE token = ?1", [token], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    /// Insert or reassign a token to `user_id`, marking it active.
    pub fn upsert(conn: &Connection, user_id: i64, token: &str, device_id: Option<&str>) -> RimayResult<Self> {
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO fcm_tokens (user_id, token, device_id, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)
             ON CONFLICT(token) DO UPDATE SET
                user_id = excluded.user_id,
                device_id = excluded.device_id,
                is_active = 1,
                updated_at = excluded.updated_at",
            params![user_id, token, device_id, now],
        )
        .map_err(sql_err)?;

        Self::find_by_token(conn, token)?
            .ok_or_else(|| RimayError::Database(format!("fcm token vanished after upsert: {token}")))
    }

    /// All of a user's tokens, newest first.
    pub fn for_user(conn: &Connection, user_id: i64) -> RimayResult<Vec<Self>> {
        let mut stmt = conn
            .prepare("SELECT * FROM fcm_tokens WHERE user_id = ?1 ORDER BY created_at DESC, id DESC")
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([user_id], Self::from_row)
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Active token strings belonging to any of the users.
    pub fn active_tokens_for_users(conn: &Connection, user_ids: &[i64]) -> RimayResult<Vec<String>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; user_ids.len()].join(",");
        let sql = format!(
            "SELECT token FROM fcm_tokens WHERE is_active = 1 AND user_id IN ({placeholders})
             ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| RimayError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(user_ids.iter()), |row| row.get(0))
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Mark the given token strings inactive. Returns rows changed.
    pub fn deactivate_tokens(conn: &Connection, tokens: &[String]) -> RimayResult<usize> {
        if tokens.is_empty() {
            return Ok(0);
        }
        let placeholders: Vec<String> = (2..tokens.len() + 2).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "UPDATE fcm_tokens SET is_active = 0, updated_at = ?1 WHERE token IN ({})",
            placeholders.join(",")
        );
        let now = now_rfc3339();
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&now];
        values.extend(tokens.iter().map(|t| t as &dyn rusqlite::ToSql));
        conn.execute(&sql, values.as_slice())
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    /// Deactivate every active token of the user except `keep`.
    pub fn deactivate_others(conn: &Connection, user_id: i64, keep: &str) -> RimayResult<usize> {
        conn.execute(
            "UPDATE fcm_tokens SET is_active = 0, updated_at = ?1
             WHERE user_id = ?2 AND is_active = 1 AND token != ?3",
            params![now_rfc3339(), user_id, keep],
        )
        .map_err(|e| RimayError::Database(e.to_string()))
    }

    /// Shortened token for logs and tables.
    pub fn preview(&self) -> String {
        let head: String = self.token.chars().take(20).collect();
        format!("{head}...")
    }
}
