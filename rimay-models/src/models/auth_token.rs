//! API authentication token, one per user.

use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rimay_core::error::{RimayError, RimayResult};
use rimay_core::time::now_rfc3339;

use crate::db::sql_err;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub key: String,
    pub user_id: i64,
    pub created_at: String,
}

impl AuthToken {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get("key")?,
            user_id: row.get("user_id")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn find_by_key(conn: &Connection, key: &str) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM auth_tokens WHERE key = ?1", [key], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    pub fn find_by_user(conn: &Connection, user_id: i64) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM auth_tokens WHERE user_id = ?1", [user_id], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    /// Store a freshly generated key for a user that has none.
    pub fn create(conn: &Connection, user_id: i64, key: &str) -> RimayResult<Self> {
        let token = Self {
            key: key.to_string(),
            user_id,
            created_at: now_rfc3339(),
        };
        conn.execute(
            "INSERT INTO auth_tokens (key, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token.key, token.user_id, token.created_at],
        )
        .map_err(sql_err)?;
        Ok(token)
    }

    /// Revoke the user's token. Returns whether one existed.
    pub fn delete_for_user(conn: &Connection, user_id: i64) -> RimayResult<bool> {
        let changed = conn
            .execute("DELETE FROM auth_tokens WHERE user_id = ?1", [user_id])
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(changed > 0)
    }
}
