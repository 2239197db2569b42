//! User account entity model.

use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rimay_core::error::{RimayError, RimayResult};
use rimay_core::time::now_rfc3339;

use crate::db::sql_err;

/// A registered account.
///
/// `dni` is the national identity document number and, like `username` and
/// `email`, is unique across all users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub username: String,
    pub dni: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Encoded password hash. Empty means no usable password.
    #[serde(skip_serializing, default)]
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: String,
    pub last_login: Option<String>,
}

impl User {
    /// New, unsaved, active user.
    pub fn new(username: &str, dni: &str, email: &str, first_name: &str, last_name: &str) -> Self {
        Self {
            id: None,
            username: username.to_string(),
            dni: dni.to_string(),
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            password: String::new(),
            is_active: true,
            is_staff: false,
            date_joined: now_rfc3339(),
            last_login: None,
        }
    }

    /// Construct a User from a database row.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            dni: row.get("dni")?,
            email: row.get("email")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            password: row.get("password")?,
            is_active: row.get("is_active")?,
            is_staff: row.get("is_staff")?,
            date_joined: row.get("date_joined")?,
            last_login: row.get("last_login")?,
        })
    }

    // ─── Static finders ──────────────────────────────────────────────────

    fn find_one(conn: &Connection, column: &str, value: &dyn rusqlite::ToSql) -> RimayResult<Option<Self>> {
        let sql = format!("SELECT * FROM users WHERE {column} = ?1");
        conn.query_row(&sql, &[value], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> RimayResult<Option<Self>> {
        Self::find_one(conn, "id", &id)
    }

    pub fn find_by_username(conn: &Connection, username: &str) -> RimayResult<Option<Self>> {
        Self::find_one(conn, "username", &username)
    }

    pub fn find_by_dni(conn: &Connection, dni: &str) -> RimayResult<Option<Self>> {
        Self::find_one(conn, "dni", &dni)
    }

    pub fn find_by_email(conn: &Connection, email: &str) -> RimayResult<Option<Self>> {
        Self::find_one(conn, "email", &email)
    }

    /// Names of the unique fields (`username`, `dni`, `email`) already taken.
    pub fn taken_fields(conn: &Connection, username: &str, dni: &str, email: &str) -> RimayResult<Vec<&'static str>> {
        let mut taken = Vec::new();
        if Self::find_by_username(conn, username)?.is_some() {
            taken.push("username");
        }
        if Self::find_by_dni(conn, dni)?.is_some() {
            taken.push("dni");
        }
        if Self::find_by_email(conn, email)?.is_some() {
            taken.push("email");
        }
        Ok(taken)
    }

    /// Users, newest first.
    pub fn list(conn: &Connection, limit: i64, offset: i64) -> RimayResult<Vec<Self>> {
        let mut stmt = conn
            .prepare("SELECT * FROM users ORDER BY id DESC LIMIT ?1 OFFSET ?2")
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![limit, offset], Self::from_row)
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Delete a user. Profile, tokens, memberships, incidents and stats cascade.
    pub fn delete(conn: &Connection, id: i64) -> RimayResult<bool> {
        let changed = conn
            .execute("DELETE FROM users WHERE id = ?1", [id])
            .map_err(sql_err)?;
        Ok(changed > 0)
    }

    pub fn set_active(conn: &Connection, id: i64, active: bool) -> RimayResult<bool> {
        let changed = conn
            .execute("UPDATE users SET is_active = ?1 WHERE id = ?2", params![active, id])
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    pub fn touch_last_login(conn: &Connection, id: i64) -> RimayResult<()> {
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now_rfc3339(), id],
        )
        .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Computed properties ─────────────────────────────────────────────

    /// `"FIRST LAST"` in upper case.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.to_uppercase(), self.last_name.to_uppercase())
    }

    pub fn has_usable_password(&self) -> bool {
        !self.password.is_empty()
    }

    /// Database id, or an error for users that were never saved.
    pub fn require_id(&self) -> RimayResult<i64> {
        self.id
            .ok_or_else(|| RimayError::Internal(format!("user {} has no id", self.username)))
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    /// Insert or update this user. Returns the local database ID.
    ///
    /// Unique violations on username, dni or email surface as `Conflict`.
    pub fn save(&mut self, conn: &Connection) -> RimayResult<i64> {
        match self.id {
            None => {
                conn.execute(
                    "INSERT INTO users (
                        username, dni, email, first_name, last_name, password,
                        is_active, is_staff, date_joined, last_login
                    ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                    params![
                        self.username,
                        self.dni,
                        self.email,
                        self.first_name,
                        self.last_name,
                        self.password,
                        self.is_active,
                        self.is_staff,
                        self.date_joined,
                        self.last_login,
                    ],
                )
                .map_err(sql_err)?;
                let id = conn.last_insert_rowid();
                self.id = Some(id);
                Ok(id)
            }
            Some(id) => {
                conn.execute(
                    "UPDATE users SET
                        username = ?1, dni = ?2, email = ?3, first_name = ?4,
                        last_name = ?5, password = ?6, is_active = ?7, is_staff = ?8,
                        last_login = ?9
                    WHERE id = ?10",
                    params![
                        self.username,
                        self.dni,
                        self.email,
                        self.first_name,
                        self.last_name,
                        self.password,
                        self.is_active,
                        self.is_staff,
                        self.last_login,
                        id,
                    ],
                )
                .map_err(sql_err)?;
                Ok(id)
            }
        }
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}
