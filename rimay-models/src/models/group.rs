//! Permission groups and permission codenames.

use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rimay_core::error::{RimayError, RimayResult};

use crate::db::sql_err;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    pub codename: String,
    pub name: String,
}

impl Permission {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            codename: row.get("codename")?,
            name: row.get("name")?,
        })
    }

    pub fn find_by_codename(conn: &Connection, codename: &str) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM permissions WHERE codename = ?1", [codename], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    pub fn list(conn: &Connection) -> RimayResult<Vec<Self>> {
        let mut stmt = conn
            .prepare("SELECT * FROM permissions ORDER BY codename")
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::from_row)
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }
}

impl Group {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }

    pub fn create(conn: &Connection, name: &str) -> RimayResult<Self> {
        conn.execute("INSERT INTO auth_groups (name) VALUES (?1)", [name])
            .map_err(sql_err)?;
        Ok(Self {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM auth_groups WHERE id = ?1", [id], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    pub fn find_by_name(conn: &Connection, name: &str) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM auth_groups WHERE name = ?1", [name], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    pub fn list(conn: &Connection) -> RimayResult<Vec<Self>> {
        let mut stmt = conn
            .prepare("SELECT * FROM auth_groups ORDER BY id")
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::from_row)
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Groups the user belongs to, lowest id first.
    pub fn for_user(conn: &Connection, user_id: i64) -> RimayResult<Vec<Self>> {
        let mut stmt = conn
            .prepare(
                "SELECT g.* FROM auth_groups g
                 JOIN user_groups ug ON ug.group_id = g.id
                 WHERE ug.user_id = ?1
                 ORDER BY g.id",
            )
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([user_id], Self::from_row)
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }

    pub fn add_user(conn: &Connection, group_id: i64, user_id: i64) -> RimayResult<()> {
        conn.execute(
            "INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?1, ?2)",
            params![user_id, group_id],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    pub fn remove_user(conn: &Connection, group_id: i64, user_id: i64) -> RimayResult<bool> {
        let changed = conn
            .execute(
                "DELETE FROM user_groups WHERE user_id = ?1 AND group_id = ?2",
                params![user_id, group_id],
            )
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Grant a permission by codename.
    pub fn grant(conn: &Connection, group_id: i64, codename: &str) -> RimayResult<()> {
        let perm = Permission::find_by_codename(conn, codename)?
            .ok_or_else(|| RimayError::NotFound(format!("permission {codename}")))?;
        conn.execute(
            "INSERT OR IGNORE INTO group_permissions (group_id, permission_id) VALUES (?1, ?2)",
            params![group_id, perm.id],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    pub fn permissions(conn: &Connection, group_id: i64) -> RimayResult<Vec<Permission>> {
        let mut stmt = conn
            .prepare(
                "SELECT p.* FROM permissions p
                 JOIN group_permissions gp ON gp.permission_id = p.id
                 WHERE gp.group_id = ?1
                 ORDER BY p.codename",
            )
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([group_id], Permission::from_row)
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Whether the group grants at least one of the codenames.
    pub fn has_any_permission(conn: &Connection, group_id: i64, codenames: &[&str]) -> RimayResult<bool> {
        let granted = Self::permissions(conn, group_id)?;
        Ok(granted.iter().any(|p| codenames.contains(&p.codename.as_str())))
    }

    pub fn delete(conn: &Connection, id: i64) -> RimayResult<bool> {
        let changed = conn
            .execute("DELETE FROM auth_groups WHERE id = ?1", [id])
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;
    use crate::{migrations, schema};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        migrations::run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_groups_for_user_ordered() {
        let conn = setup();
        let uid = User::new("u", "1", "u@x.com", "U", "U").save(&conn).unwrap();
        let a = Group::create(&conn, "Vecinos").unwrap();
        let b = Group::create(&conn, "Moderadores").unwrap();
        Group::add_user(&conn, b.id, uid).unwrap();
        Group::add_user(&conn, a.id, uid).unwrap();
        Group::add_user(&conn, a.id, uid).unwrap();

        let groups = Group::for_user(&conn, uid).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id, a.id);
    }

    #[test]
    fn test_grant_and_check() {
        let conn = setup();
        let g = Group::create(&conn, "Moderadores").unwrap();
        assert!(!Group::has_any_permission(&conn, g.id, &["can_manage_community"]).unwrap());
        Group::grant(&conn, g.id, "can_manage_community").unwrap();
        assert!(Group::has_any_permission(&conn, g.id, &["other", "can_manage_community"]).unwrap());
        assert!(Group::grant(&conn, g.id, "missing_perm").is_err());
    }
}
