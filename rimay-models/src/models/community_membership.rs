//! User membership in a community.

use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rimay_core::constants::roles;
use rimay_core::error::{RimayError, RimayResult};
use rimay_core::time::now_rfc3339;

use crate::db::sql_err;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityMembership {
    pub id: Option<i64>,
    pub user_id: i64,
    pub community_id: i64,
    /// One of `member`, `moderator`, `admin`.
    pub role: String,
    pub is_verified: bool,
    pub joined_at: String,
}

impl CommunityMembership {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            community_id: row.get("community_id")?,
            role: row.get("role")?,
            is_verified: row.get("is_verified")?,
            joined_at: row.get("joined_at")?,
        })
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> RimayResult<Option<Self>> {
        conn.query_row("SELECT * FROM community_memberships WHERE id = ?1", [id], Self::from_row)
            .optional()
            .map_err(|e| RimayError::Database(e.to_string()))
    }

    pub fn find(conn: &Connection, user_id: i64, community_id: i64) -> RimayResult<Option<Self>> {
        conn.query_row(
            "SELECT * FROM community_memberships WHERE user_id = ?1 AND community_id = ?2",
            params![user_id, community_id],
            Self::from_row,
        )
        .optional()
        .map_err(|e| RimayError::Database(e.to_string()))
    }

    /// The user's earliest membership.
    pub fn first_for_user(conn: &Connection, user_id: i64) -> RimayResult<Option<Self>> {
        conn.query_row(
            "SELECT * FROM community_memberships WHERE user_id = ?1 ORDER BY id LIMIT 1",
            [user_id],
            Self::from_row,
        )
        .optional()
        .map_err(|e| RimayError::Database(e.to_string()))
    }

    /// Return the existing membership or create an unverified `member` one.
    /// The flag is true when a row was created.
    pub fn get_or_create(conn: &Connection, user_id: i64, community_id: i64) -> RimayResult<(Self, bool)> {
        if let Some(existing) = Self::find(conn, user_id, community_id)? {
            return Ok((existing, false));
        }
        let mut m = Self {
            id: None,
            user_id,
            community_id,
            role: roles::MEMBER.to_string(),
            is_verified: false,
            joined_at: now_rfc3339(),
        };
        m.save(conn)?;
        Ok((m, true))
    }

    /// Verified memberships' user ids for a community.
    pub fn verified_user_ids(conn: &Connection, community_id: i64) -> RimayResult<Vec<i64>> {
        let mut stmt = conn
            .prepare("SELECT user_id FROM community_memberships WHERE community_id = ?1 AND is_verified = 1")
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let ids = stmt
            .query_map([community_id], |r| r.get(0))
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<i64>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(ids)
    }

    pub fn set_verified(conn: &Connection, id: i64, verified: bool) -> RimayResult<bool> {
        let changed = conn
            .execute(
                "UPDATE community_memberships SET is_verified = ?1 WHERE id = ?2",
                params![verified, id],
            )
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    pub fn set_role(conn: &Connection, id: i64, role: &str) -> RimayResult<bool> {
        if !roles::ALL.contains(&role) {
            return Err(RimayError::field("role", format!("Rol inválido: {role}")));
        }
        let changed = conn
            .execute(
                "UPDATE community_memberships SET role = ?1 WHERE id = ?2",
                params![role, id],
            )
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    pub fn can_verify_members(&self) -> bool {
        roles::can_verify(&self.role)
    }

    pub fn save(&mut self, conn: &Connection) -> RimayResult<i64> {
        conn.execute(
            "INSERT INTO community_memberships (user_id, community_id, role, is_verified, joined_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, community_id) DO UPDATE SET
                role = excluded.role,
                is_verified = excluded.is_verified",
            params![self.user_id, self.community_id, self.role, self.is_verified, self.joined_at],
        )
        .map_err(sql_err)?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM community_memberships WHERE user_id = ?1 AND community_id = ?2",
                params![self.user_id, self.community_id],
                |row| row.get(0),
            )
            .map_err(|e| RimayError::Database(e.to_string()))?;
        self.id = Some(real_id);
        Ok(real_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::community::Community;
    use crate::models::user::User;
    use crate::schema;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        let uid = User::new("u", "1", "u@x.com", "U", "U").save(&conn).unwrap();
        let cid = Community::new("Barrio").save(&conn).unwrap();

        let (m, created) = CommunityMembership::get_or_create(&conn, uid, cid).unwrap();
        assert!(created);
        assert_eq!(m.role, "member");
        assert!(!m.is_verified);

        let (again, created) = CommunityMembership::get_or_create(&conn, uid, cid).unwrap();
        assert!(!created);
        assert_eq!(again.id, m.id);

        let mid = m.id.unwrap();
        CommunityMembership::set_verified(&conn, mid, true).unwrap();
        assert_eq!(CommunityMembership::verified_user_ids(&conn, cid).unwrap(), vec![uid]);
        assert!(CommunityMembership::set_role(&conn, mid, "owner").is_err());
        CommunityMembership::set_role(&conn, mid, "moderator").unwrap();
        let reloaded = CommunityMembership::first_for_user(&conn, uid).unwrap().unwrap();
        assert!(reloaded.can_verify_members());
    }
}
