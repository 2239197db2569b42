//! Per-user profile with optional home location.

use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, Row};
use rimay_core::error::{RimayError, RimayResult};
use rimay_core::time::now_rfc3339;

use crate::db::sql_err;
use crate::geo::{BoundingBox, GeoPoint};

/// Profile attached one-to-one to a user.
///
/// A location exists only when both `latitude` and `longitude` are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Option<i64>,
    pub user_id: i64,
    pub bio: Option<String>,
    pub alias_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserProfile {
    pub fn new(user_id: i64) -> Self {
        let now = now_rfc3339();
        Self {
            id: None,
            user_id,
            bio: None,
            alias_name: None,
            latitude: None,
            longitude: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            bio: row.get("bio")?,
            alias_name: row.get("alias_name")?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find_by_user(conn: &Connection, user_id: i64) -> RimayResult<Option<Self>> {
        match conn.query_row(
            "SELECT * FROM user_profiles WHERE user_id = ?1",
            [user_id],
            Self::from_row,
        ) {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(RimayError::Database(e.to_string())),
        }
    }

    /// Profiles whose location falls inside the box. Callers refine by distance.
    pub fn located_within(conn: &Connection, bbox: &BoundingBox) -> RimayResult<Vec<Self>> {
        let mut stmt = conn
            .prepare(
                "SELECT * FROM user_profiles
                 WHERE latitude IS NOT NULL AND longitude IS NOT NULL
                   AND latitude BETWEEN ?1 AND ?2
                   AND (longitude BETWEEN ?3 AND ?4 OR longitude BETWEEN ?5 AND ?6)",
            )
            .map_err(|e| RimayError::Database(e.to_string()))?;
        let [(lng_lo1, lng_hi1), (lng_lo2, lng_hi2)] = bbox.lng_ranges();
        let rows = stmt
            .query_map(
                params![bbox.min_lat, bbox.max_lat, lng_lo1, lng_hi1, lng_lo2, lng_hi2],
                Self::from_row,
            )
            .map_err(|e| RimayError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RimayError::Database(e.to_string()))?;
        Ok(rows)
    }

    pub fn location(&self) -> Option<GeoPoint> {
        GeoPoint::from_parts(self.latitude, self.longitude)
    }

    pub fn set_location(&mut self, point: Option<GeoPoint>) {
        self.latitude = point.map(|p| p.latitude);
        self.longitude = point.map(|p| p.longitude);
    }

    /// Upsert by user. Returns the profile id.
    pub fn save(&mut self, conn: &Connection) -> RimayResult<i64> {
        self.updated_at = now_rfc3339();
        conn.execute(
            "INSERT INTO user_profiles (
                user_id, bio, alias_name, latitude, longitude, created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7)
            ON CONFLICT(user_id) DO UPDATE SET
                bio = excluded.bio,
                alias_name = excluded.alias_name,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                updated_at = excluded.updated_at",
            params![
                self.user_id,
                self.bio,
                self.alias_name,
                self.latitude,
                self.longitude,
                self.created_at,
                self.updated_at,
            ],
        )
        .map_err(sql_err)?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM user_profiles WHERE user_id = ?1",
                [self.user_id],
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
    use crate::models::user::User;
    use crate::schema;

    fn setup() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        let id = User::new("u", "1", "u@x.com", "U", "U").save(&conn).unwrap();
        (conn, id)
    }

    #[test]
    fn test_profile_upsert_keeps_one_row() {
        let (conn, uid) = setup();
        let mut p = UserProfile::new(uid);
        p.alias_name = Some("Vecino".into());
        let first = p.save(&conn).unwrap();

        let mut again = UserProfile::new(uid);
        again.set_location(Some(GeoPoint::new(-0.18, -78.47)));
        let second = again.save(&conn).unwrap();
        assert_eq!(first, second);

        let loaded = UserProfile::find_by_user(&conn, uid).unwrap().unwrap();
        assert_eq!(loaded.location(), Some(GeoPoint::new(-0.18, -78.47)));
        assert_eq!(loaded.alias_name, None);
    }

    #[test]
    fn test_partial_location_is_none() {
        let mut p = UserProfile::new(1);
        p.latitude = Some(1.0);
        assert!(p.location().is_none());
    }

    #[test]
    fn test_located_within() {
        let (conn, uid) = setup();
        let mut p = UserProfile::new(uid);
        p.set_location(Some(GeoPoint::new(0.0, 0.0)));
        p.save(&conn).unwrap();

        let near = GeoPoint::new(0.001, 0.001).bounding_box(1.0);
        assert_eq!(UserProfile::located_within(&conn, &near).unwrap().len(), 1);
        let far = GeoPoint::new(10.0, 10.0).bounding_box(1.0);
        assert!(UserProfile::located_within(&conn, &far).unwrap().is_empty());
    }

    #[test]
    fn test_located_within_across_antimeridian() {
        let (conn, uid) = setup();
        let mut p = UserProfile::new(uid);
        p.set_location(Some(GeoPoint::new(-17.0, 179.999)));
        p.save(&conn).unwrap();

        let other_side = GeoPoint::new(-17.0, -179.999).bounding_box(2.0);
        assert_eq!(UserProfile::located_within(&conn, &other_side).unwrap().len(), 1);
        let too_far = GeoPoint::new(-17.0, -179.0).bounding_box(2.0);
        assert!(UserProfile::located_within(&conn, &too_far).unwrap().is_empty());
    }
}
