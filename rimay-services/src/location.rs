//! Nearby-user lookups.
//!
//! Profiles are prefiltered with a bounding box in SQL and then refined
//! with the great-circle distance. Lookups feed best-effort features, so
//! failures are logged and produce an empty result.

use serde::Serialize;
use tracing::error;

use rimay_core::error::RimayResult;
use rimay_models::geo::round2;
use rimay_models::{CommunityMembership, Database, GeoPoint, User, UserProfile};

use crate::service::{Service, ServiceState, StateCell};

/// A user and their distance from the query point.
#[derive(Debug, Clone, Serialize)]
pub struct NearbyUser {
    pub user: User,
    pub distance_km: f64,
}

pub struct LocationService {
    state: StateCell,
    database: Database,
    default_radius_km: f64,
}

impl LocationService {
    pub fn new(database: Database, default_radius_km: f64) -> Self {
        Self {
            state: StateCell::new(),
            database,
            default_radius_km,
        }
    }

    pub fn default_radius_km(&self) -> f64 {
        self.default_radius_km
    }

    fn query(&self, center: &GeoPoint, radius_km: f64) -> RimayResult<Vec<NearbyUser>> {
        let conn = self.database.conn()?;
        let mut found = Vec::new();
        for profile in UserProfile::located_within(&conn, &center.bounding_box(radius_km))? {
            let Some(at) = profile.location() else { continue };
            let distance_km = center.distance_km(&at);
            if distance_km > radius_km {
                continue;
            }
            match User::find_by_id(&conn, profile.user_id)? {
                Some(user) if user.is_active => found.push(NearbyUser { user, distance_km }),
                _ => {}
            }
        }
        found.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        Ok(found)
    }

    /// Active users whose profile location is within `radius_km` (or the
    /// configured default), nearest first.
    pub fn nearby_users(&self, center: &GeoPoint, radius_km: Option<f64>) -> Vec<User> {
        self.nearby_users_with_distance(center, radius_km)
            .into_iter()
            .map(|n| n.user)
            .collect()
    }

    /// Like `nearby_users`, with the distance rounded to two decimals.
    pub fn nearby_users_with_distance(&self, center: &GeoPoint, radius_km: Option<f64>) -> Vec<NearbyUser> {
        let radius = radius_km.unwrap_or(self.default_radius_km);
        match self.query(center, radius) {
            Ok(users) => users
                .into_iter()
                .map(|n| NearbyUser { distance_km: round2(n.distance_km), ..n })
                .collect(),
            Err(e) => {
                error!("nearby user lookup failed: {e}");
                Vec::new()
            }
        }
    }

    /// Nearby users who are verified members of the community.
    pub fn nearby_community_members(&self, community_id: i64, center: &GeoPoint, radius_km: Option<f64>) -> Vec<User> {
        let verified = match self
            .database
            .conn()
            .and_then(|conn| CommunityMembership::verified_user_ids(&conn, community_id))
        {
            Ok(ids) => ids,
            Err(e) => {
                error!("member lookup for community {community_id} failed: {e}");
                return Vec::new();
            }
        };
        self.nearby_users(center, radius_km)
            .into_iter()
            .filter(|u| u.id.is_some_and(|id| verified.contains(&id)))
            .collect()
    }
}

impl Service for LocationService {
    fn name(&self) -> &str { "location" }
    fn state(&self) -> ServiceState { self.state.get() }
    fn init(&self) -> RimayResult<()> {
        self.state.set(ServiceState::Running);
        Ok(())
    }
    fn shutdown(&self) -> RimayResult<()> {
        self.state.set(ServiceState::Stopped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rimay_models::Community;

    fn create_service() -> (LocationService, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::init(&dir.path().join("location.db"), &Default::default()).unwrap();
        (LocationService::new(db, 2.0), dir)
    }

    fn add_user(svc: &LocationService, name: &str, at: Option<GeoPoint>) -> i64 {
        let conn = svc.database.conn().unwrap();
        let uid = User::new(name, name, &format!("{name}@x.com"), name, name).save(&conn).unwrap();
        let mut profile = UserProfile::new(uid);
        profile.set_location(at);
        profile.save(&conn).unwrap();
        uid
    }

    #[test]
    fn test_nearby_sorted_by_distance() {
        let (svc, _dir) = create_service();
        let center = GeoPoint::new(-0.2, -78.5);
        add_user(&svc, "far", Some(GeoPoint::new(-0.21, -78.5)));
        add_user(&svc, "near", Some(GeoPoint::new(-0.201, -78.5)));
        add_user(&svc, "outside", Some(GeoPoint::new(-0.3, -78.5)));
        add_user(&svc, "nowhere", None);

        let users: Vec<String> = svc.nearby_users(&center, None).into_iter().map(|u| u.username).collect();
        assert_eq!(users, vec!["near", "far"]);

        let with = svc.nearby_users_with_distance(&center, None);
        assert_eq!(with[0].distance_km, 0.11);
        assert_eq!(with[1].distance_km, 1.11);

        assert_eq!(svc.nearby_users(&center, Some(20.0)).len(), 3);
    }

    #[test]
    fn test_inactive_users_skipped() {
        let (svc, _dir) = create_service();
        let center = GeoPoint::new(0.0, 0.0);
        let uid = add_user(&svc, "gone", Some(center));
        User::set_active(&svc.database.conn().unwrap(), uid, false).unwrap();
        assert!(svc.nearby_users(&center, None).is_empty());
    }

    #[test]
    fn test_community_members_only_verified() {
        let (svc, _dir) = create_service();
        let center = GeoPoint::new(0.0, 0.0);
        let a = add_user(&svc, "a", Some(center));
        let b = add_user(&svc, "b", Some(center));
        add_user(&svc, "c", Some(center));

        let conn = svc.database.conn().unwrap();
        let cid = Community::new("Centro").save(&conn).unwrap();
        let (ma, _) = CommunityMembership::get_or_create(&conn, a, cid).unwrap();
        CommunityMembership::set_verified(&conn, ma.id.unwrap(), true).unwrap();
        CommunityMembership::get_or_create(&conn, b, cid).unwrap();

        let members: Vec<String> = svc
            .nearby_community_members(cid, &center, None)
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(members, vec!["a"]);
    }
}
