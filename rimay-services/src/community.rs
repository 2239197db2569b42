//! Community service.
//!
//! Assigns users to the community whose boundary contains their location,
//! creates a small community on the spot when none does, and backs the
//! community management pages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use rimay_core::constants::{AUTO_COMMUNITY_HALF_SIDE_DEG, PAGE_SIZE};
use rimay_core::error::{FieldErrors, RimayError, RimayResult};
use rimay_models::queries::{self, CommunityFilter, MemberFilter, MemberRow, Page};
use rimay_models::{Community, CommunityMembership, Database, GeoPoint, Polygon, User};

use crate::event_bus::{AppEvent, EventBus};
use crate::input::{self, Coordinate};
use crate::service::{Service, ServiceState, StateCell};

pub const COORDINATES_REQUIRED: &str = "latitude y longitude son requeridos";
pub const COORDINATES_NOT_NUMERIC: &str = "latitude y longitude deben ser numéricos";
pub const NO_COMMUNITY_FOR_LOCATION: &str = "No se encontró comunidad para la ubicación proporcionada";
pub const BOUNDARY_REQUIRED: &str = "Debes dibujar el área límite de la comunidad en el mapa.";

/// Short community reference returned to the mobile app.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunitySummary {
    pub id: i64,
    pub name: String,
    pub is_verified: bool,
}

/// Answer to "does this user belong to a community".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityStatus {
    pub has_community: bool,
    pub community: Option<CommunitySummary>,
}

/// Result of assigning a user by location.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub community_id: i64,
    pub community_name: String,
    pub is_verified: bool,
    pub created: bool,
}

/// How `validate_or_create` placed the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementKind {
    /// The user already had a membership.
    AlreadyMember,
    /// A new community was created around the user's location.
    NewCommunity,
    /// The user joined an existing community.
    Joined,
}

impl PlacementKind {
    pub fn message(&self) -> &'static str {
        match self {
            PlacementKind::AlreadyMember => "El usuario ya pertenece a una comunidad",
            PlacementKind::NewCommunity => "Usuario asignado a una nueva comunidad",
            PlacementKind::Joined => "Usuario asignado a la comunidad",
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, PlacementKind::NewCommunity)
    }
}

#[derive(Debug, Clone)]
pub struct Placement {
    pub kind: PlacementKind,
    pub community: CommunitySummary,
}

/// Outcome of a moderator's verify toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The actor is not a member of the target's community.
    NoAccess,
    /// The actor is a plain member.
    NotAllowed,
    Verified { username: String },
    Unverified { username: String },
}

/// Community create form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommunityForm {
    pub name: Option<String>,
    pub description: Option<String>,
    pub postal_code: Option<String>,
    #[serde(rename = "boundary_area_json")]
    pub boundary_area: Option<String>,
}

/// Query-string filters of the member list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberSearch {
    pub role: Option<String>,
    /// `"true"`, `"false"`, or blank for any.
    pub is_verified: Option<String>,
    pub page: Option<u32>,
}

impl MemberSearch {
    pub fn filter(&self) -> MemberFilter {
        MemberFilter {
            role: input::non_blank(&self.role)
                .filter(|r| rimay_core::constants::roles::ALL.contains(r))
                .map(str::to_string),
            is_verified: parse_tristate(self.is_verified.as_deref()),
        }
    }
}

/// Query-string filters of the community list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommunitySearch {
    pub is_active: Option<String>,
    pub postal_code: Option<String>,
    pub page: Option<u32>,
}

impl CommunitySearch {
    pub fn filter(&self) -> CommunityFilter {
        CommunityFilter {
            is_active: parse_tristate(self.is_active.as_deref()),
            postal_code: input::non_blank(&self.postal_code).map(str::to_string),
        }
    }
}

/// `true`/`false` select values; anything else means "no filter".
pub fn parse_tristate(value: Option<&str>) -> Option<bool> {
    match value.map(str::trim) {
        Some("true") | Some("True") | Some("1") => Some(true),
        Some("false") | Some("False") | Some("0") => Some(false),
        _ => None,
    }
}

/// Parse a coordinate pair the way the mobile endpoints require it.
pub fn require_point(latitude: Option<&Value>, longitude: Option<&Value>) -> RimayResult<GeoPoint> {
    let lat = Coordinate::parse(latitude);
    let lng = Coordinate::parse(longitude);
    if lat == Coordinate::Missing || lng == Coordinate::Missing {
        return Err(RimayError::field("coordinates", COORDINATES_REQUIRED));
    }
    GeoPoint::from_parts(lat.value(), lng.value())
        .ok_or_else(|| RimayError::field("coordinates", COORDINATES_NOT_NUMERIC))
}

/// Service for memberships and communities.
pub struct CommunityService {
    state: StateCell,
    database: Database,
    event_bus: EventBus,
}

impl CommunityService {
    /// Create a new CommunityService.
    pub fn new(database: Database, event_bus: EventBus) -> Self {
        Self {
            state: StateCell::new(),
            database,
            event_bus,
        }
    }

    fn summary(conn: &rusqlite::Connection, membership: &CommunityMembership) -> RimayResult<CommunitySummary> {
        let community = Community::find_by_id(conn, membership.community_id)?
            .ok_or_else(|| RimayError::NotFound(format!("community {}", membership.community_id)))?;
        Ok(CommunitySummary {
            id: membership.community_id,
            name: community.name,
            is_verified: membership.is_verified,
        })
    }

    // ─── Mobile API ──────────────────────────────────────────────────────

    /// The user's first membership, if any.
    pub fn check_user_community(&self, user_id: i64) -> RimayResult<CommunityStatus> {
        let conn = self.database.conn()?;
        let community = match CommunityMembership::first_for_user(&conn, user_id)? {
            Some(m) => Some(Self::summary(&conn, &m)?),
            None => None,
        };
        Ok(CommunityStatus {
            has_community: community.is_some(),
            community,
        })
    }

    /// Join the first active community containing the point.
    pub fn assign_user(&self, user_id: i64, latitude: Option<&Value>, longitude: Option<&Value>) -> RimayResult<Assignment> {
        let point = require_point(latitude, longitude)?;
        let conn = self.database.conn()?;
        let community = Community::find_containing(&conn, &point)?
            .ok_or_else(|| RimayError::NotFound(NO_COMMUNITY_FOR_LOCATION.into()))?;
        let community_id = community.id.ok_or_else(|| RimayError::Internal("community without id".into()))?;

        let (membership, created) = CommunityMembership::get_or_create(&conn, user_id, community_id)?;
        if created {
            info!("user {user_id} joined community {}", community.name);
            self.event_bus.emit(AppEvent::MembershipCreated { user_id, community_id });
        }
        Ok(Assignment {
            community_id,
            community_name: community.name,
            is_verified: membership.is_verified,
            created,
        })
    }

    /// Keep an existing membership, else join or create a community at the point.
    pub fn validate_or_create(&self, user_id: i64, latitude: Option<&Value>, longitude: Option<&Value>) -> RimayResult<Placement> {
        let point = require_point(latitude, longitude)?;

        let (placement, new_community, joined) = self.database.transaction(|conn| {
            if let Some(existing) = CommunityMembership::first_for_user(conn, user_id)? {
                let summary = Self::summary(conn, &existing)?;
                return Ok((
                    Placement { kind: PlacementKind::AlreadyMember, community: summary },
                    None,
                    None,
                ));
            }

            let (community, kind) = match Community::find_containing(conn, &point)? {
                Some(c) => (c, PlacementKind::Joined),
                None => {
                    let mut c = Community::new(&format!(
                        "Comunidad {:.4},{:.4}",
                        point.latitude, point.longitude
                    ));
                    c.set_boundary(Some(&Polygon::square_around(&point, AUTO_COMMUNITY_HALF_SIDE_DEG)));
                    c.save(conn)?;
                    (c, PlacementKind::NewCommunity)
                }
            };
            let community_id = community.id.ok_or_else(|| RimayError::Internal("community without id".into()))?;
            let (membership, _) = CommunityMembership::get_or_create(conn, user_id, community_id)?;

            Ok((
                Placement {
                    kind,
                    community: CommunitySummary {
                        id: community_id,
                        name: community.name,
                        is_verified: membership.is_verified,
                    },
                },
                kind.is_created().then_some(community_id),
                Some(community_id),
            ))
        })?;

        if let Some(community_id) = new_community {
            info!("created community {community_id} around ({}, {})", point.latitude, point.longitude);
            self.event_bus.emit(AppEvent::CommunityCreated { community_id, automatic: true });
        }
        if let Some(community_id) = joined {
            self.event_bus.emit(AppEvent::MembershipCreated { user_id, community_id });
        }
        Ok(placement)
    }

    // ─── Pages ───────────────────────────────────────────────────────────

    /// The community of the user's first membership.
    pub fn my_community(&self, user_id: i64) -> RimayResult<Option<Community>> {
        let conn = self.database.conn()?;
        match CommunityMembership::first_for_user(&conn, user_id)? {
            Some(m) => Community::find_by_id(&conn, m.community_id),
            None => Ok(None),
        }
    }

    /// Members of the user's community, newest joined first. `None` when the
    /// user has no community.
    pub fn members(&self, user_id: i64, search: &MemberSearch) -> RimayResult<Option<(Community, Page<MemberRow>)>> {
        let Some(community) = self.my_community(user_id)? else {
            return Ok(None);
        };
        let community_id = community.id.ok_or_else(|| RimayError::Internal("community without id".into()))?;
        let conn = self.database.conn()?;
        let page = queries::list_members(
            &conn,
            community_id,
            &search.filter(),
            search.page.unwrap_or(1),
            PAGE_SIZE,
        )?;
        Ok(Some((community, page)))
    }

    /// Flip a member's verification on behalf of a moderator or admin of
    /// the same community.
    pub fn toggle_verification(&self, actor_id: i64, membership_id: i64) -> RimayResult<VerifyOutcome> {
        let conn = self.database.conn()?;
        let target = CommunityMembership::find_by_id(&conn, membership_id)?
            .ok_or_else(|| RimayError::NotFound(format!("membership {membership_id}")))?;

        let Some(actor) = CommunityMembership::find(&conn, actor_id, target.community_id)? else {
            warn!("user {actor_id} tried to verify outside their community");
            return Ok(VerifyOutcome::NoAccess);
        };
        if !actor.can_verify_members() {
            return Ok(VerifyOutcome::NotAllowed);
        }

        let verified = !target.is_verified;
        CommunityMembership::set_verified(&conn, membership_id, verified)?;
        let username = User::find_by_id(&conn, target.user_id)?
            .map(|u| u.username)
            .unwrap_or_default();

        info!("membership {membership_id} verified={verified} by user {actor_id}");
        self.event_bus.emit(AppEvent::MemberVerificationChanged { membership_id, is_verified: verified });
        Ok(if verified {
            VerifyOutcome::Verified { username }
        } else {
            VerifyOutcome::Unverified { username }
        })
    }

    pub fn list(&self, search: &CommunitySearch) -> RimayResult<Page<Community>> {
        let conn = self.database.conn()?;
        queries::list_communities(&conn, &search.filter(), search.page.unwrap_or(1), PAGE_SIZE)
    }

    /// A community and its member count.
    pub fn detail(&self, id: i64) -> RimayResult<Option<(Community, i64)>> {
        let conn = self.database.conn()?;
        match Community::find_by_id(&conn, id)? {
            Some(c) => {
                let members = Community::member_count(&conn, id)?;
                Ok(Some((c, members)))
            }
            None => Ok(None),
        }
    }

    /// Validate the create form and save the community.
    pub fn create(&self, form: &CommunityForm) -> RimayResult<Community> {
        let mut errors = FieldErrors::new();
        let name = input::required(&mut errors, "name", &form.name);
        input::max_len(&mut errors, "name", name, 200);
        let postal_code = input::required(&mut errors, "postal_code", &form.postal_code);
        input::max_len(&mut errors, "postal_code", postal_code, 10);

        let boundary = match input::non_blank(&form.boundary_area) {
            None => {
                errors.add("boundary_area", BOUNDARY_REQUIRED);
                None
            }
            Some(text) => match Polygon::from_geojson_str(text) {
                Ok(p) => Some(p),
                Err(RimayError::Validation(e)) => {
                    for (_, msgs) in e.iter() {
                        for m in msgs {
                            errors.add("boundary_area", m.clone());
                        }
                    }
                    None
                }
                Err(other) => return Err(other),
            },
        };
        errors.into_result()?;

        let mut community = Community::new(name);
        community.description = input::non_blank(&form.description).unwrap_or_default().to_string();
        community.postal_code = postal_code.to_string();
        community.set_boundary(boundary.as_ref());

        let conn = self.database.conn()?;
        let id = community.save(&conn)?;
        info!("created community {} ({id})", community.name);
        self.event_bus.emit(AppEvent::CommunityCreated { community_id: id, automatic: false });
        Ok(community)
    }
}

impl Service for CommunityService {
    fn name(&self) -> &str { "community" }
    fn state(&self) -> ServiceState { self.state.get() }
    fn init(&self) -> RimayResult<()> {
        self.state.set(ServiceState::Running);
        info!("community service initialized");
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
    use rimay_core::constants::roles;
    use serde_json::json;

    fn create_service() -> (CommunityService, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::init(&dir.path().join("community.db"), &Default::default()).unwrap();
        (CommunityService::new(db, EventBus::new(16)), dir)
    }

    fn add_user(svc: &CommunityService, name: &str) -> i64 {
        let conn = svc.database.conn().unwrap();
        User::new(name, name, &format!("{name}@x.com"), name, name).save(&conn).unwrap()
    }

    fn square_community(svc: &CommunityService, name: &str, lat: f64, lng: f64) -> i64 {
        let conn = svc.database.conn().unwrap();
        let mut c = Community::new(name);
        c.set_boundary(Some(&Polygon::square_around(&GeoPoint::new(lat, lng), 0.01)));
        c.save(&conn).unwrap()
    }

    #[test]
    fn test_require_point_messages() {
        let err = require_point(None, Some(&json!(1.0))).unwrap_err();
        match err {
            RimayError::Validation(e) => assert_eq!(e.first_message(), Some(COORDINATES_REQUIRED)),
            other => panic!("unexpected {other:?}"),
        }
        let err = require_point(Some(&json!("x")), Some(&json!(1.0))).unwrap_err();
        match err {
            RimayError::Validation(e) => assert_eq!(e.first_message(), Some(COORDINATES_NOT_NUMERIC)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(require_point(Some(&json!(0.0)), Some(&json!(0.0))).unwrap(), GeoPoint::new(0.0, 0.0));
    }

    #[test]
    fn test_assign_user_created_then_existing() {
        let (svc, _dir) = create_service();
        let uid = add_user(&svc, "ana");
        let cid = square_community(&svc, "La Floresta", -0.2, -78.5);

        let first = svc.assign_user(uid, Some(&json!(-0.2)), Some(&json!(-78.5))).unwrap();
        assert!(first.created);
        assert_eq!(first.community_id, cid);
        assert!(!first.is_verified);

        let again = svc.assign_user(uid, Some(&json!("-0.2")), Some(&json!("-78.5"))).unwrap();
        assert!(!again.created);

        let status = svc.check_user_community(uid).unwrap();
        assert!(status.has_community);
        assert_eq!(status.community.unwrap().name, "La Floresta");
    }

    #[test]
    fn test_assign_user_outside_any_community() {
        let (svc, _dir) = create_service();
        let uid = add_user(&svc, "ana");
        square_community(&svc, "Norte", 10.0, 10.0);
        let err = svc.assign_user(uid, Some(&json!(0.0)), Some(&json!(0.0))).unwrap_err();
        assert!(matches!(err, RimayError::NotFound(_)));
        assert!(!svc.check_user_community(uid).unwrap().has_community);
    }

    #[test]
    fn test_validate_or_create_paths() {
        let (svc, _dir) = create_service();
        let a = add_user(&svc, "a");
        let b = add_user(&svc, "b");
        let c = add_user(&svc, "c");

        // Nothing around: a tiny community is created.
        let p = svc.validate_or_create(a, Some(&json!(1.0)), Some(&json!(2.0))).unwrap();
        assert_eq!(p.kind, PlacementKind::NewCommunity);
        assert_eq!(p.kind.message(), "Usuario asignado a una nueva comunidad");

        // Same spot: joins the community just created.
        let q = svc.validate_or_create(b, Some(&json!(1.0)), Some(&json!(2.0))).unwrap();
        assert_eq!(q.kind, PlacementKind::Joined);
        assert_eq!(q.community.id, p.community.id);

        // Already a member: nothing changes even at another location.
        let r = svc.validate_or_create(a, Some(&json!(50.0)), Some(&json!(50.0))).unwrap();
        assert_eq!(r.kind, PlacementKind::AlreadyMember);
        assert_eq!(r.community.id, p.community.id);

        // 0.0001 degrees is roughly 11 m; 50 m away is outside.
        let s = svc.validate_or_create(c, Some(&json!(1.0005)), Some(&json!(2.0))).unwrap();
        assert_eq!(s.kind, PlacementKind::NewCommunity);
        assert_ne!(s.community.id, p.community.id);
    }

    #[test]
    fn test_toggle_verification_rules() {
        let (svc, _dir) = create_service();
        let admin = add_user(&svc, "admin");
        let member = add_user(&svc, "member");
        let outsider = add_user(&svc, "outsider");
        let cid = square_community(&svc, "Centro", 0.0, 0.0);
        let other = square_community(&svc, "Otro", 5.0, 5.0);

        let conn = svc.database.conn().unwrap();
        let (admin_m, _) = CommunityMembership::get_or_create(&conn, admin, cid).unwrap();
        CommunityMembership::set_role(&conn, admin_m.id.unwrap(), roles::ADMIN).unwrap();
        let (target, _) = CommunityMembership::get_or_create(&conn, member, cid).unwrap();
        CommunityMembership::get_or_create(&conn, outsider, other).unwrap();
        let target_id = target.id.unwrap();

        assert_eq!(svc.toggle_verification(outsider, target_id).unwrap(), VerifyOutcome::NoAccess);
        assert_eq!(svc.toggle_verification(member, target_id).unwrap(), VerifyOutcome::NotAllowed);
        assert_eq!(
            svc.toggle_verification(admin, target_id).unwrap(),
            VerifyOutcome::Verified { username: "member".into() }
        );
        assert_eq!(
            svc.toggle_verification(admin, target_id).unwrap(),
            VerifyOutcome::Unverified { username: "member".into() }
        );
        assert!(matches!(svc.toggle_verification(admin, 9999), Err(RimayError::NotFound(_))));
    }

    #[test]
    fn test_members_filtered() {
        let (svc, _dir) = create_service();
        let a = add_user(&svc, "a");
        let b = add_user(&svc, "b");
        let cid = square_community(&svc, "Centro", 0.0, 0.0);
        {
            let conn = svc.database.conn().unwrap();
            CommunityMembership::get_or_create(&conn, a, cid).unwrap();
            let (m, _) = CommunityMembership::get_or_create(&conn, b, cid).unwrap();
            CommunityMembership::set_verified(&conn, m.id.unwrap(), true).unwrap();
        }

        let search = MemberSearch { is_verified: Some("true".into()), ..Default::default() };
        let (community, page) = svc.members(a, &search).unwrap().unwrap();
        assert_eq!(community.name, "Centro");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].username, "b");

        let nobody = add_user(&svc, "nobody");
        assert!(svc.members(nobody, &MemberSearch::default()).unwrap().is_none());
    }

    #[test]
    fn test_create_form_validation() {
        let (svc, _dir) = create_service();
        let form = CommunityForm {
            name: Some("Centro".into()),
            postal_code: None,
            description: None,
            boundary_area: Some(r#"{"type":"Point","coordinates":[0,0]}"#.into()),
        };
        match svc.create(&form).unwrap_err() {
            RimayError::Validation(e) => {
                assert!(e.contains("postal_code"));
                assert!(e.contains("boundary_area"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let poly = Polygon::square_around(&GeoPoint::new(0.0, 0.0), 0.01);
        let ok = CommunityForm {
            name: Some("Centro".into()),
            postal_code: Some("170150".into()),
            description: None,
            boundary_area: Some(poly.to_geojson_string()),
        };
        let created = svc.create(&ok).unwrap();
        let (found, members) = svc.detail(created.id.unwrap()).unwrap().unwrap();
        assert_eq!(found.postal_code, "170150");
        assert_eq!(members, 0);

        let page = svc.list(&CommunitySearch { postal_code: Some("170150".into()), ..Default::default() }).unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn test_parse_tristate() {
        assert_eq!(parse_tristate(Some("true")), Some(true));
        assert_eq!(parse_tristate(Some("false")), Some(false));
        assert_eq!(parse_tristate(Some("")), None);
        assert_eq!(parse_tristate(None), None);
    }
}
