//! Group-based access checks for the management pages.
//!
//! A browser session carries one selected group. Pages that require a
//! permission codename are reachable only when that group grants it.

use tracing::{debug, info};

use rimay_core::error::RimayResult;
use rimay_models::{Database, Group, Session};

use crate::service::{Service, ServiceState, StateCell};

/// Service resolving the session's group and its permissions.
pub struct PermissionService {
    state: StateCell,
    database: Database,
}

impl PermissionService {
    /// Create a new PermissionService.
    pub fn new(database: Database) -> Self {
        Self {
            state: StateCell::new(),
            database,
        }
    }

    /// Select the user's lowest-id group when the session has none.
    /// An existing selection is never replaced.
    pub fn set_group_session(&self, session: &mut Session) -> RimayResult<()> {
        if session.group_id.is_some() {
            return Ok(());
        }
        let conn = self.database.conn()?;
        if let Some(first) = Group::for_user(&conn, session.user_id)?.into_iter().next() {
            Session::set_group(&conn, &session.key, Some(first.id))?;
            session.group_id = Some(first.id);
            debug!("session group set to {} for user {}", first.name, session.user_id);
        }
        Ok(())
    }

    /// The group selected for this session.
    pub fn get_group_session(&self, session: &Session) -> RimayResult<Option<Group>> {
        match session.group_id {
            Some(id) => {
                let conn = self.database.conn()?;
                Group::find_by_id(&conn, id)
            }
            None => Ok(None),
        }
    }

    /// Whether the session may open a page requiring any of `required`.
    ///
    /// A selected group is always needed. An empty `required` list only
    /// checks that.
    pub fn check(&self, session: &mut Session, required: &[&str]) -> RimayResult<bool> {
        self.set_group_session(session)?;
        let Some(group) = self.get_group_session(session)? else {
            debug!("user {} has no group; access denied", session.user_id);
            return Ok(false);
        };
        if required.is_empty() {
            return Ok(true);
        }
        let conn = self.database.conn()?;
        let granted = Group::has_any_permission(&conn, group.id, required)?;
        if !granted {
            debug!("group {} lacks {:?}", group.name, required);
        }
        Ok(granted)
    }
}

impl Service for PermissionService {
    fn name(&self) -> &str { "permission" }
    fn state(&self) -> ServiceState { self.state.get() }
    fn init(&self) -> RimayResult<()> {
        self.state.set(ServiceState::Running);
        info!("permission service initialized");
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
    use rimay_core::constants::permissions::CAN_MANAGE_COMMUNITY;
    use rimay_models::User;

    fn setup() -> (PermissionService, Session, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::init(&dir.path().join("perm.db"), &Default::default()).unwrap();
        let conn = db.conn().unwrap();
        let uid = User::new("mod", "1", "m@x.com", "M", "M").save(&conn).unwrap();
        let session = Session::create(&conn, "sess", uid, 1).unwrap();
        drop(conn);
        (PermissionService::new(db), session, dir)
    }

    #[test]
    fn test_no_group_denied() {
        let (svc, mut session, _dir) = setup();
        assert!(!svc.check(&mut session, &[]).unwrap());
    }

    #[test]
    fn test_lowest_group_selected_and_kept() {
        let (svc, mut session, _dir) = setup();
        let conn = svc.database.conn().unwrap();
        let vecinos = Group::create(&conn, "Vecinos").unwrap();
        let gestores = Group::create(&conn, "Gestores").unwrap();
        Group::add_user(&conn, gestores.id, session.user_id).unwrap();
        Group::add_user(&conn, vecinos.id, session.user_id).unwrap();
        Group::grant(&conn, gestores.id, CAN_MANAGE_COMMUNITY).unwrap();

        // Lowest id wins, and it lacks the permission.
        assert!(svc.check(&mut session, &[]).unwrap());
        assert_eq!(session.group_id, Some(vecinos.id));
        assert!(!svc.check(&mut session, &[CAN_MANAGE_COMMUNITY]).unwrap());

        // An explicit selection is not overridden.
        Session::set_group(&conn, &session.key, Some(gestores.id)).unwrap();
        let mut reloaded = Session::find_valid(&conn, &session.key).unwrap().unwrap();
        assert!(svc.check(&mut reloaded, &[CAN_MANAGE_COMMUNITY]).unwrap());
        assert_eq!(svc.get_group_session(&reloaded).unwrap().unwrap().name, "Gestores");
    }
}
