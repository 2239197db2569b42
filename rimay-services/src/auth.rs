//! Authentication service.
//!
//! Covers API registration and token login, the signup page, browser
//! sessions, device token registration, and profile updates.

use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use rimay_core::constants::MIN_PASSWORD_LEN;
use rimay_core::error::{FieldErrors, RimayError, RimayResult};
use rimay_models::models::session::{FlashLevel, FlashMessage};
use rimay_models::{
    AuthToken, Database, FcmToken, GeoPoint, Session, User, UserProfile, UserStats,
};

use crate::event_bus::{AppEvent, EventBus};
use crate::input::{self, Coordinate};
use crate::password;
use crate::service::{Service, ServiceState, StateCell};

pub const INVALID_CREDENTIALS: &str = "Credenciales inválidas";
pub const INVALID_TOKEN: &str = "Token inválido.";
pub const INACTIVE_USER: &str = "Usuario inactivo o eliminado.";

/// Mobile registration payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub dni: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub latitude: Option<Value>,
    pub longitude: Option<Value>,
    pub fcm_token: Option<String>,
    pub device_id: Option<String>,
}

/// Signup page form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupForm {
    pub username: Option<String>,
    pub dni: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password1: Option<String>,
    pub password2: Option<String>,
}

/// Device token update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FcmTokenRequest {
    pub fcm_token: Option<String>,
    pub device_id: Option<String>,
}

/// Identity data for the get-or-create-by-dni login.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DniLoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub dni: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// Profile page form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileForm {
    pub bio: Option<String>,
    pub alias_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Validated account fields shared by every creation path.
struct NewAccount<'a> {
    username: &'a str,
    dni: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
}

fn validate_account<'a>(
    errors: &mut FieldErrors,
    username: &'a Option<String>,
    dni: &'a Option<String>,
    first_name: &'a Option<String>,
    last_name: &'a Option<String>,
    email: &'a Option<String>,
) -> NewAccount<'a> {
    let account = NewAccount {
        username: input::required(errors, "username", username),
        dni: input::required(errors, "dni", dni),
        first_name: input::required(errors, "first_name", first_name),
        last_name: input::required(errors, "last_name", last_name),
        email: input::required(errors, "email", email),
    };
    input::max_len(errors, "username", account.username, 150);
    if !account.email.is_empty() && !password::is_valid_email(account.email) {
        errors.add("email", "Introduzca una dirección de correo electrónico válida.");
    }
    account
}

fn validate_password(errors: &mut FieldErrors, field: &str, raw: &str) {
    if !raw.is_empty() && raw.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            field,
            format!("La contraseña debe contener al menos {MIN_PASSWORD_LEN} caracteres."),
        );
    }
}

/// Service for accounts, credentials and sessions.
pub struct AuthService {
    state: StateCell,
    database: Database,
    event_bus: EventBus,
    password_iterations: u32,
    session_ttl_hours: i64,
}

impl AuthService {
    /// Create a new AuthService.
    pub fn new(
        database: Database,
        event_bus: EventBus,
        password_iterations: u32,
        session_ttl_hours: i64,
    ) -> Self {
        Self {
            state: StateCell::new(),
            database,
            event_bus,
            password_iterations,
            session_ttl_hours,
        }
    }

    pub fn hash_password(&self, raw: &str) -> String {
        password::hash_password(raw, self.password_iterations)
    }

    fn insert_account(&self, conn: &Connection, account: &NewAccount<'_>, raw_password: Option<&str>) -> RimayResult<User> {
        let mut user = User::new(
            account.username,
            account.dni,
            account.email,
            account.first_name,
            account.last_name,
        );
        if let Some(raw) = raw_password {
            user.password = self.hash_password(raw);
        }
        user.save(conn)?;
        Ok(user)
    }

    // ─── API registration and login ──────────────────────────────────────

    /// Create an account with profile, empty stats and an optional device token.
    ///
    /// Runs in one transaction. A taken username, dni or email is a `Conflict`.
    pub fn register(&self, req: &RegisterRequest) -> RimayResult<User> {
        let mut errors = FieldErrors::new();
        let account = validate_account(
            &mut errors,
            &req.username,
            &req.dni,
            &req.first_name,
            &req.last_name,
            &req.email,
        );
        let raw_password = input::required(&mut errors, "password", &req.password);
        validate_password(&mut errors, "password", raw_password);
        errors.into_result()?;

        let location = GeoPoint::from_parts(
            Coordinate::parse(req.latitude.as_ref()).value(),
            Coordinate::parse(req.longitude.as_ref()).value(),
        );
        let fcm_token = input::non_blank(&req.fcm_token);
        let device_id = input::non_blank(&req.device_id);

        let user = self.database.transaction(|conn| {
            let user = self.insert_account(conn, &account, Some(raw_password))?;
            let user_id = user.require_id()?;

            let mut profile = UserProfile::new(user_id);
            profile.alias_name = input::non_blank(&req.display_name).map(str::to_string);
            profile.set_location(location);
            profile.save(conn)?;

            UserStats::ensure(conn, user_id)?;

            if let Some(token) = fcm_token {
                FcmToken::upsert(conn, user_id, token, device_id)?;
            }
            Ok(user)
        })?;

        info!("registered user {} (id {:?})", user.username, user.id);
        if let Some(id) = user.id {
            self.event_bus.emit(AppEvent::UserRegistered { user_id: id });
        }
        Ok(user)
    }

    /// Check a username and password pair. Inactive users never authenticate.
    pub fn authenticate(&self, username: &str, raw_password: &str) -> RimayResult<User> {
        let conn = self.database.conn()?;
        let user = User::find_by_username(&conn, username.trim())?
            .filter(|u| u.is_active && u.has_usable_password())
            .filter(|u| password::verify_password(raw_password, &u.password));
        match user {
            Some(user) => {
                User::touch_last_login(&conn, user.require_id()?)?;
                Ok(user)
            }
            None => {
                debug!("failed login for {username}");
                Err(RimayError::AuthFailed(INVALID_CREDENTIALS.into()))
            }
        }
    }

    /// Exchange credentials for the user's API token.
    pub fn login(&self, username: Option<&str>, raw_password: Option<&str>) -> RimayResult<(User, AuthToken)> {
        let mut errors = FieldErrors::new();
        if username.map_or(true, |u| u.trim().is_empty()) {
            errors.add("username", input::REQUIRED);
        }
        if raw_password.map_or(true, str::is_empty) {
            errors.add("password", input::REQUIRED);
        }
        errors.into_result()?;

        let user = self.authenticate(username.unwrap_or_default(), raw_password.unwrap_or_default())?;
        let conn = self.database.conn()?;
        let token = Self::token_for(&conn, user.require_id()?)?;
        Ok((user, token))
    }

    /// Existing token for the user, or a freshly generated one.
    fn token_for(conn: &Connection, user_id: i64) -> RimayResult<AuthToken> {
        match AuthToken::find_by_user(conn, user_id)? {
            Some(token) => Ok(token),
            None => AuthToken::create(conn, user_id, &password::generate_token_key()),
        }
    }

    /// Resolve the active user owning an API token.
    pub fn authenticate_token(&self, key: &str) -> RimayResult<User> {
        let conn = self.database.conn()?;
        let token = AuthToken::find_by_key(&conn, key)?
            .ok_or_else(|| RimayError::AuthFailed(INVALID_TOKEN.into()))?;
        match User::find_by_id(&conn, token.user_id)? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(RimayError::AuthFailed(INACTIVE_USER.into())),
        }
    }

    /// Return the user with this dni, creating the account when absent, plus
    /// their API token.
    pub fn get_or_create_user_by_dni(&self, req: &DniLoginRequest) -> RimayResult<(User, AuthToken)> {
        let mut errors = FieldErrors::new();
        let account = validate_account(
            &mut errors,
            &req.username,
            &req.dni,
            &req.first_name,
            &req.last_name,
            &req.email,
        );
        errors.into_result()?;
        let raw_password = input::non_blank(&req.password);

        self.database.transaction(|conn| {
            let mut user = match User::find_by_dni(conn, account.dni)? {
                Some(user) => user,
                None => {
                    let user = self.insert_account(conn, &account, None)?;
                    let user_id = user.require_id()?;
                    UserProfile::new(user_id).save(conn)?;
                    UserStats::ensure(conn, user_id)?;
                    info!("created user {} from dni login", user.username);
                    user
                }
            };
            if !user.has_usable_password() {
                if let Some(raw) = raw_password {
                    user.password = self.hash_password(raw);
                    user.save(conn)?;
                }
            }
            let token = Self::token_for(conn, user.require_id()?)?;
            Ok((user, token))
        })
    }

    // ─── Signup page ─────────────────────────────────────────────────────

    /// Create an account from the signup page. Taken fields are reported as
    /// field errors rather than a conflict.
    pub fn signup(&self, form: &SignupForm) -> RimayResult<User> {
        let mut errors = FieldErrors::new();
        let account = validate_account(
            &mut errors,
            &form.username,
            &form.dni,
            &form.first_name,
            &form.last_name,
            &form.email,
        );
        let password1 = input::required(&mut errors, "password1", &form.password1);
        let password2 = input::required(&mut errors, "password2", &form.password2);
        validate_password(&mut errors, "password2", password2);
        if !password1.is_empty() && !password2.is_empty() && password1 != password2 {
            errors.add("password2", "Los dos campos de contraseña no coinciden.");
        }

        {
            let conn = self.database.conn()?;
            for field in User::taken_fields(&conn, account.username, account.dni, account.email)? {
                if !errors.contains(field) {
                    errors.add(field, format!("Ya existe un usuario con este {field}."));
                }
            }
        }
        errors.into_result()?;

        let user = self.database.transaction(|conn| {
            let user = self.insert_account(conn, &account, Some(password1))?;
            let user_id = user.require_id()?;
            UserProfile::new(user_id).save(conn)?;
            UserStats::ensure(conn, user_id)?;
            Ok(user)
        })?;

        info!("signup created user {}", user.username);
        if let Some(id) = user.id {
            self.event_bus.emit(AppEvent::UserRegistered { user_id: id });
        }
        Ok(user)
    }

    // ─── Sessions ────────────────────────────────────────────────────────

    /// Start a browser session for an authenticated user.
    pub fn login_session(&self, user: &User) -> RimayResult<Session> {
        let conn = self.database.conn()?;
        let session = Session::create(
            &conn,
            &password::generate_session_key(),
            user.require_id()?,
            self.session_ttl_hours,
        )?;
        debug!("session started for {}", user.username);
        Ok(session)
    }

    /// Resolve a session cookie to its session and active user.
    pub fn session_user(&self, key: &str) -> RimayResult<Option<(Session, User)>> {
        let conn = self.database.conn()?;
        let Some(session) = Session::find_valid(&conn, key)? else {
            return Ok(None);
        };
        match User::find_by_id(&conn, session.user_id)? {
            Some(user) if user.is_active => Ok(Some((session, user))),
            _ => {
                Session::delete(&conn, key)?;
                Ok(None)
            }
        }
    }

    pub fn logout(&self, key: &str) -> RimayResult<()> {
        let conn = self.database.conn()?;
        Session::delete(&conn, key)?;
        Ok(())
    }

    /// Queue a one-shot message for the session's next page.
    pub fn flash(&self, key: &str, level: FlashLevel, message: &str) -> RimayResult<()> {
        let conn = self.database.conn()?;
        Session::push_flash(&conn, key, level, message)
    }

    /// Drain the session's pending messages.
    pub fn take_flash(&self, key: &str) -> RimayResult<Vec<FlashMessage>> {
        let conn = self.database.conn()?;
        Session::take_flash(&conn, key)
    }

    // ─── Device tokens ───────────────────────────────────────────────────

    /// Register or reassign a device token to the user and mark it active.
    pub fn update_fcm_token(&self, user_id: i64, req: &FcmTokenRequest) -> RimayResult<FcmToken> {
        let mut errors = FieldErrors::new();
        let token = input::required(&mut errors, "fcm_token", &req.fcm_token);
        input::max_len(&mut errors, "fcm_token", token, 255);
        let device_id = input::non_blank(&req.device_id);
        if let Some(d) = device_id {
            input::max_len(&mut errors, "device_id", d, 255);
        }
        errors.into_result()?;

        let conn = self.database.conn()?;
        let existed = FcmToken::find_by_token(&conn, token)?.is_some();
        let saved = FcmToken::upsert(&conn, user_id, token, device_id)?;
        info!(
            "fcm token {} for user {user_id}",
            if existed { "updated" } else { "created" }
        );
        self.event_bus.emit(AppEvent::FcmTokenUpdated { user_id });
        Ok(saved)
    }

    /// Deactivate every other active token of the user.
    pub fn deactivate_old_tokens(&self, user_id: i64, current: &str) -> RimayResult<usize> {
        let conn = self.database.conn()?;
        let n = FcmToken::deactivate_others(&conn, user_id, current)?;
        if n > 0 {
            info!("deactivated {n} old fcm token(s) for user {user_id}");
        }
        Ok(n)
    }

    // ─── Profile ─────────────────────────────────────────────────────────

    /// The user's profile, unsaved and empty when none exists yet.
    pub fn profile(&self, user_id: i64) -> RimayResult<UserProfile> {
        let conn = self.database.conn()?;
        Ok(UserProfile::find_by_user(&conn, user_id)?.unwrap_or_else(|| UserProfile::new(user_id)))
    }

    /// Save the profile form. Location changes only when both coordinates
    /// are supplied.
    pub fn update_profile(&self, user_id: i64, form: &ProfileForm) -> RimayResult<UserProfile> {
        let mut profile = self.profile(user_id)?;
        profile.bio = input::non_blank(&form.bio).map(str::to_string);
        profile.alias_name = input::non_blank(&form.alias_name).map(str::to_string);
        if form.latitude.is_some() && form.longitude.is_some() {
            match GeoPoint::from_parts(form.latitude, form.longitude) {
                Some(p) => profile.set_location(Some(p)),
                None => {
                    warn!("ignoring out-of-range profile location for user {user_id}");
                }
            }
        }
        let conn = self.database.conn()?;
        profile.save(&conn)?;
        Ok(profile)
    }
}

impl Service for AuthService {
    fn name(&self) -> &str { "auth" }
    fn state(&self) -> ServiceState { self.state.get() }
    fn init(&self) -> RimayResult<()> {
        let conn = self.database.conn()?;
        let purged = Session::purge_expired(&conn)?;
        if purged > 0 {
            info!("purged {purged} expired session(s)");
        }
        self.state.set(ServiceState::Running);
        info!("auth service initialized");
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
    use serde_json::json;

    fn create_service() -> (AuthService, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::init(&dir.path().join("auth.db"), &Default::default()).unwrap();
        (AuthService::new(db, EventBus::new(16), 1_000, 24), dir)
    }

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            username: Some("maria".into()),
            password: Some("clave-segura".into()),
            dni: Some("0102030405".into()),
            first_name: Some("María".into()),
            last_name: Some("López".into()),
            email: Some("maria@example.com".into()),
            display_name: Some("Mari".into()),
            latitude: Some(json!("-0.18")),
            longitude: Some(json!(-78.47)),
            fcm_token: Some("device-token".into()),
            device_id: Some("pixel".into()),
        }
    }

    #[test]
    fn test_register_creates_profile_stats_and_token() {
        let (svc, _dir) = create_service();
        let user = svc.register(&register_request()).unwrap();
        let id = user.id.unwrap();

        let conn = svc.database.conn().unwrap();
        let profile = UserProfile::find_by_user(&conn, id).unwrap().unwrap();
        assert_eq!(profile.alias_name.as_deref(), Some("Mari"));
        assert_eq!(profile.location(), Some(GeoPoint::new(-0.18, -78.47)));
        assert_eq!(UserStats::find_by_user(&conn, id).unwrap().unwrap().total_alerts, 0);
        assert_eq!(FcmToken::for_user(&conn, id).unwrap().len(), 1);
    }

    #[test]
    fn test_register_validation_and_conflict() {
        let (svc, _dir) = create_service();
        let mut req = register_request();
        req.email = Some("not-an-email".into());
        req.dni = None;
        match svc.register(&req).unwrap_err() {
            RimayError::Validation(errors) => {
                assert!(errors.contains("email"));
                assert!(errors.contains("dni"));
            }
            other => panic!("unexpected {other:?}"),
        }

        svc.register(&register_request()).unwrap();
        let mut dup = register_request();
        dup.username = Some("otra".into());
        dup.email = Some("otra@example.com".into());
        assert!(matches!(svc.register(&dup), Err(RimayError::Conflict(_))));
    }

    #[test]
    fn test_login_returns_stable_token() {
        let (svc, _dir) = create_service();
        svc.register(&register_request()).unwrap();

        let (_, t1) = svc.login(Some("maria"), Some("clave-segura")).unwrap();
        let (_, t2) = svc.login(Some("maria"), Some("clave-segura")).unwrap();
        assert_eq!(t1.key, t2.key);
        assert_eq!(t1.key.len(), 40);
        assert_eq!(svc.authenticate_token(&t1.key).unwrap().username, "maria");

        assert!(matches!(
            svc.login(Some("maria"), Some("incorrecta")),
            Err(RimayError::AuthFailed(_))
        ));
        assert!(matches!(svc.authenticate_token("nope"), Err(RimayError::AuthFailed(_))));
    }

    #[test]
    fn test_inactive_user_cannot_login() {
        let (svc, _dir) = create_service();
        let user = svc.register(&register_request()).unwrap();
        let (_, token) = svc.login(Some("maria"), Some("clave-segura")).unwrap();

        let conn = svc.database.conn().unwrap();
        User::set_active(&conn, user.id.unwrap(), false).unwrap();
        assert!(svc.login(Some("maria"), Some("clave-segura")).is_err());
        assert!(svc.authenticate_token(&token.key).is_err());
    }

    #[test]
    fn test_signup_reports_mismatch_and_taken_fields() {
        let (svc, _dir) = create_service();
        svc.register(&register_request()).unwrap();

        let form = SignupForm {
            username: Some("maria".into()),
            dni: Some("999".into()),
            first_name: Some("A".into()),
            last_name: Some("B".into()),
            email: Some("nueva@example.com".into()),
            password1: Some("clave-segura".into()),
            password2: Some("otra-clave".into()),
        };
        match svc.signup(&form).unwrap_err() {
            RimayError::Validation(errors) => {
                assert!(errors.contains("username"));
                assert!(errors.contains("password2"));
                assert!(!errors.contains("dni"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_sessions_round_trip() {
        let (svc, _dir) = create_service();
        let user = svc.register(&register_request()).unwrap();
        let session = svc.login_session(&user).unwrap();

        let (found, who) = svc.session_user(&session.key).unwrap().unwrap();
        assert_eq!(found.key, session.key);
        assert_eq!(who.username, "maria");

        svc.flash(&session.key, FlashLevel::Success, "Listo").unwrap();
        assert_eq!(svc.take_flash(&session.key).unwrap().len(), 1);
        assert!(svc.take_flash(&session.key).unwrap().is_empty());

        svc.logout(&session.key).unwrap();
        assert!(svc.session_user(&session.key).unwrap().is_none());
    }

    #[test]
    fn test_fcm_token_reassigned_between_users() {
        let (svc, _dir) = create_service();
        let a = svc.register(&register_request()).unwrap().id.unwrap();
        let mut other = register_request();
        other.username = Some("jose".into());
        other.dni = Some("111".into());
        other.email = Some("jose@example.com".into());
        other.fcm_token = None;
        let b = svc.register(&other).unwrap().id.unwrap();

        let req = FcmTokenRequest {
            fcm_token: Some("device-token".into()),
            device_id: None,
        };
        let saved = svc.update_fcm_token(b, &req).unwrap();
        assert_eq!(saved.user_id, b);
        assert!(saved.is_active);

        let conn = svc.database.conn().unwrap();
        assert!(FcmToken::for_user(&conn, a).unwrap().is_empty());

        let missing = FcmTokenRequest::default();
        assert!(matches!(svc.update_fcm_token(b, &missing), Err(RimayError::Validation(_))));
    }

    #[test]
    fn test_deactivate_old_tokens_keeps_current() {
        let (svc, _dir) = create_service();
        let id = svc.register(&register_request()).unwrap().id.unwrap();
        for t in ["second", "third"] {
            svc.update_fcm_token(id, &FcmTokenRequest { fcm_token: Some(t.into()), device_id: None })
                .unwrap();
        }
        assert_eq!(svc.deactivate_old_tokens(id, "third").unwrap(), 2);

        let conn = svc.database.conn().unwrap();
        let active: Vec<String> = FcmToken::active_tokens_for_users(&conn, &[id]).unwrap();
        assert_eq!(active, vec!["third".to_string()]);
    }

    #[test]
    fn test_dni_login_creates_once() {
        let (svc, _dir) = create_service();
        let req = DniLoginRequest {
            username: Some("pedro".into()),
            password: Some("clave-segura".into()),
            dni: Some("1717171717".into()),
            first_name: Some("Pedro".into()),
            last_name: Some("Páez".into()),
            email: Some("pedro@example.com".into()),
        };
        let (u1, t1) = svc.get_or_create_user_by_dni(&req).unwrap();
        let (u2, t2) = svc.get_or_create_user_by_dni(&req).unwrap();
        assert_eq!(u1.id, u2.id);
        assert_eq!(t1.key, t2.key);
        assert!(svc.authenticate("pedro", "clave-segura").is_ok());
    }

    #[test]
    fn test_profile_update_requires_both_coordinates() {
        let (svc, _dir) = create_service();
        let id = svc.register(&register_request()).unwrap().id.unwrap();
        let form = ProfileForm {
            bio: Some("Vecina".into()),
            alias_name: None,
            latitude: Some(1.0),
            longitude: None,
        };
        let profile = svc.update_profile(id, &form).unwrap();
        assert_eq!(profile.bio.as_deref(), Some("Vecina"));
        assert_eq!(profile.location(), Some(GeoPoint::new(-0.18, -78.47)));
    }
}
