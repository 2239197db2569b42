//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "Rimay Alert";

/// Directory name used under the platform data/config roots.
pub const APP_DIR_NAME: &str = "RimayAlert";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default browser session lifetime (two weeks).
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 14;

/// Name of the browser session cookie.
pub const SESSION_COOKIE: &str = "rimay_session";

/// FCM API origin.
pub const FCM_ENDPOINT: &str = "https://fcm.googleapis.com";

/// Users within this many kilometres of a new incident are notified.
pub const NOTIFY_RADIUS_KM: f64 = 2.0;

/// Incidents within this many kilometres of the user are shown on the map.
pub const MAP_RADIUS_KM: f64 = 5.0;

/// Half-side (degrees) of the square boundary drawn around a point when a
/// community is created on demand.
pub const AUTO_COMMUNITY_HALF_SIDE_DEG: f64 = 0.0001;

/// Number of recent reports returned by the incident list endpoint.
pub const RECENT_INCIDENTS_LIMIT: u32 = 4;

/// Number of incidents shown on the dashboard.
pub const DASHBOARD_INCIDENTS_LIMIT: u32 = 5;

/// Page size for paginated HTML lists.
pub const PAGE_SIZE: u32 = 20;

/// PBKDF2 iteration count for new password hashes.
pub const PASSWORD_ITERATIONS: u32 = 600_000;

/// Minimum password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Database schema version.
pub const DB_SCHEMA_VERSION: i32 = 1;

/// Permission codenames.
pub mod permissions {
    /// Grants access to the community and incident management pages.
    pub const CAN_MANAGE_COMMUNITY: &str = "can_manage_community";
}

/// Incident status codes seeded by the first migration.
pub mod status_codes {
    pub const REPORTED: &str = "reported";
    pub const IN_REVIEW: &str = "002";
    pub const RESOLVED: &str = "003";

    /// Name used to find the resolved status when no row carries the code.
    pub const RESOLVED_NAME: &str = "Resuelto";
}

/// Community membership roles.
pub mod roles {
    pub const MEMBER: &str = "member";
    pub const MODERATOR: &str = "moderator";
    pub const ADMIN: &str = "admin";

    pub const ALL: &[&str] = &[MEMBER, MODERATOR, ADMIN];

    /// Roles allowed to verify other members.
    pub fn can_verify(role: &str) -> bool {
        role == ADMIN || role == MODERATOR
    }
}

/// Incident media kinds.
pub mod media_types {
    pub const IMAGE: &str = "image";
    pub const VIDEO: &str = "video";
    pub const AUDIO: &str = "audio";

    pub const ALL: &[&str] = &[IMAGE, VIDEO, AUDIO];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_roles() {
        assert!(roles::can_verify("admin"));
        assert!(roles::can_verify("moderator"));
        assert!(!roles::can_verify("member"));
    }
}
