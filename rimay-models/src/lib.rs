//! Rimay Models - Database schema, models, migrations, and query builders.
//!
//! This crate owns all data persistence: SQLite database initialization,
//! entity models for users, communities and incidents, versioned migrations
//! with seed data, geographic helpers, and filtered list queries.

pub mod db;
pub mod schema;
pub mod models;
pub mod queries;
pub mod migrations;
pub mod geo;

// Re-export key types
pub use db::{Database, DbPool};
pub use geo::{GeoPoint, Polygon};
pub use models::user::User;
pub use models::user_profile::UserProfile;
pub use models::auth_token::AuthToken;
pub use models::session::Session;
pub use models::group::{Group, Permission};
pub use models::fcm_token::FcmToken;
pub use models::community::Community;
pub use models::community_membership::CommunityMembership;
pub use models::incident_type::IncidentType;
pub use models::incident_status::IncidentStatus;
pub use models::incident::Incident;
pub use models::incident_media::IncidentMedia;
pub use models::incident_comment::IncidentComment;
pub use models::incident_notification::IncidentNotification;
pub use models::user_stats::UserStats;
