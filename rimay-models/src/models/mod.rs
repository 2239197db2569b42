//! Entity model definitions.

pub mod user;
pub mod user_profile;
pub mod auth_token;
pub mod session;
pub mod group;
pub mod fcm_token;
pub mod community;
pub mod community_membership;
pub mod incident_type;
pub mod incident_status;
pub mod incident;
pub mod incident_media;
pub mod incident_comment;
pub mod incident_notification;
pub mod user_stats;
