//! Rimay Services - Business logic and service layer.
//!
//! This crate provides the service trait, the service registry that wires
//! shared infrastructure into each service, and the concrete services:
//! - Authentication (API registration, token login, sessions, FCM tokens)
//! - Group permissions for the management pages
//! - Community membership by location, member verification, community CRUD
//! - Incident reporting with media storage, map view, resolution
//! - Nearby-user lookup and push notification fan-out
//! - Per-user alert statistics and dashboard helpers
//! - Event bus (typed intra-service communication)

pub mod service;
pub mod registry;
pub mod event_bus;
pub mod password;
pub mod input;
pub mod auth;
pub mod permission;
pub mod community;
pub mod incident;
pub mod location;
pub mod notification;
pub mod notifier;
pub mod stats;
pub mod dashboard;

// Re-export key types
pub use service::{Service, ServiceState};
pub use registry::ServiceRegistry;
pub use event_bus::{AppEvent, EventBus};
pub use auth::AuthService;
pub use permission::PermissionService;
pub use community::CommunityService;
pub use incident::IncidentService;
pub use location::LocationService;
pub use notification::{NotificationService, SendSummary};
pub use notifier::{AlertListener, NearbyUsersNotifier};
pub use stats::StatsService;
pub use dashboard::DashboardService;
