//! Service registry for dependency injection and lifecycle management.
//!
//! The registry builds every service from the shared infrastructure
//! (configuration, database, event bus, push sender), initializes them in
//! order, and shuts them down in reverse. Request handlers reach services
//! through the typed fields.

use std::sync::Arc;

use tracing::{error, info, warn};

use rimay_core::config::{AppConfig, ConfigHandle, PushConfig};
use rimay_core::error::{RimayError, RimayResult};
use rimay_models::Database;
use rimay_push::{DisabledSender, FcmClient, PushSender};

use crate::auth::AuthService;
use crate::community::CommunityService;
use crate::dashboard::DashboardService;
use crate::event_bus::EventBus;
use crate::incident::IncidentService;
use crate::location::LocationService;
use crate::notification::NotificationService;
use crate::notifier::{AlertListener, NearbyUsersNotifier};
use crate::permission::PermissionService;
use crate::service::{Service, ServiceState};
use crate::stats::StatsService;

/// Push sender for the configuration: the FCM client when push is enabled
/// and credentials are present, otherwise a sender that drops everything.
pub fn push_sender_from_config(config: &PushConfig) -> Arc<dyn PushSender> {
    if !config.enabled {
        info!("push notifications disabled by configuration");
        return Arc::new(DisabledSender);
    }
    match FcmClient::from_config(config) {
        Ok(client) => {
            info!("push notifications via FCM: {}", client.send_url());
            Arc::new(client)
        }
        Err(e) => {
            warn!("push notifications disabled: {e}");
            Arc::new(DisabledSender)
        }
    }
}

/// Central service registry that manages all application services.
pub struct ServiceRegistry {
    /// Application configuration.
    pub config: ConfigHandle,
    /// Database connection pool.
    pub database: Database,
    /// Application-level event bus.
    pub event_bus: EventBus,
    pub auth: Arc<AuthService>,
    pub permission: Arc<PermissionService>,
    pub community: Arc<CommunityService>,
    pub incident: Arc<IncidentService>,
    pub location: Arc<LocationService>,
    pub notification: Arc<NotificationService>,
    pub notifier: Arc<NearbyUsersNotifier>,
    pub stats: Arc<StatsService>,
    pub dashboard: Arc<DashboardService>,
    /// Registered services in initialization order.
    services: Vec<(String, Arc<dyn Service>)>,
}

impl ServiceRegistry {
    /// Build every service.
    ///
    /// Initialization order:
    /// 1. Auth (database, event_bus)
    /// 2. Permission (database)
    /// 3. Location (database)
    /// 4. Notification (database, push sender)
    /// 5. Community (database, event_bus)
    /// 6. Incident (database, event_bus, media root)
    /// 7. Stats (database)
    /// 8. Dashboard (database)
    pub fn build(config: &AppConfig, database: Database, sender: Arc<dyn PushSender>) -> RimayResult<Self> {
        let bus = EventBus::new(256);
        let media_root = config.effective_media_root()?;

        let auth = Arc::new(AuthService::new(
            database.clone(),
            bus.clone(),
            config.server.password_iterations,
            config.server.session_ttl_hours,
        ));
        let permission = Arc::new(PermissionService::new(database.clone()));
        let location = Arc::new(LocationService::new(database.clone(), config.geo.notify_radius_km));
        let notification = Arc::new(NotificationService::new(database.clone(), sender));
        let community = Arc::new(CommunityService::new(database.clone(), bus.clone()));
        let incident = Arc::new(IncidentService::new(
            database.clone(),
            bus.clone(),
            media_root,
            config.media.max_upload_bytes,
            config.geo.map_radius_km,
        ));
        let stats = Arc::new(StatsService::new(database.clone()));
        let dashboard = Arc::new(DashboardService::new(database.clone()));
        let notifier = Arc::new(NearbyUsersNotifier::new(
            database.clone(),
            location.clone(),
            notification.clone(),
        ));

        let services: Vec<Arc<dyn Service>> = vec![
            auth.clone(),
            permission.clone(),
            location.clone(),
            notification.clone(),
            community.clone(),
            incident.clone(),
            stats.clone(),
            dashboard.clone(),
        ];
        let services = services
            .into_iter()
            .map(|s| {
                info!("registered service: {}", s.name());
                (s.name().to_string(), s)
            })
            .collect();

        Ok(Self {
            config: ConfigHandle::new(config.clone()),
            database,
            event_bus: bus,
            auth,
            permission,
            community,
            incident,
            location,
            notification,
            notifier,
            stats,
            dashboard,
            services,
        })
    }

    /// Initialize all registered services in order.
    pub fn init_all(&self) -> RimayResult<()> {
        info!("initializing {} services", self.services.len());

        for (name, service) in &self.services {
            info!("initializing service: {name}");
            if let Err(e) = service.init() {
                error!("failed to initialize service {name}: {e}");
                return Err(RimayError::ServiceInit(format!("{name}: {e}")));
            }
        }

        info!("all services initialized");
        Ok(())
    }

    /// Shut down all services in reverse order.
    pub fn shutdown_all(&self) -> RimayResult<()> {
        info!("shutting down services");

        for (name, service) in self.services.iter().rev() {
            info!("shutting down service: {name}");
            if let Err(e) = service.shutdown() {
                error!("error shutting down service {name}: {e}");
            }
        }

        info!("all services shut down");
        Ok(())
    }

    /// Start the incident alert listener. Must run inside a tokio runtime.
    pub fn start_listener(&self) -> AlertListener {
        self.notifier.clone().spawn_listener(&self.event_bus)
    }

    /// Get a reference to the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Get the health status of all services.
    pub fn health_check(&self) -> Vec<(String, ServiceState, bool)> {
        self.services
            .iter()
            .map(|(name, svc)| (name.clone(), svc.state(), svc.is_healthy()))
            .collect()
    }

    /// Get the number of registered services.
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.media.root = dir.join("media").to_string_lossy().into_owned();
        config.server.password_iterations = 1_000;
        config
    }

    #[test]
    fn test_build_registers_all() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::init(&dir.path().join("test.db"), &Default::default()).unwrap();
        let registry = ServiceRegistry::build(&test_config(dir.path()), db, Arc::new(DisabledSender)).unwrap();
        assert_eq!(registry.service_count(), 8);
    }

    #[tokio::test]
    async fn test_init_and_shutdown() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::init(&dir.path().join("test.db"), &Default::default()).unwrap();
        let registry = ServiceRegistry::build(&test_config(dir.path()), db, Arc::new(DisabledSender)).unwrap();

        registry.init_all().unwrap();
        assert!(dir.path().join("media").is_dir());

        for (name, state, healthy) in registry.health_check() {
            assert!(healthy, "service {name} is not healthy (state: {state})");
        }

        let listener = registry.start_listener();
        assert_eq!(registry.event_bus().subscriber_count(), 1);

        registry.shutdown_all().unwrap();
        for (_, state, _) in registry.health_check() {
            assert_eq!(state, ServiceState::Stopped);
        }
        listener.drain(std::time::Duration::from_secs(1)).await;
    }

    #[test]
    fn test_push_sender_fallback() {
        let mut push = PushConfig::default();
        push.enabled = false;
        assert_eq!(push_sender_from_config(&push).name(), "disabled");

        push.enabled = true;
        push.project_id.clear();
        assert_eq!(push_sender_from_config(&push).name(), "disabled");

        push.project_id = "demo".into();
        push.access_token = "ya29.token".into();
        assert_eq!(push_sender_from_config(&push).name(), "fcm");
    }
}
