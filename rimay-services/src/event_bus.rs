//! Typed event bus for intra-service communication.
//!
//! Uses tokio broadcast channels to decouple services from one another.
//! The incident service emits `IncidentReported` without knowing that the
//! push notifier is listening.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use rimay_models::GeoPoint;

/// All application-level event types that flow through the event bus.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// A user account was created through the API or the signup page.
    UserRegistered {
        user_id: i64,
    },
    /// A new incident was committed.
    IncidentReported {
        incident_id: i64,
        reporter_id: i64,
        incident_type: String,
        location: Option<GeoPoint>,
    },
    /// An incident was moved to the resolved status.
    IncidentResolved {
        incident_id: i64,
        reporter_id: i64,
    },
    /// A user joined a community.
    MembershipCreated {
        user_id: i64,
        community_id: i64,
    },
    /// A community was created, either from the form or automatically.
    CommunityCreated {
        community_id: i64,
        automatic: bool,
    },
    /// A moderator toggled a member's verification.
    MemberVerificationChanged {
        membership_id: i64,
        is_verified: bool,
    },
    /// A device token was registered or reassigned.
    FcmTokenUpdated {
        user_id: i64,
    },
}

/// Application-wide event bus backed by a tokio broadcast channel.
///
/// Every subscriber gets every event. Slow subscribers that fall behind
/// receive a `Lagged` error and miss events.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<AppEvent>>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to receive application events.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: AppEvent) {
        let label = event_label(&event);
        match self.sender.send(event) {
            Ok(count) => {
                debug!("event_bus: emitted {label} to {count} subscriber(s)");
            }
            Err(_) => {
                debug!("event_bus: no subscribers for {label}");
            }
        }
    }

    /// Get the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Human-readable label for an event (for logging).
fn event_label(event: &AppEvent) -> &'static str {
    match event {
        AppEvent::UserRegistered { .. } => "UserRegistered",
        AppEvent::IncidentReported { .. } => "IncidentReported",
        AppEvent::IncidentResolved { .. } => "IncidentResolved",
        AppEvent::MembershipCreated { .. } => "MembershipCreated",
        AppEvent::CommunityCreated { .. } => "CommunityCreated",
        AppEvent::MemberVerificationChanged { .. } => "MemberVerificationChanged",
        AppEvent::FcmTokenUpdated { .. } => "FcmTokenUpdated",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(AppEvent::IncidentResolved {
            incident_id: 7,
            reporter_id: 1,
        });

        match rx.recv().await.unwrap() {
            AppEvent::IncidentResolved { incident_id, .. } => assert_eq!(incident_id, 7),
            _ => panic!("unexpected event type"),
        }
    }

    #[tokio::test]
    async fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(AppEvent::UserRegistered { user_id: 42 });

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                AppEvent::UserRegistered { user_id } => assert_eq!(user_id, 42),
                _ => panic!("unexpected event type"),
            }
        }
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(AppEvent::FcmTokenUpdated { user_id: 1 });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_labels() {
        assert_eq!(
            event_label(&AppEvent::IncidentReported {
                incident_id: 1,
                reporter_id: 1,
                incident_type: String::new(),
                location: None,
            }),
            "IncidentReported"
        );
    }
}
