//! Alerts for users near a newly reported incident.
//!
//! The notifier listens on the event bus so that reporting an incident never
//! waits on the push provider.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use rimay_models::{Database, GeoPoint, IncidentNotification};
use rimay_push::PushMessage;

use crate::event_bus::{AppEvent, EventBus};
use crate::location::LocationService;
use crate::notification::{NotificationService, SendSummary};

pub const CLICK_ACTION: &str = "OPEN_INCIDENT_DETAIL";

/// Title and body for an incident type, matched on the lower-cased name.
pub fn alert_for(incident_type: &str) -> (&'static str, &'static str) {
    match incident_type.trim().to_lowercase().as_str() {
        "robo" => (
            "🚨 Alerta de Robo Cercano",
            "Se ha reportado un posible robo cerca de tu ubicación. Mantente alerta.",
        ),
        "asalto" => (
            "🚨 Alerta de Asalto Cercano",
            "Se ha reportado un asalto en tu zona. Evita transitar por el área.",
        ),
        "accidente" => (
            "🚑 Accidente de Tránsito Cercano",
            "Se registró un accidente de tránsito a menos de 2 km de tu ubicación.",
        ),
        "emergencia" => (
            "🆘 Emergencia Médica Cercana",
            "Se ha reportado una emergencia médica cercana.",
        ),
        "medico" => (
            "🆘 Emergencia Médica Cercana",
            "Atención: emergencia médica registrada en tu sector.",
        ),
        "incendio" => (
            "🔥 Alerta de Incendio Cercano",
            "Se reporta un posible incendio cerca de tu ubicación. Toma precauciones.",
        ),
        "seguridad" => (
            "🛡️ Alerta de Seguridad en tu Zona",
            "Se ha reportado una situación de seguridad en tu zona. Permanece atento y toma precauciones.",
        ),
        _ => (
            "⚠️ Incidente Cercano",
            "Se detectó un incidente cerca de tu ubicación.",
        ),
    }
}

/// A reported incident, as far as the notifier cares.
#[derive(Debug, Clone)]
pub struct ReportedIncident {
    pub id: i64,
    pub reporter_id: i64,
    pub incident_type: String,
    pub location: GeoPoint,
}

pub struct NearbyUsersNotifier {
    database: Database,
    location: Arc<LocationService>,
    notifications: Arc<NotificationService>,
}

impl NearbyUsersNotifier {
    pub fn new(database: Database, location: Arc<LocationService>, notifications: Arc<NotificationService>) -> Self {
        Self {
            database,
            location,
            notifications,
        }
    }

    /// Alert users near the incident and record who was alerted.
    ///
    /// Failures are logged, never returned.
    pub async fn send_notifications(&self, incident: &ReportedIncident) -> SendSummary {
        let recipients: Vec<i64> = self
            .location
            .nearby_users(&incident.location, None)
            .into_iter()
            .filter_map(|u| u.id)
            .filter(|id| *id != incident.reporter_id)
            .collect();

        if recipients.is_empty() {
            debug!("incident {}: nobody nearby to notify", incident.id);
            return SendSummary::default();
        }

        let (title, body) = alert_for(&incident.incident_type);
        let message = PushMessage::new(title, body)
            .with_data("incident_id", incident.id)
            .with_data("incident_type", &incident.incident_type)
            .with_data("latitude", incident.location.latitude)
            .with_data("longitude", incident.location.longitude)
            .with_data("click_action", CLICK_ACTION);

        let summary = match self.notifications.send_to_users(&recipients, &message).await {
            Ok(s) => s,
            Err(e) => {
                error!("incident {}: push fan-out failed: {e}", incident.id);
                SendSummary::default()
            }
        };

        match self
            .database
            .conn()
            .and_then(|conn| IncidentNotification::record_many(&conn, incident.id, &recipients))
        {
            Ok(n) => info!(
                "incident {}: {} nearby users, {} pushes sent, {n} notifications recorded",
                incident.id,
                recipients.len(),
                summary.success
            ),
            Err(e) => error!("incident {}: recording notifications failed: {e}", incident.id),
        }
        summary
    }

    /// Run the notifier for every located `IncidentReported` event.
    ///
    /// A forwarder task moves events from the bus into an unbounded queue
    /// without awaiting anything else, so a slow push provider never makes
    /// the bus subscription lag. A worker task drains the queue one incident
    /// at a time. Events are lost only when the forwarder itself falls more
    /// than the bus capacity behind, which is logged.
    pub fn spawn_listener(self: Arc<Self>, event_bus: &EventBus) -> AlertListener {
        let mut rx = event_bus.subscribe();
        let (queue, mut pending) = mpsc::unbounded_channel::<ReportedIncident>();

        let forwarder = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(AppEvent::IncidentReported { incident_id, reporter_id, incident_type, location }) => {
                        let Some(location) = location else {
                            debug!("incident {incident_id} has no location, skipping alerts");
                            continue;
                        };
                        let incident = ReportedIncident { id: incident_id, reporter_id, incident_type, location };
                        if queue.send(incident).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        error!("alert forwarder lagged behind, {n} events lost");
                    }
                    Err(RecvError::Closed) => {
                        debug!("event bus closed, alert forwarder stopping");
                        break;
                    }
                }
            }
        });

        let worker = tokio::spawn(async move {
            while let Some(incident) = pending.recv().await {
                self.send_notifications(&incident).await;
            }
            debug!("alert queue drained, notifier stopping");
        });

        AlertListener { forwarder, worker }
    }
}

/// Handle to the running alert tasks.
pub struct AlertListener {
    forwarder: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl AlertListener {
    /// Stop taking new events and wait up to `grace` for queued alerts to
    /// go out. Whatever is still pending after that is abandoned.
    pub async fn drain(self, grace: Duration) {
        self.forwarder.abort();
        let worker_abort = self.worker.abort_handle();
        match tokio::time::timeout(grace, self.worker).await {
            Ok(_) => info!("incident alerts drained"),
            Err(_) => {
                warn!("incident alerts still pending after {grace:?}, abandoning them");
                worker_abort.abort();
            }
        }
    }

    /// Stop both tasks immediately.
    pub fn abort(&self) {
        self.forwarder.abort();
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_for_known_types() {
        assert_eq!(alert_for("Robo").0, "🚨 Alerta de Robo Cercano");
        assert_eq!(alert_for(" INCENDIO ").0, "🔥 Alerta de Incendio Cercano");
        assert_eq!(alert_for("medico").1, "Atención: emergencia médica registrada en tu sector.");
        assert_eq!(alert_for("emergencia").0, alert_for("medico").0);
    }

    #[test]
    fn test_alert_for_unknown_type() {
        assert_eq!(alert_for("Vandalismo"), ("⚠️ Incidente Cercano", "Se detectó un incidente cerca de tu ubicación."));
    }
}
