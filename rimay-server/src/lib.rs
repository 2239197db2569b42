//! Rimay Server - HTTP front end.
//!
//! Serves the JSON API used by the mobile app, the session-based management
//! pages, and uploaded media. `serve` wires configuration, database and
//! services together and runs until Ctrl+C or SIGTERM.

pub mod api;
pub mod error;
pub mod extract;
pub mod pages;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use rimay_core::config::AppConfig;
use rimay_core::error::RimayResult;
use rimay_models::Database;
use rimay_services::registry::push_sender_from_config;
use rimay_services::ServiceRegistry;

pub use state::AppState;

/// How long shutdown waits for queued incident alerts.
const ALERT_DRAIN_GRACE: Duration = Duration::from_secs(10);

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("ignoring invalid CORS origin {o}");
                None
            }
        })
        .collect();
    if allowed.is_empty() {
        layer.allow_origin(AllowOrigin::any())
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

/// The complete application: API, pages and `/media`.
pub fn router(state: AppState) -> Router {
    let media = ServeDir::new(state.registry.incident.media_root());
    Router::new()
        .merge(api::routes())
        .merge(pages::routes())
        .nest_service("/media", media)
        .layer(DefaultBodyLimit::max(state.body_limit))
        .layer(cors_layer(&state.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the database, start the services and serve until shutdown.
pub async fn serve(config: AppConfig) -> RimayResult<()> {
    let db_path = config.effective_db_path()?;
    info!("opening database at {}", db_path.display());
    let database = Database::init(&db_path, &config.database)?;

    let sender = push_sender_from_config(&config.push);
    let registry = Arc::new(ServiceRegistry::build(&config, database, sender)?);
    registry.init_all()?;
    let alerts = registry.start_listener();

    let state = AppState::new(registry.clone(), config.server.clone(), config.media.max_upload_bytes);
    let app = router(state);

    let address = &config.server.bind_address;
    let listener = TcpListener::bind(address).await?;
    info!("server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shutting down");
    alerts.drain(ALERT_DRAIN_GRACE).await;
    registry.shutdown_all()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => {
                error!("failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(e) => {
                error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
