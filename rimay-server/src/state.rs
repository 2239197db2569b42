//! Shared state handed to every request handler.

use std::sync::Arc;

use rimay_core::config::ServerConfig;
use rimay_services::ServiceRegistry;

/// Room for the multipart framing and text fields around an upload.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state: the service registry plus the server settings the
/// handlers read on every request.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub server: Arc<ServerConfig>,
    /// Largest accepted request body.
    pub body_limit: usize,
}

impl AppState {
    pub fn new(registry: Arc<ServiceRegistry>, server: ServerConfig, max_upload_bytes: usize) -> Self {
        Self {
            registry,
            server: Arc::new(server),
            body_limit: max_upload_bytes + FORM_OVERHEAD_BYTES,
        }
    }

    /// `Set-Cookie` value starting a browser session.
    pub fn session_cookie(&self, key: &str) -> String {
        let max_age = self.server.session_ttl_hours.max(0) * 3600;
        let mut cookie = format!(
            "{}={key}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}",
            rimay_core::constants::SESSION_COOKIE
        );
        if self.server.secure_cookies {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value removing the session cookie.
    pub fn expired_session_cookie(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
            rimay_core::constants::SESSION_COOKIE
        )
    }
}
