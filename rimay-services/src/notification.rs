//! Push delivery to users and device tokens.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use rimay_core::error::{RimayError, RimayResult};
use rimay_models::{Database, FcmToken};
use rimay_push::sender::preview;
use rimay_push::{PushMessage, PushSender};

use crate::service::{Service, ServiceState, StateCell};

/// Outcome of a fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SendSummary {
    pub success: usize,
    pub failed: usize,
    /// Tokens the provider reported as unregistered.
    pub invalid_tokens: Vec<String>,
}

pub struct NotificationService {
    state: StateCell,
    database: Database,
    sender: Arc<dyn PushSender>,
}

impl NotificationService {
    pub fn new(database: Database, sender: Arc<dyn PushSender>) -> Self {
        Self {
            state: StateCell::new(),
            database,
            sender,
        }
    }

    pub fn sender_name(&self) -> &'static str {
        self.sender.name()
    }

    /// Send to every active token of the users.
    pub async fn send_to_users(&self, user_ids: &[i64], message: &PushMessage) -> RimayResult<SendSummary> {
        let tokens = {
            let conn = self.database.conn()?;
            FcmToken::active_tokens_for_users(&conn, user_ids)?
        };
        if tokens.is_empty() {
            debug!("no active tokens for {} users", user_ids.len());
            return Ok(SendSummary::default());
        }
        self.send_to_tokens(&tokens, message).await
    }

    /// Send one message per token. Unregistered tokens are deactivated.
    pub async fn send_to_tokens(&self, tokens: &[String], message: &PushMessage) -> RimayResult<SendSummary> {
        let mut summary = SendSummary::default();

        for token in tokens {
            match self.sender.send(token, message).await {
                Ok(id) => {
                    debug!("sent to {}: {id}", preview(token));
                    summary.success += 1;
                }
                Err(RimayError::Unregistered(_)) => {
                    debug!("token {} is no longer registered", preview(token));
                    summary.failed += 1;
                    summary.invalid_tokens.push(token.clone());
                }
                Err(e) => {
                    warn!("push via {} to {} failed: {e}", self.sender.name(), preview(token));
                    summary.failed += 1;
                }
            }
        }

        if !summary.invalid_tokens.is_empty() {
            let conn = self.database.conn()?;
            let n = FcmToken::deactivate_tokens(&conn, &summary.invalid_tokens)?;
            info!("deactivated {n} unregistered tokens");
        }

        info!(
            "push \"{}\": {} sent, {} failed",
            message.title, summary.success, summary.failed
        );
        Ok(summary)
    }
}

impl Service for NotificationService {
    fn name(&self) -> &str { "notification" }
    fn state(&self) -> ServiceState { self.state.get() }
    fn init(&self) -> RimayResult<()> {
        self.state.set(ServiceState::Running);
        info!("notification service initialized with {} sender", self.sender.name());
        Ok(())
    }
    fn shutdown(&self) -> RimayResult<()> {
        self.state.set(ServiceState::Stopped);
        Ok(())
    }
}
