//! The delivery seam used by the notification service.

use async_trait::async_trait;
use tracing::debug;

use rimay_core::error::{RimayError, RimayResult};

use crate::message::PushMessage;

/// Something that can deliver a notification to a single device token.
///
/// Returns the provider's message id on success. An unregistered token must
/// surface as [`RimayError::Unregistered`] so the caller can deactivate it.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, token: &str, message: &PushMessage) -> RimayResult<String>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Sender used when push credentials are not configured. Every send fails.
#[derive(Debug, Default, Clone)]
pub struct DisabledSender;

#[async_trait]
impl PushSender for DisabledSender {
    async fn send(&self, token: &str, _message: &PushMessage) -> RimayResult<String> {
        debug!("push disabled, dropping notification for {}", preview(token));
        Err(RimayError::MissingConfig("push notifications are not configured".into()))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// First 20 characters of a token, for logs.
pub fn preview(token: &str) -> String {
    let head: String = token.chars().take(20).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_sender_fails() {
        let err = DisabledSender
            .send("token", &PushMessage::new("t", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, RimayError::MissingConfig(_)));
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("abcdefghijklmnopqrstuvwxyz"), "abcdefghijklmnopqrst...");
        assert_eq!(preview("short"), "short...");
    }
}
