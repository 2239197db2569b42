//! HTTP client for the FCM HTTP v1 API.
//!
//! Wraps reqwest with bearer authentication, the `messages:send` URL, and
//! exponential backoff retry for transient failures.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use rimay_core::config::PushConfig;
use rimay_core::error::{RimayError, RimayResult};

use crate::message::PushMessage;
use crate::response::{FcmErrorBody, SendResponse};
use crate::sender::{preview, PushSender};

/// Retry configuration for transient send failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retries (doubled each attempt).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// HTTP status codes that trigger a retry.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            retryable_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

/// FCM HTTP v1 client bound to one Firebase project.
#[derive(Clone)]
pub struct FcmClient {
    inner: Client,
    send_url: String,
    static_token: String,
    token_file: Option<PathBuf>,
    retry_config: RetryConfig,
}

impl FcmClient {
    /// Build a client from the push configuration.
    pub fn from_config(config: &PushConfig) -> RimayResult<Self> {
        if config.project_id.is_empty() {
            return Err(RimayError::MissingConfig("push.project_id".into()));
        }
        if config.access_token.is_empty() && config.access_token_file.is_empty() {
            return Err(RimayError::MissingConfig(
                "push.access_token or push.access_token_file".into(),
            ));
        }

        let inner = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| RimayError::Http(format!("failed to build HTTP client: {e}")))?;

        let endpoint = config.endpoint.trim_end_matches('/');
        let send_url = format!("{endpoint}/v1/projects/{}/messages:send", config.project_id);

        let token_file = (!config.access_token_file.is_empty())
            .then(|| PathBuf::from(&config.access_token_file));

        Ok(Self {
            inner,
            send_url,
            static_token: config.access_token.clone(),
            token_file,
            retry_config: RetryConfig {
                max_retries: config.max_retries,
                ..RetryConfig::default()
            },
        })
    }

    /// Replace the retry policy.
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn send_url(&self) -> &str {
        &self.send_url
    }

    /// Current OAuth2 access token.
    ///
    /// The token file wins over the inline token and is re-read on every call
    /// so an external refresher can rotate it.
    pub async fn access_token(&self) -> RimayResult<String> {
        if let Some(path) = &self.token_file {
            let token = tokio::fs::read_to_string(path).await.map_err(|e| {
                RimayError::Config(format!("failed to read {}: {e}", path.display()))
            })?;
            let token = token.trim();
            if !token.is_empty() {
                return Ok(token.to_string());
            }
            warn!("access token file {} is empty", path.display());
        }
        if self.static_token.is_empty() {
            return Err(RimayError::MissingConfig("push access token".into()));
        }
        Ok(self.static_token.clone())
    }

    /// Send one message to one token with retry.
    pub async fn send_message(&self, token: &str, message: &PushMessage) -> RimayResult<String> {
        let body = serde_json::to_value(message.to_send_request(token))?;
        let response = self.request_with_retry(&body).await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FcmErrorBody::parse(&text).into_error(status.as_u16(), &preview(token)));
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| RimayError::Serialization(format!("failed to parse send response: {e}")))?;
        debug!("fcm accepted {}", sent.name);
        Ok(sent.name)
    }

    /// POST to `messages:send` with exponential backoff retry.
    async fn request_with_retry(&self, body: &serde_json::Value) -> RimayResult<Response> {
        let access_token = self.access_token().await?;
        let mut last_error: Option<RimayError> = None;

        for attempt in 0..=self.retry_config.max_retries {
            if attempt > 0 {
                let delay = self.calculate_retry_delay(attempt - 1);
                warn!(
                    "retrying fcm send (attempt {}/{}) after {:.1}s",
                    attempt + 1,
                    self.retry_config.max_retries + 1,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }

            let builder = self
                .inner
                .post(&self.send_url)
                .bearer_auth(&access_token)
                .json(body);

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();

                    if self
                        .retry_config
                        .retryable_statuses
                        .contains(&status.as_u16())
                        && attempt < self.retry_config.max_retries
                    {
                        warn!("retryable status {} from fcm", status.as_u16());
                        last_error = Some(RimayError::Push {
                            status: status.as_u16(),
                            message: format!("retryable status {status}"),
                        });
                        continue;
                    }

                    return Ok(response);
                }
                Err(e) => {
                    let is_retryable = e.is_timeout() || e.is_connect();
                    let err = Self::classify_error(e);

                    if is_retryable && attempt < self.retry_config.max_retries {
                        warn!("retryable error sending to fcm: {}", err);
                        last_error = Some(err);
                        continue;
                    }

                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RimayError::Http("max retries exceeded".into())))
    }

    /// Calculate retry delay with exponential backoff.
    fn calculate_retry_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.retry_config.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(32));
        let max_ms = self.retry_config.max_delay.as_millis() as u64;
        Duration::from_millis(delay_ms.min(max_ms))
    }

    /// Classify a reqwest error into a RimayError variant.
    fn classify_error(e: reqwest::Error) -> RimayError {
        if e.is_timeout() {
            RimayError::Http(format!("request timed out: {e}"))
        } else if e.is_connect() {
            RimayError::Http(format!("connection failed: {e}"))
        } else if e.status() == Some(StatusCode::UNAUTHORIZED) {
            RimayError::AuthFailed(e.to_string())
        } else {
            RimayError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl PushSender for FcmClient {
    async fn send(&self, token: &str, message: &PushMessage) -> RimayResult<String> {
        self.send_message(token, message).await
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PushConfig {
        PushConfig {
            project_id: "rimay-test".into(),
            endpoint: "http://localhost:9099/".into(),
            access_token: "ya29.static".into(),
            ..PushConfig::default()
        }
    }

    #[test]
    fn test_send_url() {
        let client = FcmClient::from_config(&test_config()).unwrap();
        assert_eq!(
            client.send_url(),
            "http://localhost:9099/v1/projects/rimay-test/messages:send"
        );
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let mut config = test_config();
        config.access_token.clear();
        assert!(matches!(
            FcmClient::from_config(&config),
            Err(RimayError::MissingConfig(_))
        ));
        let mut config = test_config();
        config.project_id.clear();
        assert!(FcmClient::from_config(&config).is_err());
    }

    #[test]
    fn test_retry_delay_calculation() {
        let client = FcmClient::from_config(&test_config()).unwrap();
        assert_eq!(client.calculate_retry_delay(0), Duration::from_secs(1));
        assert_eq!(client.calculate_retry_delay(1), Duration::from_secs(2));
        assert_eq!(client.calculate_retry_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_delay_capped() {
        let client = FcmClient::from_config(&test_config()).unwrap();
        assert!(client.calculate_retry_delay(10) <= Duration::from_secs(4));
        assert!(client.calculate_retry_delay(60) <= Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_token_file_wins() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "ya29.rotated\n").unwrap();

        let mut config = test_config();
        config.access_token_file = path.to_string_lossy().into_owned();
        let client = FcmClient::from_config(&config).unwrap();
        assert_eq!(client.access_token().await.unwrap(), "ya29.rotated");

        // Empty file falls back to the inline token.
        std::fs::write(&path, "").unwrap();
        assert_eq!(client.access_token().await.unwrap(), "ya29.static");
    }
}
