//! FCM response bodies.
//!
//! A successful send returns the message resource name. Failures use the
//! Google API error envelope:
//! ```json
//! { "error": { "code": 404, "message": "...", "status": "NOT_FOUND",
//!   "details": [{ "@type": "type.googleapis.com/google.firebase.fcm.v1.FcmError",
//!                 "errorCode": "UNREGISTERED" }] } }
//! ```

use serde::{Deserialize, Serialize};

use rimay_core::error::RimayError;

/// Body of a successful `messages:send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    /// `projects/<project>/messages/<id>`.
    pub name: String,
}

/// Error envelope returned by the FCM API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FcmErrorBody {
    #[serde(default)]
    pub error: FcmError,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FcmError {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmErrorDetail {
    #[serde(rename = "@type", default)]
    pub detail_type: String,
    #[serde(rename = "errorCode")]
    pub error_code: Option<String>,
}

impl FcmErrorBody {
    /// Parse an error body, tolerating non-JSON payloads from proxies.
    pub fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| Self {
            error: FcmError {
                message: text.to_string(),
                ..FcmError::default()
            },
        })
    }

    /// The FCM-specific error code, e.g. `UNREGISTERED`.
    pub fn error_code(&self) -> Option<&str> {
        self.error
            .details
            .iter()
            .find_map(|d| d.error_code.as_deref())
    }

    /// Whether the target token is no longer valid for this project.
    pub fn is_unregistered(&self, status: u16) -> bool {
        status == 404 || self.error_code() == Some("UNREGISTERED")
    }

    /// Convert into the application error for the given HTTP status.
    pub fn into_error(self, status: u16, token_preview: &str) -> RimayError {
        if self.is_unregistered(status) {
            return RimayError::Unregistered(token_preview.to_string());
        }
        let message = match self.error_code() {
            Some(code) if !self.error.message.is_empty() => format!("{code}: {}", self.error.message),
            Some(code) => code.to_string(),
            None => self.error.message.clone(),
        };
        match status {
            401 | 403 => RimayError::AuthFailed(format!("fcm rejected credentials: {message}")),
            _ => RimayError::Push { status, message },
        }
    }
}
