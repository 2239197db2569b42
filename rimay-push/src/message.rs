//! Notification payloads and their FCM HTTP v1 wire form.

use std::collections::BTreeMap;

use serde::Serialize;

/// A notification to deliver to one or more device tokens.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// Custom key/value pairs delivered to the app. FCM only accepts strings.
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: BTreeMap::new(),
        }
    }

    /// Builder-style data entry.
    pub fn with_data(mut self, key: &str, value: impl ToString) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }

    /// Request body for `messages:send` addressed to a single token.
    ///
    /// Android gets high priority with the default sound; APNs gets the
    /// default sound and a badge of 1.
    pub fn to_send_request<'a>(&'a self, token: &'a str) -> SendRequest<'a> {
        SendRequest {
            validate_only: false,
            message: WireMessage {
                token,
                notification: WireNotification {
                    title: &self.title,
                    body: &self.body,
                },
                data: &self.data,
                android: AndroidConfig {
                    priority: "high",
                    notification: AndroidNotification {
                        sound: "default",
                        notification_priority: "PRIORITY_HIGH",
                    },
                },
                apns: ApnsConfig {
                    payload: ApnsPayload {
                        aps: Aps {
                            sound: "default",
                            badge: 1,
                        },
                    },
                },
            },
        }
    }
}

/// Top-level `messages:send` body.
#[derive(Debug, Serialize)]
pub struct SendRequest<'a> {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub validate_only: bool,
    pub message: WireMessage<'a>,
}

#[derive(Debug, Serialize)]
pub struct WireMessage<'a> {
    pub token: &'a str,
    pub notification: WireNotification<'a>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: &'a BTreeMap<String, String>,
    pub android: AndroidConfig,
    pub apns: ApnsConfig,
}

#[derive(Debug, Serialize)]
pub struct WireNotification<'a> {
    pub title: &'a str,
    pub body: &'a str,
}

#[derive(Debug, Serialize)]
pub struct AndroidConfig {
    pub priority: &'static str,
    pub notification: AndroidNotification,
}

#[derive(Debug, Serialize)]
pub struct AndroidNotification {
    pub sound: &'static str,
    pub notification_priority: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ApnsConfig {
    pub payload: ApnsPayload,
}

#[derive(Debug, Serialize)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Serialize)]
pub struct Aps {
    pub sound: &'static str,
    pub badge: u32,
}
