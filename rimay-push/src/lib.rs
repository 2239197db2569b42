//! Rimay Push - delivery of device notifications through Firebase Cloud Messaging.
//!
//! The HTTP v1 client handles bearer authentication, per-token sends, and
//! automatic retry with exponential backoff for transient failures. Callers
//! depend on the [`PushSender`] trait so tests can substitute a recorder.

pub mod client;
pub mod message;
pub mod response;
pub mod sender;

// Re-export key types
pub use client::{FcmClient, RetryConfig};
pub use message::PushMessage;
pub use response::{FcmErrorBody, SendResponse};
pub use sender::{DisabledSender, PushSender};
