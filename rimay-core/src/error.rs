//! Global error types for the Rimay application.
//!
//! All error categories across the application are unified into a single
//! `RimayError` enum with conversions from underlying library errors.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Convenience type alias for Results using RimayError.
pub type RimayResult<T> = Result<T, RimayError>;

/// Unified error type covering all error categories in Rimay.
#[derive(Error, Debug)]
pub enum RimayError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Database errors --
    /// SQLite database error.
    #[error("database error: {0}")]
    Database(String),

    /// A uniqueness or foreign key constraint rejected a write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// Database connection pool error.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// Database integrity check failed.
    #[error("database integrity check failed: {0}")]
    IntegrityCheck(String),

    // -- Request errors --
    /// Input failed validation. Carries per-field messages.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// A requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Authentication failed or is missing.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The authenticated user lacks the required permission.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    // -- Push errors --
    /// HTTP request to the push provider failed.
    #[error("http error: {0}")]
    Http(String),

    /// Push provider returned an error response.
    #[error("push error (status {status}): {message}")]
    Push {
        /// HTTP status code.
        status: u16,
        /// Error message from the provider.
        message: String,
    },

    /// The device token is no longer registered with the push provider.
    #[error("push token unregistered: {0}")]
    Unregistered(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Service errors --
    /// A service failed to initialize.
    #[error("service init error: {0}")]
    ServiceInit(String),

    /// A service operation failed.
    #[error("service error: {0}")]
    Service(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RimayError {
    /// Build a validation error for a single field.
    pub fn field(name: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(name, message);
        RimayError::Validation(errors)
    }

    /// Whether this error was caused by bad client input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RimayError::Validation(_)
                | RimayError::Conflict(_)
                | RimayError::NotFound(_)
                | RimayError::AuthFailed(_)
                | RimayError::PermissionDenied(_)
        )
    }
}

impl From<serde_json::Error> for RimayError {
    fn from(e: serde_json::Error) -> Self {
        RimayError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RimayError {
    fn from(e: toml::de::Error) -> Self {
        RimayError::Config(e.to_string())
    }
}

/// Field name to list of messages, in stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message against a field.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Messages recorded for a field (empty if none).
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// First message of the first field, for single-line error bodies.
    pub fn first_message(&self) -> Option<&str> {
        self.0.values().flat_map(|v| v.iter()).next().map(|m| m.as_str())
    }

    /// Convert into a Result: Ok when nothing was recorded.
    pub fn into_result(self) -> RimayResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(RimayError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, msgs)| format!("{field}: {}", msgs.join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rimay_error_display() {
        let err = RimayError::Config("bad value".to_string());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn test_field_errors_collect() {
        let mut errors = FieldErrors::new();
        errors.add("email", "Introduzca una dirección de correo válida.");
        errors.add("email", "Este campo es obligatorio.");
        errors.add("dni", "Este campo es obligatorio.");
        assert_eq!(errors.get("email").len(), 2);
        assert!(errors.contains("dni"));
        assert_eq!(errors.first_message(), Some("Este campo es obligatorio."));
        assert!(errors.clone().into_result().is_err());
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_field_errors_serialize_as_map() {
        let err = RimayError::field("latitude", "required");
        match err {
            RimayError::Validation(errors) => {
                let json = serde_json::to_value(&errors).unwrap();
                assert_eq!(json["latitude"][0], "required");
            }
            _ => panic!("expected validation error"),
        }
    }

    #[test]
    fn test_client_error_classification() {
        assert!(RimayError::NotFound("x".into()).is_client_error());
        assert!(!RimayError::Database("x".into()).is_client_error());
    }
}
