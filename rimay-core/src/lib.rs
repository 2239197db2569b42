//! Rimay Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by all other Rimay crates:
//! - Application configuration (bind address, database, push credentials, media)
//! - Global error types covering all error categories
//! - Structured logging with tracing
//! - Platform data directories
//! - Common constants and timestamp helpers

pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod constants;
pub mod time;

// Re-export commonly used items at the crate root
pub use config::{AppConfig, ConfigHandle};
pub use error::{RimayError, RimayResult, FieldErrors};
pub use logging::init_logging;
pub use platform::Platform;
