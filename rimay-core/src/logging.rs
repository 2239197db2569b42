//! Structured logging setup using the `tracing` ecosystem.
//!
//! Provides daily file rotation, configurable filter directives, and both
//! human-readable and JSON output formats.

use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::rolling;

use crate::error::RimayResult;

/// Initialize the global tracing subscriber with the given settings.
///
/// Sets up:
/// - Console output (stderr)
/// - File output with daily rotation
/// - Filtering via the `level` parameter, which accepts either a bare level
///   ("info") or a full directive ("rimay_server=debug,tower_http=info")
///
/// # Arguments
/// * `level` - Log level or filter directive
/// * `log_dir` - Directory for log files
/// * `json_output` - If true, use JSON format for file output
pub fn init_logging(level: &str, log_dir: &Path, json_output: bool) -> RimayResult<LogGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, "rimay.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    if json_output {
        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter(level))
            .with(console_layer)
            .with(file_layer)
            .init();
    } else {
        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter(level))
            .with(console_layer)
            .with(file_layer)
            .init();
    }

    tracing::info!("logging initialized at level={level}, dir={}", log_dir.display());

    Ok(LogGuard { _guard: guard })
}

/// `RUST_LOG` wins over the configured level when set.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Guard that keeps the non-blocking log writer alive.
/// Drop this to flush and close the log file.
pub struct LogGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Initialize a minimal console-only logger for tests and one-shot CLI commands.
pub fn init_console_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact(),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_logging_does_not_panic() {
        // Subsequent calls are no-ops.
        init_console_logging("debug");
        init_console_logging("not a directive [");
    }

    #[test]
    fn test_invalid_directive_falls_back() {
        let filter = env_filter("[[[");
        assert!(!filter.to_string().is_empty());
    }
}
