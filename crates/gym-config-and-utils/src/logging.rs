//! Logging initialization for the gym client.
//!
//! Events go to `~/.gymapp/logs/client.jsonl` as JSON lines through the
//! observability package.

use crate::Paths;

/// Initialize logging for `service_name`.
///
/// `RUST_LOG` takes precedence over `level`. With `also_stderr` the same
/// events are echoed to stderr in compact form.
pub fn init_logging(service_name: &str, level: &str, paths: &Paths, also_stderr: bool) {
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).as_str().to_ascii_lowercase(),
        log_path: Some(paths.client_log_file()),
        also_stderr,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
