//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to the console and, when
//! a log directory is writable, to a JSON file per process.
//!
//! Library code only emits `tracing` events; installing a subscriber is left to
//! the embedding application, which may call [`init_structured_logging`].

use crate::config::ConfigLoader;
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
/// `RUST_LOG` overrides the environment's default level when set.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(build_filter(&log_level));

        let log_dir = PathBuf::from("log");
        let pid = process::id();
        let log_filename = format!(
            "{}.{}.{}.log",
            environment,
            pid,
            Utc::now().format("%Y%m%d_%H%M%S")
        );

        match fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
                let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

                let file_layer = fmt::layer()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(build_filter(&log_level));

                if tracing_subscriber::registry()
                    .with(console_layer)
                    .with(file_layer)
                    .try_init()
                    .is_err()
                {
                    tracing::debug!(
                        "Global tracing subscriber already initialized - continuing with existing subscriber"
                    );
                }

                tracing::info!(
                    pid = pid,
                    environment = %environment,
                    log_file = %log_dir.join(&log_filename).display(),
                    "🔧 STRUCTURED LOGGING: Initialized with file output"
                );

                // Flushing worker must outlive every caller
                std::mem::forget(guard);
            }
            Err(e) => {
                if tracing_subscriber::registry()
                    .with(console_layer)
                    .try_init()
                    .is_err()
                {
                    tracing::debug!(
                        "Global tracing subscriber already initialized - continuing with existing subscriber"
                    );
                }

                tracing::warn!(
                    pid = pid,
                    environment = %environment,
                    error = %e,
                    "🔧 STRUCTURED LOGGING: Log directory unavailable, console output only"
                );
            }
        }
    });
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    ConfigLoader::detect_environment()
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for repository operations
pub fn log_repository_operation(
    operation: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    source: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        entity_type = %entity_type,
        entity_id = entity_id,
        source = %source,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📦 REPOSITORY_OPERATION"
    );
}

/// Log structured data for offline sync passes
pub fn log_sync_operation(
    entity_type: &str,
    applied: usize,
    remaining: usize,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        entity_type = %entity_type,
        applied = applied,
        remaining = remaining,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔄 SYNC_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
