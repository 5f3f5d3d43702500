//! Structured logging setup.
//!
//! Log lines carry consistent fields so they can be grepped or shipped:
//! - `service`: full service name (service + context)
//! - `topic`: event topic key, where relevant
//! - `channel`: `live` or `historical`, where relevant
//! - Additional context fields

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::{TelemetryConfig, TelemetryError};

/// Handle returned by [`init_logging`]. Hold it for the lifetime of the application.
pub struct LoggingGuard {
    service_name: String,
}

impl LoggingGuard {
    /// The service name the subscriber was installed for.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Drop for LoggingGuard {
    fn drop(&mut self) {
        tracing::debug!(service = %self.service_name, "Logging guard dropped");
    }
}

/// Install the global `tracing` subscriber.
///
/// Fails with [`TelemetryError::LoggingInit`] when a global subscriber is already set,
/// so tests that call this repeatedly should ignore the error.
pub fn init_logging(config: &TelemetryConfig) -> Result<LoggingGuard, TelemetryError> {
    let env_filter = build_filter(config)?;

    let layer = if !config.console_output {
        None
    } else if config.json_logs {
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        )
    } else {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(true)
                .boxed(),
        )
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::info!(
        service = %config.full_service_name(),
        json_logs = config.json_logs,
        "Structured logging initialized"
    );

    Ok(LoggingGuard {
        service_name: config.full_service_name(),
    })
}

/// The filter for `config.log_level`. `RUST_LOG` is only a fallback, already
/// resolved by [`TelemetryConfig::from_lookup`].
fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.log_level).map_err(|e| TelemetryError::Config(e.to_string()))
}

/// Helper to create structured log entries tagged with a topic.
#[macro_export]
macro_rules! log_event {
    (info, $topic:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            topic = %$topic,
            $($($field)*,)?
            $msg
        )
    };

    (warn, $topic:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(
            topic = %$topic,
            $($($field)*,)?
            $msg
        )
    };

    (error, $topic:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(
            topic = %$topic,
            $($($field)*,)?
            $msg
        )
    };

    (debug, $topic:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(
            topic = %$topic,
            $($($field)*,)?
            $msg
        )
    };
}
