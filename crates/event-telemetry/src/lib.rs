//! # Event Telemetry
//!
//! Structured logging and Prometheus counters shared by every crate of the
//! event bus workspace.
//!
//! ```text
//! TelemetryConfig ──► init_telemetry ─┬─► init_logging    (tracing-subscriber registry)
//!                                     └─► register_metrics (prometheus REGISTRY)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use event_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _telemetry = init_telemetry(TelemetryConfig::for_context("tab-1"))?;
//! // ... build buses; their log lines and counters now go somewhere
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `EVENT_BUS_SERVICE_NAME` | `event-bus` | Service name in logs |
//! | `EVENT_BUS_CONTEXT_ID` | `main` | Context identifier appended to the service name |
//! | `EVENT_BUS_LOG_LEVEL` | `info` | `EnvFilter` directive (`RUST_LOG` is used when unset) |
//! | `EVENT_BUS_CONSOLE_OUTPUT` | `true` | Install the console layer |
//! | `EVENT_BUS_JSON_LOGS` | `false` | JSON lines (defaults on inside containers) |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, LoggingGuard};
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, BRIDGE_FRAMES_RECEIVED, BRIDGE_FRAMES_SENT,
    EVENTS_PUBLISHED, SUBSCRIBERS_ACTIVE,
};

use thiserror::Error;

/// Errors raised while installing telemetry.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register the bus metrics, then install the global log subscriber.
///
/// Metrics registration is idempotent; logging can be installed once per
/// process and fails with [`TelemetryError::LoggingInit`] afterwards.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    let logging = init_logging(&config)?;
    Ok(TelemetryGuard { logging, metrics })
}

/// Keeps telemetry installed. Hold it for the lifetime of the application.
pub struct TelemetryGuard {
    logging: LoggingGuard,
    metrics: MetricsHandle,
}

impl TelemetryGuard {
    pub fn service_name(&self) -> &str {
        self.logging.service_name()
    }

    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.logging.service_name(), "Telemetry shut down");
    }
}
