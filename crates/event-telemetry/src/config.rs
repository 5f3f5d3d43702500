//! Telemetry configuration.
//!
//! Read from `EVENT_BUS_*` variables by [`TelemetryConfig::from_env`]; the
//! parsing itself lives in [`TelemetryConfig::from_lookup`] so it can be fed
//! from anything that maps names to values.

use std::env;

const DEFAULT_SERVICE: &str = "event-bus";
const DEFAULT_CONTEXT: &str = "main";
const DEFAULT_LEVEL: &str = "info";

/// Configuration for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Context identifier (tab, window, worker) when several share a process
    pub context_id: String,

    /// `EnvFilter` directive, e.g. `info` or `event_bus=debug`
    pub log_level: String,

    /// Install a console layer at all
    pub console_output: bool,

    /// JSON lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE.to_string(),
            context_id: DEFAULT_CONTEXT.to_string(),
            log_level: DEFAULT_LEVEL.to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `EVENT_BUS_SERVICE_NAME`: Service name (default: event-bus)
    /// - `EVENT_BUS_CONTEXT_ID`: Context ID (default: main)
    /// - `EVENT_BUS_LOG_LEVEL` or `RUST_LOG`: Filter directive (default: info)
    /// - `EVENT_BUS_CONSOLE_OUTPUT`: Console layer on/off (default: true)
    /// - `EVENT_BUS_JSON_LOGS`: JSON output (default: true inside a container)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from `lookup`, which returns the value of a
    /// variable or `None` when unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let in_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();

        Self {
            service_name: lookup("EVENT_BUS_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE.to_string()),
            context_id: lookup("EVENT_BUS_CONTEXT_ID")
                .unwrap_or_else(|| DEFAULT_CONTEXT.to_string()),
            log_level: lookup("EVENT_BUS_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
            console_output: lookup("EVENT_BUS_CONSOLE_OUTPUT")
                .map_or(true, |v| !is_falsy(&v)),
            json_logs: lookup("EVENT_BUS_JSON_LOGS").map_or(in_container, |v| is_truthy(&v)),
        }
    }

    /// Environment configuration for a named context (tab, window, worker).
    pub fn for_context(context_id: &str) -> Self {
        Self {
            context_id: context_id.to_string(),
            ..Self::from_env()
        }
    }

    /// `service` for the main context, `service-context` otherwise.
    pub fn full_service_name(&self) -> String {
        if self.context_id == DEFAULT_CONTEXT {
            self.service_name.clone()
        } else {
            format!("{}-{}", self.service_name, self.context_id)
        }
    }
}

fn is_truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn is_falsy(value: &str) -> bool {
    value.eq_ignore_ascii_case("false") || value == "0"
}
