//! Prometheus metrics for the event bus.
//!
//! Names follow `event_bus_<area>_<metric>[_total]`. The collectors exist from
//! first use; they only show up in [`encode_metrics`] once
//! [`register_metrics`] has run.

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Registry every bus collector is registered with.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Pushes onto a local channel, by `channel` and `origin` (`local`/`remote`).
    pub static ref EVENTS_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("event_bus_events_published_total", "Events pushed onto a local channel"),
        &["channel", "origin"]
    ).expect("static metric definition");

    /// Registered subscribers, by `channel`, summed over all buses in the process.
    pub static ref SUBSCRIBERS_ACTIVE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("event_bus_subscribers_active", "Subscribers currently registered on a channel"),
        &["channel"]
    ).expect("static metric definition");

    /// Outbound frames, by `outcome` (`sent`/`failed`).
    pub static ref BRIDGE_FRAMES_SENT: CounterVec = CounterVec::new(
        Opts::new("event_bus_bridge_frames_sent_total", "Frames posted to the broadcast transport"),
        &["outcome"]
    ).expect("static metric definition");

    /// Inbound frames, by `outcome` (`accepted`/`malformed`).
    pub static ref BRIDGE_FRAMES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("event_bus_bridge_frames_received_total", "Frames received from the broadcast transport"),
        &["outcome"]
    ).expect("static metric definition");
}

/// Proof that the bus collectors are in [`REGISTRY`].
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    newly_registered: usize,
}

impl MetricsHandle {
    /// How many collectors this call added (0 when another call got there first).
    pub fn newly_registered(&self) -> usize {
        self.newly_registered
    }

    /// Render the registry in the Prometheus text format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        encode_metrics()
    }
}

/// Register the bus collectors with [`REGISTRY`].
///
/// Safe to call more than once: collectors that are already registered are
/// skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let collectors: [Box<dyn prometheus::core::Collector>; 4] = [
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(SUBSCRIBERS_ACTIVE.clone()),
        Box::new(BRIDGE_FRAMES_SENT.clone()),
        Box::new(BRIDGE_FRAMES_RECEIVED.clone()),
    ];

    let mut newly_registered = 0;
    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) => newly_registered += 1,
            Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { newly_registered })
}

/// Render [`REGISTRY`] in the Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
