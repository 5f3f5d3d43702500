//! # Broadcast Bridge
//!
//! Connects a bus's local channels to a [`BroadcastTransport`].
//!
//! ```text
//!  context A                                   context B
//! ┌──────────────┐   post(frame)   ┌──────────────┐
//! │ EventBus     │ ─────────────►  │ Transport    │ ──► on_message ──► Hubs::push ──► subscribers
//! │  └─ Bridge   │                 │ (namespace)  │      (no re-send)
//! └──────────────┘                 └──────────────┘
//! ```
//!
//! Inbound frames go through the same `Hubs::push` path a local publish uses,
//! so subscribers cannot tell them apart. They are never posted again.

use crate::channel::{Origin, WeakHubs};
use crate::envelope::{Envelope, WireMessage};
use crate::error::TransportError;
use crate::options::Channel;
use crate::transport::BroadcastTransport;
use event_telemetry::{BRIDGE_FRAMES_RECEIVED, BRIDGE_FRAMES_SENT};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
struct BridgeCounters {
    sent: AtomicU64,
    failed: AtomicU64,
    received: AtomicU64,
    malformed: AtomicU64,
}

/// Snapshot of bridge traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Frames handed to the transport successfully.
    pub sent: u64,
    /// Frames that could not be encoded or were refused by the transport.
    pub failed: u64,
    /// Inbound frames re-injected into a local channel.
    pub received: u64,
    /// Inbound frames dropped because they could not be decoded.
    pub malformed: u64,
}

/// Adapter between local channels and the cross-context transport.
pub struct BroadcastBridge {
    transport: Option<Arc<dyn BroadcastTransport>>,
    counters: Arc<BridgeCounters>,
}

impl BroadcastBridge {
    /// A bridge with no transport: outbound sends are dropped silently.
    pub(crate) fn detached() -> Self {
        Self {
            transport: None,
            counters: Arc::new(BridgeCounters::default()),
        }
    }

    /// Attach to `transport` and start re-injecting its frames into `hubs`.
    pub(crate) fn attach(transport: Arc<dyn BroadcastTransport>, hubs: WeakHubs) -> Self {
        let counters = Arc::new(BridgeCounters::default());
        let inbound = Arc::clone(&counters);
        let namespace = transport.namespace().to_string();

        transport.on_message(Arc::new(move |frame: &str| {
            receive(&hubs, &inbound, &namespace, frame);
        }));
        debug!(namespace = %transport.namespace(), "Broadcast bridge attached");

        Self {
            transport: Some(transport),
            counters,
        }
    }

    /// Whether a transport is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.transport.is_some()
    }

    /// The namespace of the attached transport.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.transport.as_deref().map(|t| t.namespace())
    }

    /// Post `envelope` to other contexts. Fire-and-forget: failures are logged
    /// and counted, never returned.
    pub(crate) fn send(&self, envelope: &Envelope, channel: Channel) {
        let Some(transport) = &self.transport else {
            return;
        };

        let result = WireMessage::new(envelope, channel)
            .encode()
            .map_err(TransportError::from)
            .and_then(|frame| transport.post(&frame));

        match result {
            Ok(()) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                BRIDGE_FRAMES_SENT.with_label_values(&["sent"]).inc();
                debug!(
                    topic = %envelope.key,
                    channel = %channel,
                    namespace = %transport.namespace(),
                    "Event broadcast"
                );
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                BRIDGE_FRAMES_SENT.with_label_values(&["failed"]).inc();
                warn!(
                    topic = %envelope.key,
                    channel = %channel,
                    error = %e,
                    "Event broadcast failed"
                );
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            received: self.counters.received.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
        }
    }
}

fn receive(hubs: &WeakHubs, counters: &BridgeCounters, namespace: &str, frame: &str) {
    let message = match WireMessage::decode(frame) {
        Ok(message) => message,
        Err(e) => {
            counters.malformed.fetch_add(1, Ordering::Relaxed);
            BRIDGE_FRAMES_RECEIVED.with_label_values(&["malformed"]).inc();
            warn!(namespace = %namespace, error = %e, "Malformed broadcast frame dropped");
            return;
        }
    };

    // The bus may already be gone; nothing left to deliver to.
    let Some(hubs) = hubs.upgrade() else {
        return;
    };

    counters.received.fetch_add(1, Ordering::Relaxed);
    BRIDGE_FRAMES_RECEIVED.with_label_values(&["accepted"]).inc();

    let (envelope, channel) = message.into_parts();
    hubs.push(channel, envelope, Origin::Remote);
}
