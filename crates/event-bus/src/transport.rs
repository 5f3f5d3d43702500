//! # Cross-context transport
//!
//! [`BroadcastTransport`] is the capability the bridge needs from its host:
//! post a frame to every other context in the same namespace, and be told
//! about frames posted by them.
//!
//! [`BroadcastHub`] is an in-memory implementation. Each context takes an
//! [`HubEndpoint`] for a namespace; a post reaches every other open endpoint of
//! that namespace and never the sender.
//!
//! ## Delivery
//! - **At most once**, in post order per receiving endpoint.
//! - **No self-interleaving**: an endpoint's handler never runs re-entrantly.
//!   Frames that arrive while the handler is running are queued and handled
//!   once it returns.
//! - Frames arriving at an endpoint with no handler are dropped.
//! - A handler that panics loses that frame only; the panic is logged and
//!   later frames are still handled.

use crate::error::{BusError, TransportError};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Called with each raw frame received from another context.
pub type FrameHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// A namespaced, sender-excluding broadcast capability.
pub trait BroadcastTransport: Send + Sync {
    /// The namespace this endpoint is scoped to.
    fn namespace(&self) -> &str;

    /// Send a frame to every other context in the namespace. Fire-and-forget.
    fn post(&self, frame: &str) -> Result<(), TransportError>;

    /// Install the inbound handler, replacing any previous one.
    fn on_message(&self, handler: FrameHandler);
}

/// Derive a transport namespace from a network origin.
///
/// The result is `scheme://host[:port]`, lower-cased; any path, query or
/// fragment is dropped.
///
/// ```
/// use event_bus::transport::namespace_for_origin;
///
/// let ns = namespace_for_origin("https://App.Example.com:8443/dashboard?tab=2").unwrap();
/// assert_eq!(ns, "https://app.example.com:8443");
/// ```
pub fn namespace_for_origin(origin: &str) -> Result<String, BusError> {
    let invalid = |reason: &str| BusError::InvalidOrigin {
        origin: origin.to_string(),
        reason: reason.to_string(),
    };

    let (scheme, rest) = origin
        .trim()
        .split_once("://")
        .ok_or_else(|| invalid("missing scheme"))?;

    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return Err(invalid("bad scheme"));
    }

    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    // Drop userinfo.
    let host = authority.rsplit('@').next().unwrap_or_default();
    if host.is_empty() || host.starts_with(':') {
        return Err(invalid("missing host"));
    }
    if let Some((_, port)) = host.rsplit_once(':').filter(|_| !host.ends_with(']')) {
        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("bad port"));
        }
    }

    Ok(format!(
        "{}://{}",
        scheme.to_ascii_lowercase(),
        host.to_ascii_lowercase()
    ))
}

struct EndpointSlot {
    id: Uuid,
    handler: RwLock<Option<FrameHandler>>,
    inbox: Mutex<VecDeque<Arc<str>>>,
    draining: AtomicBool,
    closed: AtomicBool,
}

impl EndpointSlot {
    fn enqueue(&self, frame: Arc<str>) {
        if !self.closed.load(Ordering::Acquire) {
            self.inbox.lock().push_back(frame);
        }
    }

    /// Run the handler over queued frames unless another call is already doing so.
    fn drain(&self) {
        // Whoever flips `draining` owns the inbox until it is empty.
        if self.draining.swap(true, Ordering::AcqRel) {
            return;
        }
        loop {
            let next = self.inbox.lock().pop_front();
            match next {
                Some(frame) => {
                    let handler = self.handler.read().clone();
                    match handler {
                        Some(handler) if !self.closed.load(Ordering::Acquire) => {
                            if panic::catch_unwind(AssertUnwindSafe(|| handler(&frame))).is_err() {
                                warn!(endpoint = %self.id, "Frame handler panicked; frame skipped");
                            }
                        }
                        _ => trace!(endpoint = %self.id, "Frame dropped (no handler)"),
                    }
                }
                None => {
                    self.draining.store(false, Ordering::Release);
                    if self.inbox.lock().is_empty() || self.draining.swap(true, Ordering::AcqRel) {
                        break;
                    }
                }
            }
        }
    }
}

#[derive(Default)]
struct HubInner {
    namespaces: RwLock<HashMap<String, Vec<Arc<EndpointSlot>>>>,
}

impl HubInner {
    fn detach(&self, namespace: &str, id: Uuid) {
        let mut namespaces = self.namespaces.write();
        if let Some(slots) = namespaces.get_mut(namespace) {
            slots.retain(|slot| slot.id != id);
            if slots.is_empty() {
                namespaces.remove(namespace);
            }
        }
    }
}

/// In-memory broadcast medium shared by several contexts.
///
/// Cheap to clone; clones share endpoints.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new endpoint (one per context) on `namespace`.
    #[must_use]
    pub fn endpoint(&self, namespace: impl Into<String>) -> HubEndpoint {
        let namespace = namespace.into();
        let slot = Arc::new(EndpointSlot {
            id: Uuid::new_v4(),
            handler: RwLock::new(None),
            inbox: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.inner
            .namespaces
            .write()
            .entry(namespace.clone())
            .or_default()
            .push(Arc::clone(&slot));
        debug!(namespace = %namespace, endpoint = %slot.id, "Endpoint opened");

        HubEndpoint {
            hub: Arc::downgrade(&self.inner),
            namespace,
            slot,
        }
    }

    /// Number of open endpoints on `namespace`.
    #[must_use]
    pub fn endpoint_count(&self, namespace: &str) -> usize {
        self.inner
            .namespaces
            .read()
            .get(namespace)
            .map_or(0, Vec::len)
    }
}

/// One context's attachment to a [`BroadcastHub`] namespace.
///
/// Closed on drop.
pub struct HubEndpoint {
    hub: Weak<HubInner>,
    namespace: String,
    slot: Arc<EndpointSlot>,
}

impl HubEndpoint {
    /// Unique identifier of this endpoint.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.slot.id
    }

    /// Detach from the hub. Later posts fail with [`TransportError::Closed`].
    pub fn close(&self) {
        if self.slot.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(hub) = self.hub.upgrade() {
            hub.detach(&self.namespace, self.slot.id);
        }
        debug!(namespace = %self.namespace, endpoint = %self.slot.id, "Endpoint closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slot.closed.load(Ordering::Acquire)
    }
}

impl BroadcastTransport for HubEndpoint {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn post(&self, frame: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let hub = self.hub.upgrade().ok_or(TransportError::Closed)?;

        let targets: Vec<Arc<EndpointSlot>> = hub
            .namespaces
            .read()
            .get(&self.namespace)
            .map(|slots| {
                slots
                    .iter()
                    .filter(|slot| slot.id != self.slot.id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Enqueue everywhere before handling anywhere, so a handler that posts
        // again cannot overtake this frame at another endpoint.
        let frame: Arc<str> = Arc::from(frame);
        for target in &targets {
            target.enqueue(Arc::clone(&frame));
        }
        for target in &targets {
            target.drain();
        }
        trace!(namespace = %self.namespace, targets = targets.len(), "Frame posted");
        Ok(())
    }

    fn on_message(&self, handler: FrameHandler) {
        *self.slot.handler.write() = Some(handler);
    }
}

impl Drop for HubEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}
