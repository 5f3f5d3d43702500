//! # Event Bus
//!
//! [`EventBus`] owns one `live` channel, one `historical` channel and one
//! broadcast bridge. Clones are handles to the same bus; separately
//! constructed buses share nothing.
//!
//! ## Publishing
//!
//! The typed entry points are unambiguous:
//!
//! | Call | Payload | Options |
//! |------|---------|---------|
//! | `publish(topic, &data)` | `data` | defaults |
//! | `publish_with(topic, &data, options)` | `data` | `options` over defaults |
//! | `publish_empty(topic)` | none | defaults |
//! | `publish_empty_with(topic, options)` | none | `options` over defaults |
//!
//! [`EventBus::publish_dynamic`] keeps the loosely typed call shape where the
//! second argument may be either payload or options (see [`resolve_call_shape`]).
//!
//! ## Example
//!
//! ```
//! use event_bus::{Channel, EventBus, PublishOptions, Topic};
//!
//! let clicks: Topic<u32> = Topic::new("counter.click");
//! let bus = EventBus::new();
//!
//! let mut live = bus.listen(&clicks, Channel::Live);
//! bus.publish(&clicks, &1);
//! assert_eq!(live.try_recv(), Ok(Some(1)));
//!
//! bus.publish_with(&clicks, &2, PublishOptions::historical());
//! let mut late = bus.listen(&clicks, Channel::Historical);
//! assert_eq!(late.try_recv(), Ok(Some(2)));
//! ```

use crate::bridge::{BridgeStats, BroadcastBridge};
use crate::channel::{Callback, Hubs, Origin};
use crate::config::BusConfig;
use crate::envelope::Envelope;
use crate::error::BusError;
use crate::options::{Channel, PartialPublishOptions};
use crate::subscriber::{Listener, Subscription};
use crate::topic::Topic;
use crate::transport::{BroadcastHub, BroadcastTransport};
use event_telemetry::log_event;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Counters for one bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Local `publish*` calls that reached a channel.
    pub published: u64,
    /// Local `publish*` calls dropped because the payload failed to serialize.
    pub dropped: u64,
    /// Bridge traffic.
    pub bridge: BridgeStats,
}

struct BusInner {
    id: Uuid,
    config: BusConfig,
    hubs: Hubs,
    bridge: BroadcastBridge,
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Typed publish/subscribe event bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// A bus with default configuration and no cross-context transport.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// A bus with no cross-context transport.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        Self::build(config, |_| BroadcastBridge::detached())
    }

    /// A bus whose bridge posts to, and re-injects from, `transport`.
    #[must_use]
    pub fn with_transport(config: BusConfig, transport: Arc<dyn BroadcastTransport>) -> Self {
        Self::build(config, |hubs| BroadcastBridge::attach(transport, hubs.downgrade()))
    }

    /// A bus attached to a fresh endpoint of `hub`, on the namespace derived from `config`.
    pub fn connect(config: BusConfig, hub: &BroadcastHub) -> Result<Self, BusError> {
        config.validate()?;
        let endpoint = hub.endpoint(config.namespace()?);
        Ok(Self::with_transport(config, Arc::new(endpoint)))
    }

    fn build(config: BusConfig, bridge: impl FnOnce(&Hubs) -> BroadcastBridge) -> Self {
        let hubs = Hubs::new();
        let bridge = bridge(&hubs);
        let id = Uuid::new_v4();
        debug!(
            bus = %id,
            namespace = bridge.namespace().unwrap_or("-"),
            "Event bus created"
        );
        Self {
            inner: Arc::new(BusInner {
                id,
                config,
                hubs,
                bridge,
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    // =========================================================================
    // PUBLISH
    // =========================================================================

    /// Publish `data` with default options.
    pub fn publish<T: Serialize>(&self, topic: &Topic<T>, data: &T) {
        self.publish_with(topic, data, PartialPublishOptions::default());
    }

    /// Publish `data` with `options` merged over the defaults.
    pub fn publish_with<T: Serialize>(
        &self,
        topic: &Topic<T>,
        data: &T,
        options: impl Into<PartialPublishOptions>,
    ) {
        match serde_json::to_value(data) {
            Ok(value) => self.dispatch(topic.key(), Some(value), options.into()),
            Err(e) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                log_event!(error, topic, "Payload failed to serialize; event dropped", error = %e);
            }
        }
    }

    /// Publish without a payload, with default options.
    pub fn publish_empty<T>(&self, topic: &Topic<T>) {
        self.publish_empty_with(topic, PartialPublishOptions::default());
    }

    /// Publish without a payload, with `options` merged over the defaults.
    pub fn publish_empty_with<T>(&self, topic: &Topic<T>, options: impl Into<PartialPublishOptions>) {
        self.dispatch(topic.key(), None, options.into());
    }

    /// Publish with the loosely typed call shape.
    ///
    /// `second` may be the payload or an options object; `third`, when given,
    /// is always the options object. See [`resolve_call_shape`] for the rule,
    /// including the case where a payload is mistaken for options.
    pub fn publish_dynamic<T>(&self, topic: &Topic<T>, second: Option<Value>, third: Option<Value>) {
        let (data, options) = resolve_call_shape(topic.key(), second, third);
        self.dispatch(topic.key(), data, options);
    }

    fn dispatch(&self, key: &str, data: Option<Value>, options: PartialPublishOptions) {
        let options = options.merge_over(self.inner.config.default_options);
        let envelope = Envelope::new(key, data);
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        if options.broadcast {
            self.inner
                .hubs
                .push(options.channel, envelope.clone(), Origin::Local);
            self.inner.bridge.send(&envelope, options.channel);
        } else {
            self.inner.hubs.push(options.channel, envelope, Origin::Local);
        }
    }

    // =========================================================================
    // SUBSCRIBE
    // =========================================================================

    /// Stream the payloads of `topic` on `channel`.
    ///
    /// On `Historical` the first item is the channel's retained event when it
    /// belongs to `topic`, or the empty sentinel (`None`) when nothing was ever
    /// published on the channel. It is available immediately unless another
    /// thread is dispatching on this bus, in which case it follows that
    /// dispatch.
    #[must_use]
    pub fn listen<T>(&self, topic: &Topic<T>, channel: Channel) -> Listener<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(topic, channel, move |payload: Option<T>| {
            // Receiver gone means the listener is closing; nothing to do.
            let _ = tx.send(payload);
        });
        Listener::new(rx, subscription, topic.key().to_string(), channel)
    }

    /// Call `handler` with every payload of `topic` on `channel`, synchronously
    /// from inside `publish`.
    ///
    /// A handler may publish again. That publish is queued and delivered once
    /// the current event has reached every subscriber.
    pub fn subscribe<T, F>(&self, topic: &Topic<T>, channel: Channel, handler: F) -> Subscription
    where
        T: DeserializeOwned + 'static,
        F: Fn(Option<T>) + Send + Sync + 'static,
    {
        let callback = topic_callback(topic.key().to_string(), channel, handler);
        self.inner.hubs.subscribe(channel, callback)
    }

    /// Keep a field of `target` equal to the latest payload of `topic`.
    ///
    /// The bus never releases the binding on its own: the caller owns the
    /// returned subscription and must keep it alive for as long as the field
    /// should follow the topic.
    ///
    /// # Example
    ///
    /// ```
    /// use event_bus::{Channel, EventBus, Topic};
    /// use parking_lot::Mutex;
    /// use std::sync::Arc;
    ///
    /// #[derive(Default)]
    /// struct Header { user: Option<String> }
    ///
    /// let login: Topic<String> = Topic::new("user.login");
    /// let bus = EventBus::new();
    /// let header = Arc::new(Mutex::new(Header::default()));
    ///
    /// let _binding = bus.bind(&header, |h: &mut Header| &mut h.user, &login, Channel::Live);
    /// bus.publish(&login, &"ada".to_string());
    /// assert_eq!(header.lock().user.as_deref(), Some("ada"));
    /// ```
    pub fn bind<S, T, F>(
        &self,
        target: &Arc<Mutex<S>>,
        property: F,
        topic: &Topic<T>,
        channel: Channel,
    ) -> Subscription
    where
        S: Send + 'static,
        T: DeserializeOwned + Send + 'static,
        F: Fn(&mut S) -> &mut Option<T> + Send + Sync + 'static,
    {
        let target = Arc::clone(target);
        self.subscribe(topic, channel, move |payload: Option<T>| {
            let mut guard = target.lock();
            *property(&mut *guard) = payload;
        })
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    /// Unique identifier of this bus.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// The broadcast namespace, if a transport is attached.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.inner.bridge.namespace()
    }

    /// Number of active subscribers on `channel`, across all topics.
    #[must_use]
    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.inner.hubs.get(channel).subscriber_count()
    }

    /// The retained envelope of `channel` (always `None` for `Live`).
    #[must_use]
    pub fn retained(&self, channel: Channel) -> Option<Envelope> {
        self.inner.hubs.get(channel).retained()
    }

    #[must_use]
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.inner.published.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            bridge: self.inner.bridge.stats(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("id", &self.inner.id)
            .field("namespace", &self.namespace())
            .finish()
    }
}

/// Split the loosely typed `(second, third)` publish arguments into payload and options.
///
/// 1. If `third` is given, `second` is the payload (JSON `null` meaning none)
///    and `third` the options.
/// 2. Otherwise, if `second` is a JSON object whose keys all belong to
///    [`OPTION_KEYS`](crate::options::OPTION_KEYS) (including `{}`), it is the
///    options object and there is no payload.
/// 3. Otherwise `second` is the payload.
///
/// A payload object such as `{"channel": "x"}` passed without a third
/// argument therefore reads as options and its data is lost. That ambiguity
/// is inherent to this call shape; the typed `publish*` methods do not have it.
///
/// Options objects that do not parse (unknown channel, wrong types) fall back
/// to the defaults with a warning.
#[must_use]
pub fn resolve_call_shape(
    key: &str,
    second: Option<Value>,
    third: Option<Value>,
) -> (Option<Value>, PartialPublishOptions) {
    match (second, third) {
        (data, Some(options)) => (data, parse_options(key, options)),
        (Some(second), None) if PartialPublishOptions::looks_like_options(&second) => {
            (None, parse_options(key, second))
        }
        (data, None) => (data, PartialPublishOptions::default()),
    }
}

fn parse_options(key: &str, value: Value) -> PartialPublishOptions {
    if value.is_null() {
        return PartialPublishOptions::default();
    }
    match serde_json::from_value(value) {
        Ok(options) => options,
        Err(e) => {
            warn!(topic = %key, error = %e, "Invalid publish options ignored");
            PartialPublishOptions::default()
        }
    }
}

/// Wrap a typed handler into a channel callback that filters on `key`.
fn topic_callback<T, F>(key: String, channel: Channel, handler: F) -> Callback
where
    T: DeserializeOwned + 'static,
    F: Fn(Option<T>) + Send + Sync + 'static,
{
    Arc::new(move |envelope: Option<&Envelope>| {
        let data = match envelope {
            // Empty sentinel of a never-published historical channel.
            None => None,
            Some(envelope) if envelope.key != key => return,
            Some(envelope) => envelope.data.as_ref(),
        };
        match data.map(T::deserialize).transpose() {
            Ok(payload) => handler(payload),
            Err(e) => warn!(
                topic = %key,
                channel = %channel,
                error = %e,
                "Payload does not match topic type; skipped"
            ),
        }
    })
}
