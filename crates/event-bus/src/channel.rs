//! # Channels
//!
//! A [`ChannelHub`] is an observer-list broadcaster for one delivery lane.
//! The two lanes of a bus share one dispatcher, which decides when a hub
//! actually delivers.
//!
//! ## Rules
//! - **Snapshot iteration**: the subscriber list is copied before delivery, so
//!   callbacks may subscribe or unsubscribe freely.
//! - **Run to completion**: a bus runs one delivery at a time. A push made
//!   while a delivery is running (from a callback, or from another thread) is
//!   queued and run by the thread that owns the current dispatch, right after
//!   it. No lock is held while callbacks run, so callbacks that publish across
//!   lanes or across buses cannot deadlock.
//! - **Synchronous when idle**: a push on an idle bus returns after every
//!   subscriber registered at dispatch time has run, along with anything
//!   those callbacks queued.
//! - **Retained slot** (`historical` only): replaced before delivery and replayed
//!   to every new subscriber, `None` until the first push. Registration and
//!   replay go through the same dispatcher, so a new subscriber never sees an
//!   older value after a newer one.

use crate::envelope::Envelope;
use crate::options::Channel;
use crate::subscriber::Subscription;
use event_telemetry::{EVENTS_PUBLISHED, SUBSCRIBERS_ACTIVE};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, trace};

/// Identifier of one registration on a hub.
pub type SubscriberId = u64;

/// A subscriber callback. `None` is the empty sentinel replayed by a
/// `historical` hub that has never seen a push.
pub(crate) type Callback = Arc<dyn Fn(Option<&Envelope>) + Send + Sync>;

/// Where a pushed envelope came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// A `publish` call on this bus.
    Local,
    /// Re-injected by the broadcast bridge.
    Remote,
}

impl Origin {
    fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

struct Registry {
    next_id: SubscriberId,
    subscribers: Vec<(SubscriberId, Callback)>,
    /// Ids whose registration is queued behind a running dispatch.
    pending: HashSet<SubscriberId>,
    retained: Option<Envelope>,
}

/// One delivery lane.
pub struct ChannelHub {
    channel: Channel,
    registry: Mutex<Registry>,
    pushed: AtomicU64,
}

impl ChannelHub {
    pub(crate) fn new(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            registry: Mutex::new(Registry {
                next_id: 0,
                subscribers: Vec::new(),
                pending: HashSet::new(),
                retained: None,
            }),
            pushed: AtomicU64::new(0),
        })
    }

    /// The lane this hub implements.
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Deliver `envelope` to a snapshot of the current subscribers.
    ///
    /// Returns the number of subscribers the envelope was handed to.
    pub(crate) fn deliver(&self, envelope: Envelope) -> usize {
        let snapshot: Vec<Callback> = {
            let mut registry = self.registry.lock();
            if self.channel.retains() {
                registry.retained = Some(envelope.clone());
            }
            registry
                .subscribers
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect()
        };
        self.pushed.fetch_add(1, Ordering::Relaxed);

        for callback in &snapshot {
            callback(Some(&envelope));
        }
        snapshot.len()
    }

    pub(crate) fn next_id(&self) -> SubscriberId {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        id
    }

    /// Mark `id` as registered-but-queued; [`unsubscribe`](Self::unsubscribe)
    /// before the queued attach runs cancels it.
    pub(crate) fn defer(&self, id: SubscriberId) {
        self.registry.lock().pending.insert(id);
    }

    /// Register `callback` under `id` and, on a `historical` hub, hand it the
    /// retained envelope (or the empty sentinel).
    pub(crate) fn attach(&self, id: SubscriberId, callback: Callback, deferred: bool) {
        let replay = {
            let mut registry = self.registry.lock();
            if deferred && !registry.pending.remove(&id) {
                // Unsubscribed while queued.
                return;
            }
            registry.subscribers.push((id, Arc::clone(&callback)));
            self.channel.retains().then(|| registry.retained.clone())
        };
        SUBSCRIBERS_ACTIVE
            .with_label_values(&[self.channel.as_str()])
            .inc();
        trace!(channel = %self.channel, subscriber = id, "Subscriber registered");

        if let Some(retained) = replay {
            callback(retained.as_ref());
        }
    }

    /// Remove a registration. Does not touch the retained slot.
    pub(crate) fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut registry = self.registry.lock();
        if registry.pending.remove(&id) {
            return true;
        }
        let before = registry.subscribers.len();
        registry.subscribers.retain(|(sid, _)| *sid != id);
        let removed = registry.subscribers.len() != before;
        if removed {
            SUBSCRIBERS_ACTIVE
                .with_label_values(&[self.channel.as_str()])
                .dec();
            trace!(channel = %self.channel, subscriber = id, "Subscriber removed");
        }
        removed
    }

    pub(crate) fn is_registered(&self, id: SubscriberId) -> bool {
        let registry = self.registry.lock();
        registry.pending.contains(&id) || registry.subscribers.iter().any(|(sid, _)| *sid == id)
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    /// Snapshot of the retained slot. Always `None` on `live`.
    #[must_use]
    pub fn retained(&self) -> Option<Envelope> {
        self.registry.lock().retained.clone()
    }

    /// Total pushes this hub has dispatched.
    #[must_use]
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }
}

impl Drop for ChannelHub {
    fn drop(&mut self) {
        let remaining = self.registry.get_mut().subscribers.len();
        if remaining > 0 {
            SUBSCRIBERS_ACTIVE
                .with_label_values(&[self.channel.as_str()])
                .sub(remaining as i64);
        }
    }
}

enum Job {
    Deliver {
        hub: Arc<ChannelHub>,
        envelope: Envelope,
        origin: Origin,
    },
    Attach {
        hub: Arc<ChannelHub>,
        id: SubscriberId,
        callback: Callback,
    },
}

impl Job {
    fn run(self) {
        match self {
            Self::Deliver {
                hub,
                envelope,
                origin,
            } => {
                let key = envelope.key.clone();
                let channel = hub.channel();
                let receivers = hub.deliver(envelope);
                EVENTS_PUBLISHED
                    .with_label_values(&[channel.as_str(), origin.as_str()])
                    .inc();
                debug!(
                    topic = %key,
                    channel = %channel,
                    origin = origin.as_str(),
                    receivers,
                    "Event delivered"
                );
            }
            Self::Attach { hub, id, callback } => hub.attach(id, callback, true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Turn {
    /// The calling thread now owns the dispatch.
    Acquired,
    /// The calling thread already owns it (called from inside a callback).
    Reentrant,
    /// Another thread owns it.
    Busy,
}

/// Per-bus run-to-completion queue.
///
/// Whoever takes ownership runs queued jobs until the queue is empty; every
/// other caller enqueues and returns.
#[derive(Default)]
struct Dispatcher {
    queue: Mutex<VecDeque<Job>>,
    owner: Mutex<Option<ThreadId>>,
}

/// Gives up dispatch ownership, also when a callback unwinds.
struct Release<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

impl Dispatcher {
    fn turn(&self) -> Turn {
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        match *owner {
            None => {
                *owner = Some(me);
                Turn::Acquired
            }
            Some(id) if id == me => Turn::Reentrant,
            Some(_) => Turn::Busy,
        }
    }

    fn submit(&self, job: Job) {
        self.queue.lock().push_back(job);
        self.drain();
    }

    fn attach(&self, hub: &Arc<ChannelHub>, id: SubscriberId, callback: Callback) {
        match self.turn() {
            Turn::Reentrant => hub.attach(id, callback, false),
            Turn::Acquired => {
                {
                    let _release = Release(&self.owner);
                    hub.attach(id, callback, false);
                }
                self.drain();
            }
            Turn::Busy => {
                hub.defer(id);
                self.queue.lock().push_back(Job::Attach {
                    hub: Arc::clone(hub),
                    id,
                    callback,
                });
                self.drain();
            }
        }
    }

    fn drain(&self) {
        while self.turn() == Turn::Acquired {
            {
                let _release = Release(&self.owner);
                loop {
                    let next = self.queue.lock().pop_front();
                    let Some(job) = next else { break };
                    job.run();
                }
            }
            // A job queued between the last pop and the release has nobody
            // left to run it but us.
            if self.queue.lock().is_empty() {
                break;
            }
        }
    }
}

/// The pair of lanes owned by one bus, and their shared dispatcher.
#[derive(Clone)]
pub(crate) struct Hubs {
    live: Arc<ChannelHub>,
    historical: Arc<ChannelHub>,
    dispatcher: Arc<Dispatcher>,
}

impl Hubs {
    pub(crate) fn new() -> Self {
        Self {
            live: ChannelHub::new(Channel::Live),
            historical: ChannelHub::new(Channel::Historical),
            dispatcher: Arc::new(Dispatcher::default()),
        }
    }

    pub(crate) fn get(&self, channel: Channel) -> &Arc<ChannelHub> {
        match channel {
            Channel::Live => &self.live,
            Channel::Historical => &self.historical,
        }
    }

    /// The one path every envelope takes into a local lane, whatever its origin.
    pub(crate) fn push(&self, channel: Channel, envelope: Envelope, origin: Origin) {
        self.dispatcher.submit(Job::Deliver {
            hub: Arc::clone(self.get(channel)),
            envelope,
            origin,
        });
    }

    /// Register `callback` on `channel`.
    ///
    /// On an idle bus (or from inside a callback) registration and replay
    /// happen before this returns; otherwise they run right after the
    /// dispatch in progress.
    pub(crate) fn subscribe(&self, channel: Channel, callback: Callback) -> Subscription {
        let hub = self.get(channel);
        let id = hub.next_id();
        // Built before replay so a panicking callback still unregisters on unwind.
        let subscription = Subscription::new(Arc::downgrade(hub), id);
        self.dispatcher.attach(hub, id, callback);
        subscription
    }

    pub(crate) fn downgrade(&self) -> WeakHubs {
        WeakHubs {
            live: Arc::downgrade(&self.live),
            historical: Arc::downgrade(&self.historical),
            dispatcher: Arc::downgrade(&self.dispatcher),
        }
    }
}

/// Non-owning handle to a bus's lanes, held by the inbound bridge path.
#[derive(Clone)]
pub(crate) struct WeakHubs {
    live: Weak<ChannelHub>,
    historical: Weak<ChannelHub>,
    dispatcher: Weak<Dispatcher>,
}

impl WeakHubs {
    pub(crate) fn upgrade(&self) -> Option<Hubs> {
        Some(Hubs {
            live: self.live.upgrade()?,
            historical: self.historical.upgrade()?,
            dispatcher: self.dispatcher.upgrade()?,
        })
    }
}
