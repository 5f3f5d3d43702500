//! # Event Bus - Typed Publish/Subscribe with Cross-Context Broadcast
//!
//! Producers and consumers exchange named, typed events without holding
//! references to each other.
//!
//! ```text
//!                     ┌────────────────────── EventBus ──────────────────────┐
//!  publish(topic, d) ─┼─► live ────────► subscribers active at publish time  │
//!                     │   historical ──► subscribers + replay of last event  │
//!                     │        │                                             │
//!                     │        └──► BroadcastBridge ──► transport (namespace)┼──► other contexts
//!                     │                  ▲                                   │
//!                     │                  └──── inbound frames (no re-send) ◄─┼─── other contexts
//!                     └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Channels
//!
//! - **live**: delivery only to subscribers registered when the event is published.
//! - **historical**: additionally remembers the last event of the channel and
//!   hands it to every new subscriber immediately (the empty sentinel if
//!   nothing was published yet).
//!
//! ## Cross-context broadcast
//!
//! With a transport attached, every publish with `broadcast: true` is posted
//! as `{"key", "data", "channel"}` to the other contexts sharing the
//! namespace. Received frames are pushed onto the matching local channel
//! exactly like a local publish and are never re-posted.
//!
//! ## Usage Example
//!
//! ```
//! use event_bus::{BroadcastHub, BusConfig, Channel, EventBus, Topic};
//!
//! let hub = BroadcastHub::new();
//! let tab_a = EventBus::connect(BusConfig::default(), &hub).unwrap();
//! let tab_b = EventBus::connect(BusConfig::default(), &hub).unwrap();
//!
//! let cart: Topic<u32> = Topic::new("cart.items");
//! let mut in_b = tab_b.listen(&cart, Channel::Live);
//!
//! tab_a.publish(&cart, &3);
//! assert_eq!(in_b.try_recv(), Ok(Some(3)));
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bridge;
pub mod bus;
pub mod channel;
pub mod config;
pub mod envelope;
pub mod error;
pub mod options;
pub mod subscriber;
pub mod topic;
pub mod transport;
pub mod trigger;

// Re-export main types
pub use bridge::{BridgeStats, BroadcastBridge};
pub use bus::{resolve_call_shape, BusStats, EventBus};
pub use channel::{ChannelHub, SubscriberId};
pub use config::{BusConfig, BusConfigBuilder};
pub use envelope::{Envelope, WireMessage};
pub use error::{BusError, TransportError};
pub use options::{
    Channel, PartialPublishOptions, PublishOptions, DEFAULT_PUBLISH_OPTIONS, OPTION_KEYS,
};
pub use subscriber::{Listener, Subscription, SubscriptionError};
pub use topic::Topic;
pub use transport::{
    namespace_for_origin, BroadcastHub, BroadcastTransport, FrameHandler, HubEndpoint,
};
pub use trigger::{PublishTrigger, TriggerRegistry, DEFAULT_TRIGGER_EVENT};
