//! # Subscriptions
//!
//! [`Subscription`] is the caller-owned registration on a channel; dropping it
//! (or calling [`Subscription::unsubscribe`]) stops delivery.
//! [`Listener`] is the stream returned by `EventBus::listen`.

use crate::channel::{ChannelHub, SubscriberId};
use crate::options::Channel;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from non-blocking receive.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Nothing has been delivered since the last receive.
    #[error("No event available")]
    Empty,

    /// The event bus was dropped and nothing is buffered.
    #[error("Event bus closed")]
    Closed,
}

/// A registration on one channel.
///
/// When dropped, the subscription is automatically cleaned up.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    hub: Weak<ChannelHub>,
    id: SubscriberId,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(hub: Weak<ChannelHub>, id: SubscriberId) -> Self {
        Self {
            hub,
            id,
            active: true,
        }
    }

    /// Stop delivery to this subscriber.
    ///
    /// Takes effect before returning. A dispatch already running on another
    /// thread may still complete its delivery to this subscriber.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }

    /// Whether the subscription is still registered on a live bus.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
            && self
                .hub
                .upgrade()
                .is_some_and(|hub| hub.is_registered(self.id))
    }

    /// The channel this subscription listens on, if the bus is still alive.
    #[must_use]
    pub fn channel(&self) -> Option<Channel> {
        self.hub.upgrade().map(|hub| hub.channel())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

/// A stream of payloads for one topic on one channel.
///
/// Each item is the payload of a matching event; `None` is the empty
/// sentinel (an event published without data, or the initial state of a
/// `historical` channel that has never been published to).
///
/// Delivery is push-based: the bus writes into an unbounded buffer while
/// publishing, so items are available to [`Listener::try_recv`] as soon as
/// `publish` returns.
pub struct Listener<T> {
    receiver: mpsc::UnboundedReceiver<Option<T>>,
    subscription: Subscription,
    topic: String,
    channel: Channel,
}

impl<T> Listener<T> {
    pub(crate) fn new(
        receiver: mpsc::UnboundedReceiver<Option<T>>,
        subscription: Subscription,
        topic: String,
        channel: Channel,
    ) -> Self {
        Self {
            receiver,
            subscription,
            topic,
            channel,
        }
    }

    /// Receive the next payload.
    ///
    /// # Returns
    ///
    /// - `Some(payload)` - The next matching payload (`payload` may be the empty sentinel)
    /// - `None` - The listener was closed or the bus dropped, and the buffer is drained
    pub async fn recv(&mut self) -> Option<Option<T>> {
        self.receiver.recv().await
    }

    /// Take the next buffered payload without waiting.
    pub fn try_recv(&mut self) -> Result<Option<T>, SubscriptionError> {
        self.receiver.try_recv().map_err(|e| match e {
            mpsc::error::TryRecvError::Empty => SubscriptionError::Empty,
            mpsc::error::TryRecvError::Disconnected => SubscriptionError::Closed,
        })
    }

    /// Drain everything buffered so far.
    pub fn drain(&mut self) -> Vec<Option<T>> {
        let mut items = Vec::new();
        while let Ok(item) = self.receiver.try_recv() {
            items.push(item);
        }
        items
    }

    /// Stop further delivery. Already buffered payloads stay readable.
    pub fn close(&mut self) {
        self.subscription.unsubscribe();
        self.receiver.close();
        debug!(topic = %self.topic, channel = %self.channel, "Listener closed");
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }
}

impl<T> Stream for Listener<T> {
    type Item = Option<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl<T> std::fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("topic", &self.topic)
            .field("channel", &self.channel)
            .field("subscription", &self.subscription)
            .finish()
    }
}
