//! # UI triggers
//!
//! Declarative "publish on UI event" bindings. A [`PublishTrigger`] names a
//! topic, the UI event that fires it (default `click`), optional static data
//! and optional options; [`TriggerRegistry`] maps element ids to triggers and
//! is fed raw UI events by the host.

use crate::bus::EventBus;
use crate::options::PartialPublishOptions;
use crate::topic::Topic;
use serde_json::Value;
use std::collections::HashMap;
use tracing::trace;

/// The UI event a trigger listens for unless told otherwise.
pub const DEFAULT_TRIGGER_EVENT: &str = "click";

/// Publishes a fixed event when a UI element raises a given event.
#[derive(Debug, Clone)]
pub struct PublishTrigger {
    topic: Topic<Value>,
    on: String,
    data: Option<Value>,
    options: PartialPublishOptions,
}

impl PublishTrigger {
    /// A trigger for `topic`, fired on `click` with no data and default options.
    #[must_use]
    pub fn new(topic: Topic<Value>) -> Self {
        Self {
            topic,
            on: DEFAULT_TRIGGER_EVENT.to_string(),
            data: None,
            options: PartialPublishOptions::default(),
        }
    }

    /// Fire on `event` instead of `click`.
    #[must_use]
    pub fn on(mut self, event: impl Into<String>) -> Self {
        self.on = event.into();
        self
    }

    /// Publish `data` with the event.
    #[must_use]
    pub fn with(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn options(mut self, options: impl Into<PartialPublishOptions>) -> Self {
        self.options = options.into();
        self
    }

    #[must_use]
    pub fn topic(&self) -> &Topic<Value> {
        &self.topic
    }

    #[must_use]
    pub fn event(&self) -> &str {
        &self.on
    }

    /// Publish if `event` is the one this trigger listens for.
    ///
    /// The declared data is always the payload, even when it looks like an
    /// options object. Returns whether anything was published.
    pub fn fire(&self, bus: &EventBus, event: &str) -> bool {
        if event != self.on {
            return false;
        }
        match &self.data {
            Some(data) => bus.publish_with(&self.topic, data, self.options),
            None => bus.publish_empty_with(&self.topic, self.options),
        }
        trace!(topic = %self.topic, event, "Trigger fired");
        true
    }
}

/// Element id → triggers.
#[derive(Debug, Default)]
pub struct TriggerRegistry {
    triggers: HashMap<String, Vec<PublishTrigger>>,
}

impl TriggerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `trigger` to `element`. An element may carry several triggers.
    pub fn register(&mut self, element: impl Into<String>, trigger: PublishTrigger) {
        self.triggers.entry(element.into()).or_default().push(trigger);
    }

    /// Detach every trigger of `element`. Returns how many were removed.
    pub fn unregister(&mut self, element: &str) -> usize {
        self.triggers.remove(element).map_or(0, |t| t.len())
    }

    /// Route a UI event raised by `element`. Returns how many triggers fired.
    pub fn dispatch(&self, bus: &EventBus, element: &str, event: &str) -> usize {
        self.triggers.get(element).map_or(0, |triggers| {
            triggers
                .iter()
                .filter(|trigger| trigger.fire(bus, event))
                .count()
        })
    }
}
