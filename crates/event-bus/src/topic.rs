//! # Topic Identity
//!
//! A [`Topic`] names an event type and fixes the type of its payload.
//! Routing compares keys only: two topics built independently from the same
//! key are the same logical topic.

use crate::error::BusError;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A typed event identity.
///
/// The type parameter only documents (and enforces at call sites) the payload
/// carried with the event; it does not take part in equality.
///
/// # Example
///
/// ```
/// use event_bus::Topic;
///
/// let counter_click: Topic<u32> = Topic::new("counter.click");
/// assert_eq!(counter_click.key(), "counter.click");
/// ```
pub struct Topic<T = serde_json::Value> {
    key: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Topic<T> {
    /// Create a topic from a key.
    ///
    /// # Panics
    ///
    /// Panics if `key` is empty. Use [`Topic::try_new`] for keys that come from
    /// user input.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        match Self::try_new(key) {
            Ok(topic) => topic,
            Err(e) => panic!("{e}"),
        }
    }

    /// Create a topic, rejecting empty keys.
    pub fn try_new(key: impl Into<String>) -> Result<Self, BusError> {
        let key = key.into();
        if key.is_empty() {
            return Err(BusError::EmptyTopicKey);
        }
        Ok(Self {
            key,
            _payload: PhantomData,
        })
    }

    /// The routing key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The same topic with its payload type erased to JSON.
    #[must_use]
    pub fn untyped(&self) -> Topic<serde_json::Value> {
        Topic {
            key: self.key.clone(),
            _payload: PhantomData,
        }
    }

    /// Whether an envelope key routes to this topic.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.key == key
    }
}

// Manual impls: derives would put bounds on `T`.

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Topic").field(&self.key).finish()
    }
}

impl<T> fmt::Display for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl<T> PartialEq for Topic<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Topic<T> {}

impl<T> Hash for Topic<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T> PartialOrd for Topic<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Topic<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}
