//! Error types for the event bus.
//!
//! Publishing and delivery never fail. These errors only surface where a
//! caller constructs something (topics, configuration) or where a transport
//! implementation reports back to the bridge.

use thiserror::Error;

/// Errors raised while constructing bus values or configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Topic keys must be non-empty.
    #[error("Topic key must not be empty")]
    EmptyTopicKey,

    /// The origin could not be turned into a transport namespace.
    #[error("Invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },

    /// A channel name other than `live` or `historical`.
    #[error("Unknown channel: {0}")]
    InvalidChannel(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors reported by a [`BroadcastTransport`](crate::transport::BroadcastTransport).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint was closed and can no longer post.
    #[error("Transport endpoint closed")]
    Closed,

    /// The frame could not be encoded for the wire.
    #[error("Failed to encode frame: {0}")]
    Encode(String),

    /// The transport refused the frame.
    #[error("Transport rejected frame: {0}")]
    Rejected(String),
}

impl From<BusError> for TransportError {
    fn from(err: BusError) -> Self {
        Self::Encode(err.to_string())
    }
}
