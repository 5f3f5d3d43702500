//! # Envelopes and the wire message
//!
//! An [`Envelope`] is what travels on a channel: a topic key and an optional
//! JSON payload. A [`WireMessage`] is what travels between contexts: the same
//! two fields plus the channel name as routing metadata.
//!
//! ## Wire format
//!
//! ```text
//! {"key":"counter.click","data":3,"channel":"live"}
//! {"key":"session.reset","data":null,"channel":"historical"}
//! ```

use crate::error::BusError;
use crate::options::Channel;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The unit carried on a channel.
///
/// `data == None` is the single "no payload" sentinel: publishing without data
/// and publishing JSON `null` both produce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub key: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Envelope {
    /// Build an envelope, folding JSON `null` into the empty sentinel.
    #[must_use]
    pub fn new(key: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            key: key.into(),
            data: normalize(data),
        }
    }

    /// Envelope without a payload.
    #[must_use]
    pub fn empty(key: impl Into<String>) -> Self {
        Self::new(key, None)
    }

    #[must_use]
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

/// The message exchanged with other contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub key: String,
    #[serde(default)]
    pub data: Option<Value>,
    pub channel: Channel,
}

impl WireMessage {
    #[must_use]
    pub fn new(envelope: &Envelope, channel: Channel) -> Self {
        Self {
            key: envelope.key.clone(),
            data: envelope.data.clone(),
            channel,
        }
    }

    /// Encode as a JSON frame.
    pub fn encode(&self) -> Result<String, BusError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON frame.
    pub fn decode(frame: &str) -> Result<Self, BusError> {
        let message: Self = serde_json::from_str(frame)?;
        if message.key.is_empty() {
            return Err(BusError::EmptyTopicKey);
        }
        Ok(message)
    }

    /// Split into the local envelope and the channel it belongs to.
    #[must_use]
    pub fn into_parts(self) -> (Envelope, Channel) {
        (Envelope::new(self.key, self.data), self.channel)
    }
}

fn normalize(data: Option<Value>) -> Option<Value> {
    data.filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_empty() {
        assert_eq!(Envelope::new("a", Some(Value::Null)), Envelope::empty("a"));
        assert!(!Envelope::empty("a").has_data());
    }

    #[test]
    fn test_falsy_values_are_payloads() {
        for value in [json!(0), json!(false), json!({}), json!(""), json!([])] {
            let envelope = Envelope::new("a", Some(value.clone()));
            assert_eq!(envelope.data, Some(value));
        }
    }

    #[test]
    fn test_wire_shape() {
        let envelope = Envelope::new("counter.click", Some(json!(3)));
        let frame = WireMessage::new(&envelope, Channel::Live).encode().unwrap();
        assert_eq!(frame, r#"{"key":"counter.click","data":3,"channel":"live"}"#);

        let frame = WireMessage::new(&Envelope::empty("session.reset"), Channel::Historical)
            .encode()
            .unwrap();
        assert_eq!(
            frame,
            r#"{"key":"session.reset","data":null,"channel":"historical"}"#
        );
    }

    #[test]
    fn test_decode_tolerates_missing_data() {
        let message = WireMessage::decode(r#"{"key":"k","channel":"live"}"#).unwrap();
        let (envelope, channel) = message.into_parts();
        assert_eq!(envelope, Envelope::empty("k"));
        assert_eq!(channel, Channel::Live);
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert!(WireMessage::decode("not json").is_err());
        assert!(WireMessage::decode(r#"{"key":"k","data":1}"#).is_err());
        assert!(WireMessage::decode(r#"{"key":"k","data":1,"channel":"archive"}"#).is_err());
        assert_eq!(
            WireMessage::decode(r#"{"key":"","data":1,"channel":"live"}"#),
            Err(BusError::EmptyTopicKey)
        );
    }
}
