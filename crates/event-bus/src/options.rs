//! # Publish Options
//!
//! Which channel an event goes to and whether it is broadcast to other contexts.

use crate::error::BusError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The keys an options object may carry. Used by the compatibility publish path
/// to tell an options object apart from a payload.
pub const OPTION_KEYS: [&str; 2] = ["channel", "broadcast"];

/// Defaults applied under every publish.
pub const DEFAULT_PUBLISH_OPTIONS: PublishOptions = PublishOptions {
    channel: Channel::Live,
    broadcast: true,
};

/// A delivery lane.
///
/// - `Live`: subscribers only see events published after they subscribed.
/// - `Historical`: additionally replays the last event of the channel to every
///   new subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Live,
    Historical,
}

impl Channel {
    /// The wire name of the channel.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Historical => "historical",
        }
    }

    /// Whether this channel replays its last event to new subscribers.
    #[must_use]
    pub const fn retains(self) -> bool {
        matches!(self, Self::Historical)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(Self::Live),
            "historical" => Ok(Self::Historical),
            other => Err(BusError::InvalidChannel(other.to_string())),
        }
    }
}

/// Fully resolved publish options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOptions {
    pub channel: Channel,
    pub broadcast: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        DEFAULT_PUBLISH_OPTIONS
    }
}

impl PublishOptions {
    /// Defaults with the `historical` channel.
    #[must_use]
    pub fn historical() -> Self {
        Self::default().with_channel(Channel::Historical)
    }

    /// Defaults without cross-context broadcast.
    #[must_use]
    pub fn local_only() -> Self {
        Self::default().with_broadcast(false)
    }

    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    #[must_use]
    pub fn with_broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }
}

/// Options as a caller supplies them: every field optional.
///
/// Unknown fields are rejected so that a payload can never deserialize as options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialPublishOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<bool>,
}

impl PartialPublishOptions {
    /// Merge these options over `defaults`. Fields set here always win.
    #[must_use]
    pub fn merge_over(self, defaults: PublishOptions) -> PublishOptions {
        PublishOptions {
            channel: self.channel.unwrap_or(defaults.channel),
            broadcast: self.broadcast.unwrap_or(defaults.broadcast),
        }
    }

    /// Whether every key of a JSON object is a recognized option key.
    ///
    /// An empty object qualifies. Non-objects never do.
    #[must_use]
    pub fn looks_like_options(value: &serde_json::Value) -> bool {
        value
            .as_object()
            .is_some_and(|map| map.keys().all(|k| OPTION_KEYS.contains(&k.as_str())))
    }
}

impl From<PublishOptions> for PartialPublishOptions {
    fn from(options: PublishOptions) -> Self {
        Self {
            channel: Some(options.channel),
            broadcast: Some(options.broadcast),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = PublishOptions::default();
        assert_eq!(options.channel, Channel::Live);
        assert!(options.broadcast);
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(Channel::Live.as_str(), "live");
        assert_eq!(Channel::Historical.to_string(), "historical");
        assert_eq!("historical".parse::<Channel>().unwrap(), Channel::Historical);
        assert!(matches!(
            "archive".parse::<Channel>(),
            Err(BusError::InvalidChannel(_))
        ));
    }

    #[test]
    fn test_partial_merges_over_defaults() {
        let partial = PartialPublishOptions {
            channel: Some(Channel::Historical),
            broadcast: None,
        };
        let merged = partial.merge_over(PublishOptions::default());
        assert_eq!(merged.channel, Channel::Historical);
        assert!(merged.broadcast);

        let partial = PartialPublishOptions {
            channel: None,
            broadcast: Some(false),
        };
        let merged = partial.merge_over(PublishOptions::historical());
        assert_eq!(merged.channel, Channel::Historical);
        assert!(!merged.broadcast);
    }

    #[test]
    fn test_partial_from_json() {
        let partial: PartialPublishOptions =
            serde_json::from_value(json!({"broadcast": false})).unwrap();
        assert_eq!(partial.broadcast, Some(false));
        assert_eq!(partial.channel, None);

        let rejected = serde_json::from_value::<PartialPublishOptions>(json!({"x": 1}));
        assert!(rejected.is_err());
    }

    #[test]
    fn test_looks_like_options() {
        assert!(PartialPublishOptions::looks_like_options(&json!({})));
        assert!(PartialPublishOptions::looks_like_options(
            &json!({"channel": "historical"})
        ));
        assert!(PartialPublishOptions::looks_like_options(
            &json!({"channel": "live", "broadcast": true})
        ));
        assert!(!PartialPublishOptions::looks_like_options(
            &json!({"channel": "historical", "x": 1})
        ));
        assert!(!PartialPublishOptions::looks_like_options(&json!(0)));
        assert!(!PartialPublishOptions::looks_like_options(&json!(false)));
        assert!(!PartialPublishOptions::looks_like_options(&json!("channel")));
        assert!(!PartialPublishOptions::looks_like_options(&json!(["channel"])));
    }

    #[test]
    fn test_builder_helpers() {
        assert_eq!(PublishOptions::historical().channel, Channel::Historical);
        assert!(!PublishOptions::local_only().broadcast);
        let options = PublishOptions::default()
            .with_channel(Channel::Historical)
            .with_broadcast(false);
        assert_eq!(
            options,
            PublishOptions {
                channel: Channel::Historical,
                broadcast: false
            }
        );
    }
}
