//! Bus configuration
//!
//! # Example
//!
//! ```
//! use event_bus::{BusConfigBuilder, Channel};
//!
//! let config = BusConfigBuilder::new()
//!     .origin("https://app.example.com")
//!     .namespace_scope("inspector")
//!     .default_channel(Channel::Historical)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.namespace().unwrap(), "https://app.example.com#inspector");
//! ```

use crate::error::BusError;
use crate::options::{Channel, PublishOptions, DEFAULT_PUBLISH_OPTIONS};
use crate::transport::namespace_for_origin;
use std::env;

/// Configuration for one [`EventBus`](crate::EventBus).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusConfig {
    /// Network origin of the hosting application (`scheme://host[:port]`).
    pub origin: String,
    /// Optional suffix isolating this bus from others on the same origin.
    pub namespace_scope: Option<String>,
    /// Options applied under every publish.
    pub default_options: PublishOptions,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost".to_string(),
            namespace_scope: None,
            default_options: DEFAULT_PUBLISH_OPTIONS,
        }
    }
}

impl BusConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `EVENT_BUS_ORIGIN`: Application origin (default: http://localhost)
    /// - `EVENT_BUS_NAMESPACE_SCOPE`: Namespace scope (default: none)
    /// - `EVENT_BUS_DEFAULT_CHANNEL`: `live` or `historical` (default: live)
    /// - `EVENT_BUS_DEFAULT_BROADCAST`: `true`/`1` or `false`/`0` (default: true)
    pub fn from_env() -> Result<Self, BusError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from `lookup`, which returns the value of a
    /// variable or `None` when unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BusError> {
        let mut builder = BusConfigBuilder::new();

        if let Some(origin) = lookup("EVENT_BUS_ORIGIN") {
            builder = builder.origin(origin);
        }
        if let Some(scope) = lookup("EVENT_BUS_NAMESPACE_SCOPE") {
            builder = builder.namespace_scope(scope);
        }
        if let Some(channel) = lookup("EVENT_BUS_DEFAULT_CHANNEL") {
            builder = builder.default_channel(channel.parse()?);
        }
        if let Some(broadcast) = lookup("EVENT_BUS_DEFAULT_BROADCAST") {
            let broadcast = parse_flag("EVENT_BUS_DEFAULT_BROADCAST", &broadcast)?;
            builder = builder.default_broadcast(broadcast);
        }
        builder.build()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), BusError> {
        namespace_for_origin(&self.origin)?;
        if let Some(scope) = &self.namespace_scope {
            if scope.is_empty() || scope.contains(char::is_whitespace) {
                return Err(BusError::InvalidConfig(format!(
                    "namespace scope '{scope}' must be non-empty and contain no whitespace"
                )));
            }
        }
        Ok(())
    }

    /// The transport namespace: the origin namespace, plus `#scope` if scoped.
    pub fn namespace(&self) -> Result<String, BusError> {
        let base = namespace_for_origin(&self.origin)?;
        Ok(match &self.namespace_scope {
            Some(scope) => format!("{base}#{scope}"),
            None => base,
        })
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, BusError> {
    if value.eq_ignore_ascii_case("true") || value == "1" {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") || value == "0" {
        Ok(false)
    } else {
        Err(BusError::InvalidConfig(format!(
            "{name} must be true/false or 1/0, got '{value}'"
        )))
    }
}

/// Builder for [`BusConfig`] with validation.
#[derive(Default)]
pub struct BusConfigBuilder {
    origin: Option<String>,
    namespace_scope: Option<String>,
    default_channel: Option<Channel>,
    default_broadcast: Option<bool>,
}

impl BusConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application origin.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Isolate this bus's broadcast namespace from other buses on the same origin.
    pub fn namespace_scope(mut self, scope: impl Into<String>) -> Self {
        self.namespace_scope = Some(scope.into());
        self
    }

    pub fn default_channel(mut self, channel: Channel) -> Self {
        self.default_channel = Some(channel);
        self
    }

    pub fn default_broadcast(mut self, broadcast: bool) -> Self {
        self.default_broadcast = Some(broadcast);
        self
    }

    /// Build the configuration, validating all parameters.
    pub fn build(self) -> Result<BusConfig, BusError> {
        let defaults = BusConfig::default();

        let config = BusConfig {
            origin: self.origin.unwrap_or(defaults.origin),
            namespace_scope: self.namespace_scope,
            default_options: PublishOptions {
                channel: self
                    .default_channel
                    .unwrap_or(defaults.default_options.channel),
                broadcast: self
                    .default_broadcast
                    .unwrap_or(defaults.default_options.broadcast),
            },
        };

        config.validate()?;
        Ok(config)
    }
}
