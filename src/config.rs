//! # Client configuration
//!
//! Settings for connecting an [`AgentClient`](crate::AgentClient) to an agent.
//!
//! ## Sources
//! - TOML strings or files via [`ClientConfig::from_toml`] / [`ClientConfig::from_file`]
//! - Environment variables via [`ClientConfig::from_env`]
//! - Direct instantiation with defaults
//!
//! ## Environment variables
//!
//! | Variable | Field |
//! |---|---|
//! | `RIPC_ADDRESS` | `address` |
//! | `RIPC_PORT` | `port` |
//! | `RIPC_LOCAL_PORT` | `local_port` |
//! | `RIPC_REQUEST_TIMEOUT_MS` | `request_timeout` |
//! | `RIPC_EVENT_CAPACITY` | `event_capacity` |
//! | `RIPC_CODEC` | `codec` (`cbor-map` or `cbor-json`) |
//!
//! ## Example
//!
//! ```
//! use ripc_client::ClientConfig;
//!
//! let config = ClientConfig::from_toml(r#"
//!     address = "10.0.0.5"
//!     port = 9100
//!     request_timeout = 2500
//! "#).unwrap();
//!
//! assert_eq!(config.port, 9100);
//! assert!(config.validate().is_empty());
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{DEFAULT_EVENT_CAPACITY, DEFAULT_REQUEST_TIMEOUT};
use crate::codec::CodecKind;
use crate::error::{Result, RipcError};
use crate::protocol::{HEADER_SIZE, MAX_DATAGRAM_SIZE};

/// Default agent address.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1";

/// Default agent port.
pub const DEFAULT_PORT: u16 = 9000;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Agent host name or IPv4 address.
    pub address: String,

    /// Agent UDP port.
    pub port: u16,

    /// Fixed local port to bind; `None` binds an ephemeral one.
    pub local_port: Option<u16>,

    /// Deadline for [`AgentClient::request`](crate::AgentClient::request), in milliseconds on disk.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,

    /// Depth of the event broadcast channel.
    pub event_capacity: usize,

    /// Largest frame the client will send.
    pub max_datagram_size: usize,

    /// Payload codec.
    pub codec: CodecKind,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            local_port: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            codec: CodecKind::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RipcError::Config(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string. Missing keys take defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| RipcError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `RIPC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Unparseable values are an error rather than silently ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("RIPC_ADDRESS") {
            self.address = address;
        }
        if let Some(port) = lookup("RIPC_PORT") {
            self.port = parse_var("RIPC_PORT", &port)?;
        }
        if let Some(port) = lookup("RIPC_LOCAL_PORT") {
            self.local_port = match port.trim() {
                "" => None,
                p => Some(parse_var("RIPC_LOCAL_PORT", p)?),
            };
        }
        if let Some(ms) = lookup("RIPC_REQUEST_TIMEOUT_MS") {
            self.request_timeout =
                Duration::from_millis(parse_var("RIPC_REQUEST_TIMEOUT_MS", &ms)?);
        }
        if let Some(capacity) = lookup("RIPC_EVENT_CAPACITY") {
            self.event_capacity = parse_var("RIPC_EVENT_CAPACITY", &capacity)?;
        }
        if let Some(codec) = lookup("RIPC_CODEC") {
            self.codec = CodecKind::from_str(codec.trim()).map_err(RipcError::Config)?;
        }
        Ok(self)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| RipcError::Config(format!("Failed to serialize config: {e}")))
    }

    /// Validate the configuration.
    ///
    /// Returns a list of problems. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.trim().is_empty() {
            errors.push("address must not be empty".to_string());
        }
        if self.port == 0 {
            errors.push("port must not be 0".to_string());
        }
        if self.request_timeout.is_zero() {
            errors.push("request_timeout must be greater than 0".to_string());
        }
        if self.event_capacity == 0 {
            errors.push("event_capacity must be greater than 0".to_string());
        }
        if self.max_datagram_size <= HEADER_SIZE {
            errors.push(format!(
                "max_datagram_size ({}) must exceed the {HEADER_SIZE}-byte header",
                self.max_datagram_size
            ));
        } else if self.max_datagram_size > MAX_DATAGRAM_SIZE {
            errors.push(format!(
                "max_datagram_size ({}) exceeds the UDP limit of {MAX_DATAGRAM_SIZE}",
                self.max_datagram_size
            ));
        }

        errors
    }

    /// Validate and return Result - convenience method.
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RipcError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RipcError::Config(format!("{key}: invalid value '{value}'")))
}

/// Durations stored as whole milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
