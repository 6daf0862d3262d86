//! Client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::streaming::ReconnectPolicy;

/// Default TCP connect timeout for each connection attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for a [`crate::StatusClient`]
///
/// There is no overall request timeout: status streams stay
/// open indefinitely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// TCP connect timeout, in milliseconds
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,

    /// Reconnection behavior after an interruption
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Serde helpers for durations written as whole milliseconds
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"connect_timeout_ms": 2500, "reconnect": {"max_attempts": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.connect_timeout, Duration::from_millis(2500));
        assert_eq!(config.reconnect.max_attempts, Some(10));
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(3));
    }

    #[test]
    fn test_config_serializes_millis() {
        let json = serde_json::to_value(ClientConfig::default()).unwrap();
        assert_eq!(json["connect_timeout_ms"], 10_000);
        assert_eq!(json["reconnect"]["initial_delay_ms"], 3_000);
        assert_eq!(json["reconnect"]["max_delay_ms"], 30_000);
    }
}
