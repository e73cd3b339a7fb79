//! Client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resp::DEFAULT_MAX_FRAME_SIZE;

/// Settings for `RespClient` and the operation facades
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` of the store
    pub addr: String,

    /// Upper bound on establishing a TCP connection
    #[serde(with = "millis")]
    pub connect_timeout: Duration,

    /// Extra time granted to a blocking command beyond its own timeout
    /// before the client gives up locally and reports "absent"
    #[serde(with = "millis")]
    pub blocking_grace: Duration,

    /// Largest reply frame accepted from the store
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            blocking_grace: Duration::from_secs(1),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_blocking_grace(mut self, grace: Duration) -> Self {
        self.blocking_grace = grace;
        self
    }

    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Parses a JSON document; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

mod millis {
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
    fn test_from_json_overrides_only_given_fields() {
        let config = ClientConfig::from_json(r#"{"addr":"10.0.0.5:7000","blocking_grace":250}"#)
            .unwrap();
        assert_eq!(config.addr, "10.0.0.5:7000");
        assert_eq!(config.blocking_grace, Duration::from_millis(250));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new("localhost:6380")
            .with_connect_timeout(Duration::from_millis(100))
            .with_max_frame_size(4096);
        assert_eq!(config.addr, "localhost:6380");
        assert_eq!(config.connect_timeout, Duration::from_millis(100));
        assert_eq!(config.max_frame_size, 4096);
    }
}
