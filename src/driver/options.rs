//! Driver configuration.
//!
//! Provides a type-safe, serde-loadable description of the gateway
//! connection and scan settings.
//!
//! # Example
//!
//! ```ignore
//! use lcn_pck::LcnOptions;
//!
//! let options = LcnOptions::from_json(r#"{
//!     "host": "192.168.1.20",
//!     "user": "lcn",
//!     "password": "lcn",
//!     "defaultTimeout": 1500
//! }"#)?;
//!
//! assert_eq!(options.port, 4114);
//! ```
//!
//! Durations are written as milliseconds; missing fields take their
//! defaults.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::AnalogMode;
use crate::transport::ConnectionConfig;

// ============================================================================
// Constants
// ============================================================================

/// Default gateway port.
pub const DEFAULT_PORT: u16 = 4114;

/// Keepalive intervals shorter than this many ping timeouts are replaced.
const MIN_PING_RATIO: u32 = 2;

/// Replacement keepalive interval, in ping timeouts.
const CORRECTED_PING_RATIO: u32 = 10;

// ============================================================================
// LcnOptions
// ============================================================================

/// Gateway connection and scan settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LcnOptions {
    /// Gateway host name or IP.
    pub host: String,

    /// Gateway TCP port.
    pub port: u16,

    /// Login user.
    pub user: String,

    /// Login password.
    pub password: String,

    /// Delay before reconnecting after a fatal error.
    #[serde(with = "millis")]
    pub reconnect_timeout: Duration,

    /// Reply timeout of commands that do not set their own.
    #[serde(with = "millis")]
    pub default_timeout: Duration,

    /// Idle time before a keepalive is sent.
    #[serde(with = "millis")]
    pub ping_interval: Duration,

    /// Keepalive reply timeout; `None` uses `default_timeout`.
    #[serde(with = "millis_opt")]
    pub ping_timeout: Option<Duration>,

    /// Analog output mode.
    pub analog_mode: AnalogMode,

    /// Deadline of TCP connect and of each handshake state.
    #[serde(with = "millis")]
    pub connect_timeout: Duration,

    /// Reply timeout of scan probes and reads.
    #[serde(with = "millis")]
    pub scan_response_timeout: Duration,

    /// Segment scanned when none is given.
    pub segment: u16,
}

impl Default for LcnOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            user: String::new(),
            password: String::new(),
            reconnect_timeout: Duration::from_secs(10),
            default_timeout: Duration::from_secs(1),
            ping_interval: Duration::from_secs(300),
            ping_timeout: None,
            analog_mode: AnalogMode::default(),
            connect_timeout: Duration::from_secs(6),
            scan_response_timeout: Duration::from_secs(1),
            segment: 0,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl LcnOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from JSON.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not valid options JSON
    /// - [`Error::Config`] if the options fail [`validate`](Self::validate)
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }
}

// ============================================================================
// Derived Settings
// ============================================================================

impl LcnOptions {
    /// Keepalive reply timeout actually used.
    #[inline]
    #[must_use]
    pub fn effective_ping_timeout(&self) -> Duration {
        self.ping_timeout.unwrap_or(self.default_timeout)
    }

    /// Keepalive interval actually used.
    ///
    /// An interval shorter than twice the ping timeout becomes ten times
    /// the ping timeout.
    #[must_use]
    pub fn effective_ping_interval(&self) -> Duration {
        let ping_timeout = self.effective_ping_timeout();
        if self.ping_interval < ping_timeout * MIN_PING_RATIO {
            ping_timeout * CORRECTED_PING_RATIO
        } else {
            self.ping_interval
        }
    }

    /// Connection settings derived from these options.
    #[must_use]
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            reconnect_timeout: self.reconnect_timeout,
            default_timeout: self.default_timeout,
            ping_interval: self.effective_ping_interval(),
            ping_timeout: self.effective_ping_timeout(),
            connect_timeout: self.connect_timeout,
            analog_mode: self.analog_mode,
        }
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty host, port 0, a segment
    /// above 255 or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("port must not be 0"));
        }
        if self.segment > crate::identifiers::MAX_ADDRESS {
            return Err(Error::config(format!(
                "segment {} exceeds {}",
                self.segment,
                crate::identifiers::MAX_ADDRESS
            )));
        }

        let timeouts = [
            ("reconnectTimeout", Some(self.reconnect_timeout)),
            ("defaultTimeout", Some(self.default_timeout)),
            ("pingTimeout", self.ping_timeout),
            ("connectTimeout", Some(self.connect_timeout)),
            ("scanResponseTimeout", Some(self.scan_response_timeout)),
        ];
        for (name, value) in timeouts {
            if value.is_some_and(|timeout| timeout.is_zero()) {
                return Err(Error::config(format!("{name} must be greater than zero")));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

/// `Duration` as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// `Option<Duration>` as integer milliseconds or `null`.
mod millis_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => super::millis::serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = LcnOptions::new();
        assert_eq!(options.host, "127.0.0.1");
        assert_eq!(options.port, 4114);
        assert_eq!(options.reconnect_timeout, Duration::from_secs(10));
        assert_eq!(options.default_timeout, Duration::from_secs(1));
        assert_eq!(options.ping_interval, Duration::from_secs(300));
        assert_eq!(options.connect_timeout, Duration::from_secs(6));
        assert_eq!(options.scan_response_timeout, Duration::from_secs(1));
        assert_eq!(options.analog_mode, AnalogMode::Iob100ToLcn50);
        assert_eq!(options.segment, 0);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_ping_timeout_falls_back_to_default_timeout() {
        let options = LcnOptions {
            default_timeout: Duration::from_millis(1500),
            ..LcnOptions::default()
        };
        assert_eq!(options.effective_ping_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_short_ping_interval_is_corrected() {
        let options = LcnOptions {
            ping_interval: Duration::from_millis(1500),
            ping_timeout: Some(Duration::from_secs(1)),
            ..LcnOptions::default()
        };
        assert_eq!(options.effective_ping_interval(), Duration::from_secs(10));

        let options = LcnOptions {
            ping_interval: Duration::from_secs(2),
            ping_timeout: Some(Duration::from_secs(1)),
            ..LcnOptions::default()
        };
        assert_eq!(options.effective_ping_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_from_json() {
        let options = LcnOptions::from_json(
            r#"{"host":"10.0.0.2","user":"lcn","defaultTimeout":1500,"analogMode":4,"pingTimeout":null}"#,
        )
        .unwrap();
        assert_eq!(options.host, "10.0.0.2");
        assert_eq!(options.user, "lcn");
        assert_eq!(options.port, 4114);
        assert_eq!(options.default_timeout, Duration::from_millis(1500));
        assert_eq!(options.analog_mode, AnalogMode::Iob200ToLcn200);
        assert_eq!(options.ping_timeout, None);
    }

    #[test]
    fn test_from_json_rejects_bad_analog_mode() {
        assert!(LcnOptions::from_json(r#"{"analogMode":7}"#).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let options = LcnOptions {
            port: 0,
            ..LcnOptions::default()
        };
        assert!(matches!(options.validate(), Err(Error::Config { .. })));

        let options = LcnOptions {
            connect_timeout: Duration::ZERO,
            ..LcnOptions::default()
        };
        assert!(options.validate().is_err());

        let options = LcnOptions {
            host: " ".into(),
            ..LcnOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_connection_config() {
        let options = LcnOptions {
            user: "u".into(),
            ping_interval: Duration::from_millis(100),
            ..LcnOptions::default()
        };
        let config = options.connection_config();
        assert_eq!(config.user, "u");
        assert_eq!(config.ping_timeout, Duration::from_secs(1));
        assert_eq!(config.ping_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_serialize_round_trip() {
        let json = serde_json::to_string(&LcnOptions::default()).unwrap();
        assert!(json.contains("\"defaultTimeout\":1000"));
        let back: LcnOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LcnOptions::default());
    }
}
