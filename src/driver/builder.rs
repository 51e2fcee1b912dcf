//! Builder pattern for driver configuration.
//!
//! Provides a fluent API for configuring and creating [`Lcn`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use lcn_pck::Lcn;
//!
//! # async fn example() -> lcn_pck::Result<()> {
//! let lcn = Lcn::builder()
//!     .host("192.168.1.20")
//!     .credentials("lcn", "lcn")
//!     .default_timeout(Duration::from_millis(1500))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::protocol::AnalogMode;

use super::core::Lcn;
use super::options::LcnOptions;

// ============================================================================
// LcnBuilder
// ============================================================================

/// Builder for configuring an [`Lcn`] instance.
///
/// Use [`Lcn::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct LcnBuilder {
    /// Options being assembled.
    options: LcnOptions,
}

// ============================================================================
// LcnBuilder Implementation
// ============================================================================

impl LcnBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all options at once, e.g. with [`LcnOptions::from_json`].
    #[inline]
    #[must_use]
    pub fn options(mut self, options: LcnOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the gateway host name or IP.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    /// Sets the gateway TCP port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    /// Sets the login user and password.
    #[inline]
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.options.user = user.into();
        self.options.password = password.into();
        self
    }

    /// Sets the analog output mode.
    #[inline]
    #[must_use]
    pub fn analog_mode(mut self, mode: AnalogMode) -> Self {
        self.options.analog_mode = mode;
        self
    }

    /// Sets the delay before reconnecting after a fatal error.
    #[inline]
    #[must_use]
    pub fn reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.options.reconnect_timeout = timeout;
        self
    }

    /// Sets the reply timeout of commands that do not set their own.
    #[inline]
    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.options.default_timeout = timeout;
        self
    }

    /// Sets the keepalive interval.
    #[inline]
    #[must_use]
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.options.ping_interval = interval;
        self
    }

    /// Sets the keepalive reply timeout.
    #[inline]
    #[must_use]
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.options.ping_timeout = Some(timeout);
        self
    }

    /// Sets the TCP connect and handshake deadline.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Sets the reply timeout of scan probes and reads.
    #[inline]
    #[must_use]
    pub fn scan_response_timeout(mut self, timeout: Duration) -> Self {
        self.options.scan_response_timeout = timeout;
        self
    }

    /// Sets the segment scanned when none is given.
    #[inline]
    #[must_use]
    pub fn segment(mut self, segment: u16) -> Self {
        self.options.segment = segment;
        self
    }

    /// Validates the options and starts connecting.
    ///
    /// Must be called inside a tokio runtime; the connection task is
    /// spawned on it.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid
    /// - [`Error::Config`] if called outside a tokio runtime
    pub fn build(self) -> Result<Lcn> {
        self.options.validate()?;

        if Handle::try_current().is_err() {
            return Err(Error::config(
                "Lcn::builder().build() must be called inside a tokio runtime",
            ));
        }

        Ok(Lcn::new(self.options))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_defaults() {
        let builder = LcnBuilder::new();
        assert_eq!(builder.options, LcnOptions::default());
    }

    #[test]
    fn test_setters() {
        let builder = LcnBuilder::new()
            .host("10.0.0.2")
            .port(4115)
            .credentials("user", "secret")
            .analog_mode(AnalogMode::Iob50ToLcn50)
            .ping_timeout(Duration::from_millis(500))
            .segment(7);

        assert_eq!(builder.options.host, "10.0.0.2");
        assert_eq!(builder.options.port, 4115);
        assert_eq!(builder.options.user, "user");
        assert_eq!(builder.options.password, "secret");
        assert_eq!(builder.options.analog_mode, AnalogMode::Iob50ToLcn50);
        assert_eq!(builder.options.ping_timeout, Some(Duration::from_millis(500)));
        assert_eq!(builder.options.segment, 7);
    }

    #[test]
    fn test_build_fails_outside_runtime() {
        let err = LcnBuilder::new().build().unwrap_err();
        assert!(err.to_string().contains("tokio runtime"));
    }

    #[test]
    fn test_build_fails_with_invalid_options() {
        let err = LcnBuilder::new().host("").build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_build_inside_runtime() {
        let lcn = LcnBuilder::new().port(1).build().unwrap();
        assert!(!lcn.is_connected());
        lcn.destroy().await;
    }

    #[test]
    fn test_builder_is_clone() {
        let builder = LcnBuilder::new().host("gateway");
        let cloned = builder.clone();
        assert_eq!(builder.options, cloned.options);
    }
}
