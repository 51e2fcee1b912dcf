//! Error types for the LCN-PCK driver.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use lcn_pck::{CommandKind, ControlValue, Result};
//!
//! async fn example(lcn: &lcn_pck::Lcn) -> Result<()> {
//!     lcn.control(0, 12, CommandKind::RelayOut, 3u8, ControlValue::Bool(true)).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Fatal for the session |
//! |----------|----------|-----------------------|
//! | Configuration | [`Error::Config`], [`Error::InvalidAddress`], [`Error::InvalidArgument`] | - |
//! | Transport | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Io`] | yes |
//! | Sequence | [`Error::Handshake`], [`Error::AuthenticationFailed`], [`Error::License`], [`Error::PingMismatch`] | yes |
//! | Command | [`Error::CommandTimeout`], [`Error::CommandRejected`], [`Error::InvalidParameter`], [`Error::Nak`], [`Error::BusDisconnected`] | no |
//! | Facade | [`Error::NotConnected`], [`Error::ScanActive`], [`Error::NotControllable`], [`Error::UnknownCommand`] | no |
//! | Parse | [`Error::Parse`], [`Error::Json`] | no |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::protocol::AckError;
use crate::transport::ConnectionState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when driver options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Segment or module number outside `0..=255`.
    #[error("Invalid address {value}")]
    InvalidAddress {
        /// The rejected number.
        value: u32,
    },

    /// Invalid argument for a command.
    ///
    /// Returned when an output index, press kind or value cannot be encoded.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// TCP connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection or handshake state timed out.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed while a command was pending or queued.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Sequence Errors
    // ========================================================================
    /// Unexpected line for the current handshake state.
    #[error("Invalid data {line:?} while in state {state}")]
    Handshake {
        /// State the connection was in.
        state: ConnectionState,
        /// The offending line.
        line: String,
    },

    /// Gateway rejected the configured credentials.
    #[error("Authentication failure")]
    AuthenticationFailed,

    /// Gateway reported a license problem.
    #[error("License error received")]
    License,

    /// Keepalive echo did not carry the expected counter.
    #[error("Ping mismatch: expected {expected}, received {received:?}")]
    PingMismatch {
        /// Counter that was sent.
        expected: u8,
        /// Line that came back.
        received: String,
    },

    // ========================================================================
    // Command Errors
    // ========================================================================
    /// No acceptable reply within the command timeout.
    #[error("Command {command:?} timed out after {timeout_ms}ms")]
    CommandTimeout {
        /// Wire text of the command.
        command: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Gateway answered `(c-error)`.
    #[error("Command {command:?} cannot be processed")]
    CommandRejected {
        /// Wire text of the command.
        command: String,
    },

    /// Gateway answered `(XX:p-error)`.
    #[error("Command {command:?} has an invalid parameter ({code})")]
    InvalidParameter {
        /// Wire text of the command.
        command: String,
        /// Two-character code reported by the gateway.
        code: String,
    },

    /// Module answered with a negative acknowledgement.
    #[error("Module S{segment:03}.M{module:03} refused command: {ack}")]
    Nak {
        /// Segment of the answering module.
        segment: u16,
        /// Answering module.
        module: u16,
        /// Decoded acknowledgement code.
        ack: AckError,
    },

    /// Gateway lost the bus while the command was in flight.
    #[error("Bus disconnected")]
    BusDisconnected,

    // ========================================================================
    // Facade Errors
    // ========================================================================
    /// Operation requires an established session.
    #[error("LCN not connected")]
    NotConnected,

    /// Only one scan may run per driver.
    #[error("Scan for segment {segment} already running")]
    ScanActive {
        /// Segment of the running scan.
        segment: u16,
    },

    /// Command kind has no encoder.
    #[error("Unable to control {kind}")]
    NotControllable {
        /// Registry name of the kind.
        kind: String,
    },

    /// Command name not in the registry.
    #[error("Unknown command type: {command}")]
    UnknownCommand {
        /// The unrecognised name.
        command: String,
    },

    // ========================================================================
    // Parse Errors
    // ========================================================================
    /// Line matched a detector but could not be decoded.
    #[error("Cannot parse {line:?}: {message}")]
    Parse {
        /// The offending line.
        line: String,
        /// What went wrong.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid address error.
    #[inline]
    pub fn invalid_address(value: u32) -> Self {
        Self::InvalidAddress { value }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a handshake sequence error.
    #[inline]
    pub fn handshake(state: ConnectionState, line: impl Into<String>) -> Self {
        Self::Handshake {
            state,
            line: line.into(),
        }
    }

    /// Creates a command timeout error.
    #[inline]
    pub fn command_timeout(command: impl Into<String>, timeout_ms: u64) -> Self {
        Self::CommandTimeout {
            command: command.into(),
            timeout_ms,
        }
    }

    /// Creates a parse error.
    #[inline]
    pub fn parse(line: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            line: line.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::CommandTimeout { .. }
        )
    }

    /// Returns `true` if this error ends the TCP session.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Handshake { .. }
                | Self::AuthenticationFailed
                | Self::License
                | Self::PingMismatch { .. }
                | Self::Io(_)
        )
    }

    /// Returns `true` if this error concerns a single command only.
    ///
    /// The connection stays usable after these.
    #[inline]
    #[must_use]
    pub fn is_command_error(&self) -> bool {
        matches!(
            self,
            Self::CommandTimeout { .. }
                | Self::CommandRejected { .. }
                | Self::InvalidParameter { .. }
                | Self::Nak { .. }
                | Self::BusDisconnected
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_invalid_address_display() {
        assert_eq!(Error::invalid_address(256).to_string(), "Invalid address 256");
    }

    #[test]
    fn test_nak_display() {
        let err = Error::Nak {
            segment: 0,
            module: 7,
            ack: AckError::ModuleUnsuitable,
        };
        assert_eq!(err.to_string(), "Module S000.M007 refused command: Module unsuitable");
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::command_timeout(">M000005.SN", 1000).is_timeout());
        assert!(Error::connection_timeout(6000).is_timeout());
        assert!(!Error::License.is_timeout());
    }

    #[test]
    fn test_fatal_and_command_errors_are_disjoint() {
        let fatal = [
            Error::License,
            Error::AuthenticationFailed,
            Error::ConnectionClosed,
            Error::handshake(ConnectionState::WaitUser, "garbage"),
        ];
        for err in &fatal {
            assert!(err.is_connection_error(), "{err}");
            assert!(!err.is_command_error(), "{err}");
        }

        let command = [
            Error::command_timeout("x", 1),
            Error::CommandRejected { command: "x".into() },
            Error::BusDisconnected,
        ];
        for err in &command {
            assert!(err.is_command_error(), "{err}");
            assert!(!err.is_connection_error(), "{err}");
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionReset, "reset");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_connection_error());
    }
}
