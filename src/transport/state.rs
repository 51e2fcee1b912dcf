//! Connection state machine states.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;

// ============================================================================
// ConnectionState
// ============================================================================

/// Where the gateway session currently is.
///
/// ```text
/// Connecting → WaitPrompt → WaitUser → WaitPass → WaitAuthOk
///            → WaitConnected → Ready ⇄ WaitResponse
/// ```
///
/// `Disconnect` is entered on explicit shutdown; a later `connect()` starts
/// over at `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Opening the TCP connection, or waiting to retry.
    #[default]
    Connecting,
    /// Waiting for the `LCN-PCK/…` banner.
    WaitPrompt,
    /// Waiting for `Username:`.
    WaitUser,
    /// Waiting for `Password:`.
    WaitPass,
    /// Waiting for `OK`.
    WaitAuthOk,
    /// Waiting for the bus to attach.
    WaitConnected,
    /// Idle, next command may be sent.
    Ready,
    /// One command in flight.
    WaitResponse,
    /// Shut down on request.
    Disconnect,
}

impl ConnectionState {
    /// Upper-case name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::WaitPrompt => "WAIT_PROMPT",
            Self::WaitUser => "WAIT_USER",
            Self::WaitPass => "WAIT_PASS",
            Self::WaitAuthOk => "WAIT_AUTH_OK",
            Self::WaitConnected => "WAIT_CONNECTED",
            Self::Ready => "READY",
            Self::WaitResponse => "WAIT_RESPONSE",
            Self::Disconnect => "DISCONNECT",
        }
    }

    /// Returns `true` once the session accepts bus commands.
    #[inline]
    #[must_use]
    pub const fn is_session(self) -> bool {
        matches!(self, Self::Ready | Self::WaitResponse)
    }

    /// Returns `true` while logging in.
    #[inline]
    #[must_use]
    pub const fn is_handshake(self) -> bool {
        matches!(
            self,
            Self::WaitPrompt | Self::WaitUser | Self::WaitPass | Self::WaitAuthOk
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Tests
// ============================================================================
