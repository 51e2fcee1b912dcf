//! TCP transport layer.
//!
//! This module handles the session with the LCN-PCK/IP gateway: line
//! framing, the login handshake, keepalive, the command queue and
//! reconnection.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Lcn (Rust)     │                              │  LCN-PCK/IP     │
//! │                 │         TCP, lines           │  gateway        │
//! │  Connection  ───┼─────────────────────────────►│                 │
//! │  event loop  ◄──┼──────────────────────────────┤  LCN bus        │
//! │                 │      host:4114               │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::spawn` - Start the idle event loop
//! 2. `Connection::set_event_handler` - Install the event callback
//! 3. `Connection::connect` - Connect, log in, set up the session
//! 4. `Connection::command` - Exchange commands, one at a time
//! 5. `Connection::shutdown` - Close and stop reconnecting
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | TCP connection and event loop |
//! | `framing` | Line splitting |
//! | `queue` | Single-slot command queue |
//! | `state` | Connection states |

// ============================================================================
// Submodules
// ============================================================================

/// TCP connection and event loop.
pub mod connection;

/// Line splitting.
pub mod framing;

/// Single-slot command queue.
pub mod queue;

/// Connection states.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionConfig, ConnectionEvent, EventHandler, PendingReply};
pub use framing::LineFramer;
pub use state::ConnectionState;
