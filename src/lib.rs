//! LCN-PCK - Async driver for the LCN-PCK/IP home-automation gateway.
//!
//! This library keeps a persistent, authenticated TCP session to an
//! LCN-PCK/IP gateway, serializes commands over its uncorrelated line
//! stream, decodes module reports and discovers the modules of a segment.
//!
//! # Architecture
//!
//! ```text
//! Lcn (facade) ──► Codec (encode request)
//!      │                    │
//!      │              Connection handle ──mpsc──► event loop task
//!      │                                            │ TCP socket
//!      ◄── ConnectionEvent (handler) ───────────────┘
//!      │
//!      └──► broadcast: Event::{Connected, Update, Scan, ...}
//! ```
//!
//! Key design principles:
//!
//! - One event loop task owns socket, queue and timers
//! - At most one command is in flight; replies carry no request id
//! - Unsolicited lines are decoded into [`StateRecord`]s and broadcast
//! - The driver reconnects on its own until destroyed
//!
//! # Quick Start
//!
//! ```no_run
//! use lcn_pck::{CommandKind, Event, Lcn, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let lcn = Lcn::builder()
//!         .host("192.168.1.20")
//!         .credentials("lcn", "lcn")
//!         .build()?;
//!
//!     let mut events = lcn.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             Event::Connected => {
//!                 lcn.control(0, 12, CommandKind::RelayOut, 1u8, true).await?;
//!             }
//!             Event::Update(record) => println!("{record:?}"),
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`driver`] | Driver facade and configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Bus addresses |
//! | [`protocol`] | Frame encoding and line decoding |
//! | [`scanner`] | Module discovery |
//! | [`transport`] | Gateway connection (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Driver facade and configuration.
///
/// Use [`Lcn::builder()`] to create a configured driver instance.
pub mod driver;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Bus addresses.
pub mod identifiers;

/// Frame encoding and line decoding.
///
/// Pure and socket-free; usable without a connection.
pub mod protocol;

/// Module discovery.
pub mod scanner;

/// Gateway connection.
///
/// Internal module handling the TCP session, handshake and command queue.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Driver types
pub use driver::{Lcn, LcnBuilder, LcnOptions, ModuleReadPlan, ReadOperation};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::Address;

// Protocol types
pub use protocol::{
    AckError, AckStatus, AnalogMode, Codec, CommandKind, ControlValue, Event, Output, PressKind,
    RecordDetail, RecordType, Request, ScanProgress, ScanStep, StateRecord, StateValue,
};

// Scanner types
pub use scanner::PartialDevice;

// Transport types
pub use transport::ConnectionState;
