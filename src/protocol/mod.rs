//! LCN-PCK protocol codec.
//!
//! Pure, socket-free encoding of outgoing frames and decoding of incoming
//! lines.
//!
//! # Wire Grammar
//!
//! Outgoing frames look like `>Msssmmm!R8--1-----`:
//!
//! | Part | Meaning |
//! |------|---------|
//! | `>` | Frame start |
//! | `M` / `G` | Module or group target |
//! | `sss` `mmm` | Segment and module, three digits each |
//! | `!` / `.` | Acknowledgement requested or not |
//! | rest | Command code and payload |
//!
//! Incoming frames start with `-M` (ack), `:M` (status), `=M` (object data)
//! or `%M` (values), followed by the reporting module's address.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `ack` | Acknowledgement taxonomy |
//! | `codec` | Analog mode, frame encoder |
//! | `command` | Command registry and detectors |
//! | `decode` | Fixed-width frame decoders |
//! | `event` | Driver events |
//! | `gateway` | Handshake and session lines |
//! | `record` | Decoded state records |
//! | `request` | Typed outgoing requests |

// ============================================================================
// Submodules
// ============================================================================

/// Acknowledgement taxonomy.
pub mod ack;

/// Analog mode and frame encoder.
pub mod codec;

/// Command registry and detectors.
pub mod command;

/// Fixed-width frame decoders.
mod decode;

/// Driver events.
pub mod event;

/// Handshake and session lines.
pub mod gateway;

/// Decoded state records.
pub mod record;

/// Typed outgoing requests.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use ack::{AckError, AckStatus};
pub use codec::{AnalogMode, Codec};
pub use command::{CommandKind, Detector};
pub use event::{Event, ScanProgress, ScanStep};
pub use gateway::{SessionLine, SetupCommand};
pub use record::{HardwareType, Manufacturer, RecordDetail, RecordType, StateRecord, StateValue};
pub use request::{
    ButtonTable, ControlValue, DisplayFrames, Output, PressKind, Request, StatusScope, TextField,
};
