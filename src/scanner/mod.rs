//! Module discovery.
//!
//! [`Lcn::scan_segment`](crate::Lcn::scan_segment) finds the modules of a
//! segment in two phases:
//!
//! ```text
//! Scanning:  NM N1 -> module 3, 4, 5, ... 250    (100 ms apart)
//!                     answer => module present
//! Reading:   for each present module:
//!              name 2, comment 1-3, serial,
//!              variables 1-12, regulators 1-2,
//!              LEDs -> relays + analogs | status block
//! ```
//!
//! The scanner only uses the driver's command API. While it runs, reports
//! from discovered modules are collected in their [`PartialDevice`] instead
//! of being broadcast.

// ============================================================================
// Submodules
// ============================================================================

/// Scan procedure.
mod scan;

/// Scan bookkeeping.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use scan::{DEFAULT_MODULE_HIGH, DEFAULT_MODULE_LOW};
pub use session::{PartialDevice, ScanSession};
