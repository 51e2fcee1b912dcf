//! LCN driver module.
//!
//! This module provides the main entry point for talking to a gateway.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Lcn`] | Driver facade: control, read, scan, events |
//! | [`LcnBuilder`] | Fluent configuration builder |
//! | [`LcnOptions`] | Connection and scan options |
//! | [`ReadOperation`] | Status blocks a read asks for |
//! | [`ModuleReadPlan`] | Per-module flags for batch reads |
//!
//! # Example
//!
//! ```no_run
//! use lcn_pck::{Lcn, ReadOperation, Result};
//!
//! # async fn example() -> Result<()> {
//! let lcn = Lcn::builder()
//!     .host("192.168.1.20")
//!     .credentials("lcn", "lcn")
//!     .build()?;
//!
//! lcn.read(0, 12, ReadOperation::Relays).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for driver configuration.
pub mod builder;

/// Core driver implementation.
pub mod core;

/// Connection and scan options.
pub mod options;

/// Status read plans.
pub mod read;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::LcnBuilder;
pub use core::Lcn;
pub use options::{DEFAULT_PORT, LcnOptions};
pub use read::{ModuleReadPlan, ReadOperation};
