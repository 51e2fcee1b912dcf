//! Bus addressing.
//!
//! A target on the LCN bus is a `(segment, module)` pair, or a
//! `(segment, group)` pair for group telegrams. Both numbers render as
//! exactly three zero-padded decimal digits on the wire.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Largest segment or module number the wire grammar can carry.
pub const MAX_ADDRESS: u16 = 255;

// ============================================================================
// Address
// ============================================================================

/// Target of an outgoing frame.
///
/// Values are not validated on construction; [`Address::encode`] rejects
/// anything above [`MAX_ADDRESS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// Segment (subnet) number.
    pub segment: u16,
    /// Module (device) or group number.
    pub module: u16,
    /// Address a group instead of a single module.
    #[serde(default)]
    pub is_group: bool,
}

impl Address {
    /// Creates a module address.
    #[inline]
    #[must_use]
    pub const fn module(segment: u16, module: u16) -> Self {
        Self {
            segment,
            module,
            is_group: false,
        }
    }

    /// Creates a group address.
    #[inline]
    #[must_use]
    pub const fn group(segment: u16, group: u16) -> Self {
        Self {
            segment,
            module: group,
            is_group: true,
        }
    }

    /// Renders `{M|G}sssmmm`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if either number exceeds 255.
    pub fn encode(&self) -> Result<String> {
        Ok(format!(
            "{}{}{}",
            if self.is_group { 'G' } else { 'M' },
            format_number(u32::from(self.segment))?,
            format_number(u32::from(self.module))?
        ))
    }
}

impl fmt::Display for Address {
    /// Human-readable `S000.M005` form used in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "S{:03}.{}{:03}",
            self.segment,
            if self.is_group { 'G' } else { 'M' },
            self.module
        )
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Formats `0..=255` as three zero-padded digits.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] for values above 255.
pub fn format_number(value: u32) -> Result<String> {
    if value > u32::from(MAX_ADDRESS) {
        return Err(Error::invalid_address(value));
    }
    Ok(format!("{value:03}"))
}

// ============================================================================
// Tests
// ============================================================================
