//! Acknowledgement taxonomy.
//!
//! Modules answer `!`-flagged commands with `-Msssmmm!` on success or
//! `-Msssmmmccc` carrying a three-digit error code.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Serialize, Serializer};

// ============================================================================
// AckError
// ============================================================================

/// Reason a module refused a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckError {
    /// Code 5.
    Unknown,
    /// Code 6.
    ParameterCount,
    /// Code 7.
    ParameterValue,
    /// Code 8.
    NotAllowedNow,
    /// Code 9.
    NotApproved,
    /// Code 10.
    ModuleUnsuitable,
    /// Code 11.
    PeripheryMissing,
    /// Code 12.
    ProgrammingModeRequired,
    /// Code 14.
    FuseBroken,
    /// Any code outside the table.
    Code(u16),
}

impl AckError {
    /// Maps a wire code onto the taxonomy.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            5 => Self::Unknown,
            6 => Self::ParameterCount,
            7 => Self::ParameterValue,
            8 => Self::NotAllowedNow,
            9 => Self::NotApproved,
            10 => Self::ModuleUnsuitable,
            11 => Self::PeripheryMissing,
            12 => Self::ProgrammingModeRequired,
            14 => Self::FuseBroken,
            other => Self::Code(other),
        }
    }

    /// Returns the wire code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Unknown => 5,
            Self::ParameterCount => 6,
            Self::ParameterValue => 7,
            Self::NotAllowedNow => 8,
            Self::NotApproved => 9,
            Self::ModuleUnsuitable => 10,
            Self::PeripheryMissing => 11,
            Self::ProgrammingModeRequired => 12,
            Self::FuseBroken => 14,
            Self::Code(code) => code,
        }
    }

    /// Human-readable description, `None` for untabled codes.
    #[must_use]
    pub const fn description(self) -> Option<&'static str> {
        match self {
            Self::Unknown => Some("Unknown"),
            Self::ParameterCount => Some("Number of parameters wrong"),
            Self::ParameterValue => Some("Value for parameter wrong"),
            Self::NotAllowedNow => Some("Command not allowed at the moment"),
            Self::NotApproved => Some("Not approved according to programming"),
            Self::ModuleUnsuitable => Some("Module unsuitable"),
            Self::PeripheryMissing => Some("Periphery is missing"),
            Self::ProgrammingModeRequired => Some("Programming mode required"),
            Self::FuseBroken => Some("Fuse (230V) broken"),
            Self::Code(_) => None,
        }
    }
}

impl fmt::Display for AckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(text) => f.write_str(text),
            None => write!(f, "{}", self.code()),
        }
    }
}

impl Serialize for AckError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.description() {
            Some(text) => serializer.serialize_str(text),
            None => serializer.serialize_u16(self.code()),
        }
    }
}

// ============================================================================
// AckStatus
// ============================================================================

/// Outcome carried by an acknowledgement frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AckStatus {
    /// Positive acknowledgement.
    Success,
    /// Negative acknowledgement.
    Error(AckError),
}

impl AckStatus {
    /// Returns `true` for a positive acknowledgement.
    #[inline]
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

// ============================================================================
// Tests
// ============================================================================
