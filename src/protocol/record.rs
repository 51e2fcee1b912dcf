//! Decoded meaning of incoming frames.
//!
//! One incoming line decodes to one or more [`StateRecord`]s; a relay
//! status mask, for example, yields eight boolean records.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Serialize, Serializer};

use super::ack::AckStatus;

// ============================================================================
// RecordType
// ============================================================================

/// What a [`StateRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    /// Command acknowledgement.
    Ack,
    /// Analog output level.
    Analog,
    /// Relay state.
    Relay,
    /// Binary sensor state.
    Sensor,
    /// Sum key state.
    Sum,
    /// LED state.
    Led,
    /// Name or comment fragment.
    Name,
    /// Serial number and identity.
    Serial,
    /// Segment repeater id.
    Repeater,
    /// Shutter motor position.
    Motor,
    /// Variable channel.
    #[serde(rename = "VAR")]
    Variable,
    /// Counter channel.
    Counter,
    /// Unsolicited measure value.
    Measure,
    /// Threshold register.
    Limit,
    /// Regulator set value.
    RegulatorOut,
    /// Regulator lock.
    RegulatorLockOut,
    /// Infrared access code.
    Ir,
    /// Finger scanner code.
    Finger,
}

// ============================================================================
// StateValue
// ============================================================================

/// Status carried by a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StateValue {
    /// On/off style state.
    Bool(bool),
    /// Numeric state.
    Number(f64),
    /// Textual state.
    Text(String),
    /// Acknowledgement outcome.
    Ack(AckStatus),
    /// Record carries all of its data in the detail.
    None,
}

impl StateValue {
    /// Returns the boolean, if this is one.
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the number, if this is one.
    #[inline]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the text, if this is text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

// ============================================================================
// Identity Lookup Tables
// ============================================================================

/// Module manufacturer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Manufacturer(pub u8);

impl Manufacturer {
    /// Known manufacturer name.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            1 => Some("Issendorff"),
            3 => Some("LCNvision (IOS)"),
            16 => Some("BEGA"),
            _ => None,
        }
    }
}

/// Module hardware type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareType(pub u16);

impl HardwareType {
    /// Known hardware name.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            4 | 10 => Some("CMDS-UP"),
            6 => Some("CMDS-PROFIMODUL"),
            7 => Some("CMDS-DI12"),
            8 => Some("CMDS-HU"),
            9 => Some("CMDS-SH"),
            11 => Some("CMDS-UPP"),
            12 => Some("CMDS-SK"),
            14 => Some("CMDS-LD"),
            15 => Some("CMDS-SHplus"),
            17 => Some("CMDS-UPS"),
            18 => Some("CMDS-UP24"),
            19 => Some("IOS-GTM"),
            20 => Some("CMDS-SHS"),
            21 => Some("CMDS-ESD"),
            22 => Some("BEGA-EB2"),
            _ => None,
        }
    }
}

macro_rules! named_code {
    ($ty:ty, $raw:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.name() {
                    Some(name) => f.write_str(name),
                    None => write!(f, "{}", self.0),
                }
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                match self.name() {
                    Some(name) => serializer.serialize_str(name),
                    None => serializer.$raw(self.0),
                }
            }
        }
    };
}

named_code!(Manufacturer, serialize_u8);
named_code!(HardwareType, serialize_u16);

// ============================================================================
// RecordDetail
// ============================================================================

/// Kind-specific fields of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum RecordDetail {
    /// Motor position frame.
    Motor {
        /// Configured limit.
        limit: u16,
        /// Steps counted outwards.
        step_out: u32,
        /// Steps counted inwards.
        step_in: u32,
    },
    /// Serial frame.
    Serial {
        /// Ten-character serial number.
        serial: String,
        /// Manufacturer.
        manufacturer: Manufacturer,
        /// Hardware type.
        hw_type: HardwareType,
        /// Firmware date as `YYYY.MM.DD`.
        fw_version: String,
    },
    /// Name or comment fragment.
    Text {
        /// `true` for a name part, `false` for a comment part.
        is_name: bool,
    },
    /// Segment repeater frame.
    Repeater {
        /// Reported segment id.
        segment_id: u16,
    },
    /// Threshold register frame.
    Limit {
        /// Threshold number inside the register.
        limit: u8,
    },
    /// Infrared remote frame.
    Ir {
        /// Remote serial.
        serial: String,
        /// Key level.
        level: u8,
        /// Key number.
        key: u8,
        /// Remote reports low battery.
        low_bat: bool,
        /// 0 = none, 1 = short, 2 = long.
        action: u8,
    },
    /// Finger scanner frame.
    Finger {
        /// Scanned code.
        serial: String,
    },
}

// ============================================================================
// StateRecord
// ============================================================================

/// Decoded meaning of one incoming line (or part of it).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRecord {
    /// Segment of the reporting module.
    pub segment: u16,
    /// Reporting module.
    pub module: u16,
    /// What the record describes.
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Channel, output or part number, when the frame carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<u16>,
    /// Decoded state.
    pub status: StateValue,
    /// Kind-specific fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<RecordDetail>,
}

impl StateRecord {
    /// Creates a record without kind-specific detail.
    #[inline]
    #[must_use]
    pub fn new(
        segment: u16,
        module: u16,
        record_type: RecordType,
        input: Option<u16>,
        status: StateValue,
    ) -> Self {
        Self {
            segment,
            module,
            record_type,
            input,
            status,
            detail: None,
        }
    }

    /// Attaches kind-specific detail.
    #[inline]
    #[must_use]
    pub fn with_detail(mut self, detail: RecordDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Returns `true` for acknowledgement records.
    #[inline]
    #[must_use]
    pub fn is_ack(&self) -> bool {
        self.record_type == RecordType::Ack
    }
}

// ============================================================================
// Tests
// ============================================================================
