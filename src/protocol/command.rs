//! Command kind registry.
//!
//! Every kind the gateway understands is a [`CommandKind`] variant. Each kind
//! names a [`Detector`], the pattern that recognises its incoming frames,
//! and the detector in turn selects the fixed-width decoder.
//!
//! # Detection Order
//!
//! [`CommandKind::identify`] walks [`CommandKind::ALL`] and returns the
//! first kind whose detector matches. Detectors are mutually exclusive, so
//! the order only decides which of several kinds sharing one detector
//! reports the line.
//!
//! | Detector | Frame |
//! |----------|-------|
//! | `Ack` | `-Msssmmm!`, `-Msssmmmccc` |
//! | `Status` | `:Msssmmm[.]A…`, `R…`, `B…` |
//! | `Sum` | `:MsssmmmSkddd` |
//! | `Leds` | `=Msssmmm.TL…` |
//! | `NameComment` | `=Msssmmm.N1…`, `.K1…` |
//! | `Serial` | `=Msssmmm.SN…` |
//! | `Motor` | `=Msssmmm.RM…` |
//! | `SegmentRepeater` | `=Msssmmm.SKnnn` |
//! | `Ir` / `Finger` | `=Msssmmm.ZI…`, `.ZT…` |
//! | `Variables` / `Counters` | `%Msssmmm.A…`, `.C…` |
//! | `Measure` | `%Msssmmm.ddddd` |
//! | `Limits` | `%Msssmmm.Trl…` |
//! | `SetValues` | `%Msssmmm.Scvvvvv` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

use super::decode;
use super::record::StateRecord;

// ============================================================================
// Detector
// ============================================================================

/// Pattern recognising one family of incoming frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Detector {
    /// Positive or negative acknowledgement.
    Ack,
    /// Shutter motor positions.
    Motor,
    /// LED states.
    Leds,
    /// Name or comment fragment.
    NameComment,
    /// Segment repeater id.
    SegmentRepeater,
    /// Analog, relay or binary sensor status.
    Status,
    /// Sum key status.
    Sum,
    /// Infrared access code.
    Ir,
    /// Finger scanner code.
    Finger,
    /// Variable channel.
    Variables,
    /// Counter channel.
    Counters,
    /// Measure value.
    Measure,
    /// Threshold register.
    Limits,
    /// Regulator set value.
    SetValues,
    /// Serial and identity.
    Serial,
}

/// Compiled patterns, indexed by `Detector as usize`.
static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    Detector::ALL
        .iter()
        .map(|detector| Regex::new(detector.pattern()).expect("detector pattern must compile"))
        .collect()
});

impl Detector {
    /// All detectors in declaration order.
    pub const ALL: [Self; 15] = [
        Self::Ack,
        Self::Motor,
        Self::Leds,
        Self::NameComment,
        Self::SegmentRepeater,
        Self::Status,
        Self::Sum,
        Self::Ir,
        Self::Finger,
        Self::Variables,
        Self::Counters,
        Self::Measure,
        Self::Limits,
        Self::SetValues,
        Self::Serial,
    ];

    /// Regular expression source.
    #[must_use]
    pub const fn pattern(self) -> &'static str {
        match self {
            Self::Ack => r"^-M\d{6}!$|^-M\d{9}$",
            Self::Motor => r"^=M\d{6}\.RM",
            Self::Leds => r"^=M\d{6}\.TL",
            Self::NameComment => r"^=M\d{6}\.[NK]\d",
            Self::SegmentRepeater => r"^=[MG]\d{6}\.SK\d{3}",
            Self::Status => r"^:M\d{6}\.?[ARB]",
            Self::Sum => r"^:M\d{6}\.?S\d{4}",
            Self::Ir => r"^=M\d{6}\.ZI",
            Self::Finger => r"^=M\d{6}\.ZT",
            Self::Variables => r"^%M\d{6}\.A",
            Self::Counters => r"^%M\d{6}\.C",
            Self::Measure => r"^%M\d{6}\.\d",
            Self::Limits => r"^%M\d{6}\.T\d\d",
            Self::SetValues => r"^%M\d{6}\.S\d{6}$",
            Self::Serial => r"^=M\d{6}\.SN",
        }
    }

    /// Compiled pattern.
    #[inline]
    #[must_use]
    pub fn regex(self) -> &'static Regex {
        &PATTERNS[self as usize]
    }

    /// Returns `true` if `line` belongs to this frame family.
    #[inline]
    #[must_use]
    pub fn is_match(self, line: &str) -> bool {
        self.regex().is_match(line)
    }

    /// Decodes a line of this family.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if a fixed-width field is missing or
    /// malformed.
    pub fn decode(self, line: &str) -> Result<Vec<StateRecord>> {
        match self {
            Self::Ack => decode::parse_ack(line),
            Self::Motor => decode::parse_motor(line),
            Self::Leds => decode::parse_leds(line),
            Self::NameComment => decode::parse_text(line),
            Self::SegmentRepeater => decode::parse_repeater(line),
            Self::Status | Self::Sum => decode::parse_status(line),
            Self::Ir => decode::parse_ir(line),
            Self::Finger => decode::parse_finger(line),
            Self::Variables | Self::Counters | Self::Measure => decode::parse_variables(line),
            Self::Limits => decode::parse_limits(line),
            Self::SetValues => decode::parse_set_value(line),
            Self::Serial => decode::parse_serial(line),
        }
    }
}

// ============================================================================
// CommandKind
// ============================================================================

/// One entry of the gateway command registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Dim an analog output.
    AnalogOut,
    /// Analog output, reported side.
    AnalogIn,
    /// Binary sensor inputs.
    SensorIn,
    /// Switch a relay.
    RelayOut,
    /// Relay states.
    RelayIn,
    /// Write a regulator set value.
    RegulatorOut,
    /// Read a regulator set value.
    Regulator,
    /// Lock or unlock a regulator.
    RegulatorLockOut,
    /// Write display text.
    DisplayOut,
    /// Drive a shutter motor.
    Motor,
    /// Press a virtual button.
    Button,
    /// Set an LED.
    LedOut,
    /// Read LED states.
    LedIn,
    /// Read name or comment.
    Name,
    /// Read serial and identity.
    Serial,
    /// Read segment repeater id.
    Repeater,
    /// Read all status.
    StatusAll,
    /// Read relay status.
    StatusR,
    /// Read binary sensor status.
    StatusS,
    /// Read analog status.
    StatusA,
    /// Read a variable.
    Var,
    /// Read a counter.
    Counter,
    /// Unsolicited measure value.
    Measure,
    /// Sum key status.
    Sum,
    /// Infrared access code.
    Ir,
    /// Finger scanner code.
    FingerScan,
    /// Read a threshold register.
    Limit,
}

/// Registry keys mapped to kinds.
static BY_KEY: LazyLock<FxHashMap<&'static str, CommandKind>> = LazyLock::new(|| {
    CommandKind::ALL
        .iter()
        .map(|&kind| (kind.key(), kind))
        .collect()
});

impl CommandKind {
    /// Registry in detection order.
    pub const ALL: [Self; 27] = [
        Self::AnalogOut,
        Self::AnalogIn,
        Self::SensorIn,
        Self::RelayOut,
        Self::RelayIn,
        Self::RegulatorOut,
        Self::Regulator,
        Self::RegulatorLockOut,
        Self::DisplayOut,
        Self::Motor,
        Self::Button,
        Self::LedOut,
        Self::LedIn,
        Self::Name,
        Self::Serial,
        Self::Repeater,
        Self::StatusAll,
        Self::StatusR,
        Self::StatusS,
        Self::StatusA,
        Self::Var,
        Self::Counter,
        Self::Measure,
        Self::Sum,
        Self::Ir,
        Self::FingerScan,
        Self::Limit,
    ];

    /// Registry key, e.g. `RELAY_OUT`.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::AnalogOut => "ANALOG_OUT",
            Self::AnalogIn => "ANALOG_IN",
            Self::SensorIn => "SENSOR_IN",
            Self::RelayOut => "RELAY_OUT",
            Self::RelayIn => "RELAY_IN",
            Self::RegulatorOut => "REGULATOR_OUT",
            Self::Regulator => "REGULATOR",
            Self::RegulatorLockOut => "REGULATOR_LOCK_OUT",
            Self::DisplayOut => "DISPLAY_OUT",
            Self::Motor => "MOTOR",
            Self::Button => "BUTTON",
            Self::LedOut => "LED_OUT",
            Self::LedIn => "LED_IN",
            Self::Name => "NAME",
            Self::Serial => "SERIAL",
            Self::Repeater => "REPEATER",
            Self::StatusAll => "STATUS_ALL",
            Self::StatusR => "STATUS_R",
            Self::StatusS => "STATUS_S",
            Self::StatusA => "STATUS_A",
            Self::Var => "VAR",
            Self::Counter => "COUNTER",
            Self::Measure => "MEASURE",
            Self::Sum => "SUM",
            Self::Ir => "IR",
            Self::FingerScan => "FINGER_SCAN",
            Self::Limit => "LIMIT",
        }
    }

    /// Display name; several kinds share one.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AnalogOut | Self::AnalogIn => "ANALOG",
            Self::SensorIn => "SENSOR",
            Self::RelayOut => "RELAY_OUT",
            Self::RelayIn => "RELAY",
            Self::RegulatorOut => "REGULATOR_OUT",
            Self::Regulator => "REGULATOR",
            Self::RegulatorLockOut => "REGULATOR_LOCK_OUT",
            Self::DisplayOut => "DISPLAY_OUT",
            Self::Motor => "MOTOR",
            Self::Button => "BUTTON",
            Self::LedOut | Self::LedIn => "LED",
            Self::Name => "NAME",
            Self::Serial => "SERIAL",
            Self::Repeater => "REPEATER",
            Self::StatusAll | Self::StatusR | Self::StatusS | Self::StatusA => "STATUS",
            Self::Var => "VAR",
            Self::Counter => "COUNTER",
            Self::Measure => "MEASURE",
            Self::Sum => "SUM",
            Self::Ir => "IR",
            Self::FingerScan => "FINGER",
            Self::Limit => "LIMIT",
        }
    }

    /// Pattern recognising replies and reports of this kind.
    #[must_use]
    pub const fn detector(self) -> Detector {
        match self {
            Self::AnalogOut
            | Self::AnalogIn
            | Self::RelayOut
            | Self::DisplayOut
            | Self::Button
            | Self::LedOut => Detector::Ack,
            Self::SensorIn
            | Self::RelayIn
            | Self::StatusAll
            | Self::StatusR
            | Self::StatusS
            | Self::StatusA => Detector::Status,
            Self::RegulatorOut | Self::Regulator | Self::RegulatorLockOut => Detector::SetValues,
            Self::Motor => Detector::Motor,
            Self::LedIn => Detector::Leds,
            Self::Name => Detector::NameComment,
            Self::Serial => Detector::Serial,
            Self::Repeater => Detector::SegmentRepeater,
            Self::Var => Detector::Variables,
            Self::Counter => Detector::Counters,
            Self::Measure => Detector::Measure,
            Self::Sum => Detector::Sum,
            Self::Ir => Detector::Ir,
            Self::FingerScan => Detector::Finger,
            Self::Limit => Detector::Limits,
        }
    }

    /// Returns `true` if the kind accepts a value through `control`.
    #[must_use]
    pub const fn is_controllable(self) -> bool {
        matches!(
            self,
            Self::AnalogOut
                | Self::AnalogIn
                | Self::RelayOut
                | Self::RegulatorOut
                | Self::RegulatorLockOut
                | Self::DisplayOut
                | Self::Motor
                | Self::Button
                | Self::LedOut
        )
    }

    /// Returns `true` if `line` matches this kind's detector.
    #[inline]
    #[must_use]
    pub fn detect(self, line: &str) -> bool {
        self.detector().is_match(line)
    }

    /// Decodes `line` with this kind's decoder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for malformed frames.
    #[inline]
    pub fn decode(self, line: &str) -> Result<Vec<StateRecord>> {
        self.detector().decode(line)
    }

    /// First kind in registry order whose detector matches.
    #[must_use]
    pub fn identify(line: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.detect(line))
    }

    /// Looks a kind up by registry key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        BY_KEY.get(key).copied()
    }

    /// Looks a kind up by key, falling back to `{name}_OUT`.
    ///
    /// `"RELAY"` is not a key, so it resolves to [`CommandKind::RelayOut`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCommand`] if neither form is registered.
    pub fn resolve(name: &str) -> Result<Self> {
        Self::from_key(name)
            .or_else(|| Self::from_key(&format!("{name}_OUT")))
            .ok_or_else(|| Error::UnknownCommand {
                command: name.to_string(),
            })
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for CommandKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}

impl Serialize for CommandKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

// ============================================================================
// Tests
// ============================================================================
