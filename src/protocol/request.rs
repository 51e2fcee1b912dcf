//! Typed outgoing requests.
//!
//! A [`Request`] describes what to ask a module for, independent of its
//! address and of the configured analog mode. [`Codec`](super::Codec)
//! renders it to wire text.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::command::{CommandKind, Detector};

// ============================================================================
// Constants
// ============================================================================

/// Characters per display text frame.
pub const DISPLAY_CHUNK: usize = 12;

/// Display text frames per line.
pub const DISPLAY_PARTS: u8 = 5;

// ============================================================================
// Request Parameters
// ============================================================================

/// Virtual button table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ButtonTable {
    /// Table A.
    A,
    /// Table B.
    B,
    /// Table C.
    C,
    /// Table D.
    D,
}

impl ButtonTable {
    /// Parses `A`..`D`, case-insensitive.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            _ => None,
        }
    }
}

/// How a virtual button is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressKind {
    /// Release (`O`).
    Release,
    /// Short press (`K`).
    Short,
    /// Long press (`L`).
    Long,
}

impl PressKind {
    /// Wire letter.
    #[inline]
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Release => 'O',
            Self::Short => 'K',
            Self::Long => 'L',
        }
    }
}

impl FromStr for PressKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "0" | "release" => Ok(Self::Release),
            "1" | "short" => Ok(Self::Short),
            "2" | "long" => Ok(Self::Long),
            other => Err(Error::invalid_argument(format!(
                "press kind {other:?}, expected release, short or long"
            ))),
        }
    }
}

/// Name or comment text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextField {
    /// Module name (`N`).
    Name,
    /// Module comment (`K`).
    Comment,
}

/// Which status block to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusScope {
    /// Everything (`SMM`).
    All,
    /// Analog outputs (`SMA`).
    Analog,
    /// Relays (`SMR`).
    Relay,
    /// Binary sensors (`SMB`).
    Sensor,
}

// ============================================================================
// Output / ControlValue
// ============================================================================

/// Target of a `control` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Output {
    /// Numbered output, LED, motor, regulator or display line.
    Index(u8),
    /// Virtual button, e.g. `A3`.
    Button {
        /// Table `A`..`D`.
        table: ButtonTable,
        /// Button `1..=8`.
        button: u8,
    },
}

impl Output {
    /// Numeric index, for outputs that are not buttons.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for button targets.
    pub fn index(&self) -> Result<u8> {
        match *self {
            Self::Index(index) => Ok(index),
            Self::Button { .. } => Err(Error::invalid_argument(format!(
                "numeric output expected, got button {self}"
            ))),
        }
    }
}

impl From<u8> for Output {
    #[inline]
    fn from(index: u8) -> Self {
        Self::Index(index)
    }
}

impl FromStr for Output {
    type Err = Error;

    /// Parses `"3"` as an index and `"A3"` as a button.
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(index) = s.parse() {
            return Ok(Self::Index(index));
        }
        let mut chars = s.chars();
        let table = chars.next().and_then(ButtonTable::from_char);
        let button = chars.as_str().parse().ok();
        match (table, button) {
            (Some(table), Some(button)) => Ok(Self::Button { table, button }),
            _ => Err(Error::invalid_argument(format!("output {s:?}"))),
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Button { table, button } => write!(f, "{table:?}{button}"),
        }
    }
}

/// Value passed to `control`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    /// On/off.
    Bool(bool),
    /// Level, position or set value.
    Number(f64),
    /// Display text or a press name.
    Text(String),
}

impl ControlValue {
    /// Interprets the value as on/off.
    #[must_use]
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Number(value) => *value != 0.0,
            Self::Text(text) => !matches!(text.trim(), "" | "0" | "false" | "off"),
        }
    }

    /// Interprets the value as a number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for non-numeric text.
    pub fn as_number(&self) -> Result<f64> {
        match self {
            Self::Bool(value) => Ok(f64::from(u8::from(*value))),
            Self::Number(value) => Ok(*value),
            Self::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| Error::invalid_argument(format!("{text:?} is not a number"))),
        }
    }

    /// Interprets the value as a button press.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for anything but 0/1/2 or
    /// `release`/`short`/`long`.
    pub fn as_press(&self) -> Result<PressKind> {
        match self {
            Self::Number(value) => value.to_string().parse(),
            Self::Text(text) => text.trim().parse(),
            Self::Bool(_) => Err(Error::invalid_argument("press kind expected, got boolean")),
        }
    }

    /// Text form, used by display control.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Bool(value) => value.to_string(),
            Self::Number(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

impl From<bool> for ControlValue {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for ControlValue {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for ControlValue {
    #[inline]
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for ControlValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ControlValue {
    #[inline]
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<PressKind> for ControlValue {
    #[inline]
    fn from(value: PressKind) -> Self {
        Self::Text(
            match value {
                PressKind::Release => "release",
                PressKind::Short => "short",
                PressKind::Long => "long",
            }
            .to_string(),
        )
    }
}

// ============================================================================
// Request
// ============================================================================

/// Outgoing request, independent of address and analog mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Dim an analog output (`A{o}DI`).
    Analog {
        /// Output `1..=4`.
        output: u8,
        /// Level in the 0-100 domain; clamped on encode.
        level: f64,
        /// Ramp time; clamped to `0..=255` on encode.
        ramp: f64,
    },
    /// Switch one relay (`R8`).
    Relay {
        /// Relay `1..=8`.
        output: u8,
        /// Target state.
        on: bool,
    },
    /// Drive a shutter motor (`R8M{m}GO{pos}`).
    Motor {
        /// Motor `1..=4`.
        motor: u8,
        /// Position, clamped to `0..=100` on encode.
        position: i64,
    },
    /// Press a virtual button (`TS`).
    Button {
        /// Table `A`..`D`.
        table: ButtonTable,
        /// Button `1..=8`.
        button: u8,
        /// Press kind.
        press: PressKind,
    },
    /// Set an LED (`LA`).
    Led {
        /// LED `1..=12`.
        led: u8,
        /// Target state.
        on: bool,
    },
    /// Read LED states (`SMT`).
    GetLeds,
    /// Read a name or comment part (`NM`).
    GetText {
        /// Name or comment.
        field: TextField,
        /// Part number.
        part: u8,
    },
    /// Read serial and identity (`SN`).
    GetSerial,
    /// Ask segment repeaters for their id (`G…SK`).
    GetSegmentRepeater {
        /// All segments instead of the own one.
        all_segments: bool,
        /// Group id.
        group: u16,
    },
    /// Read a status block.
    GetStatus(StatusScope),
    /// Read a variable (`MWT`).
    GetVariable(u8),
    /// Read a counter (`MWC`).
    GetCounter(u8),
    /// Read a regulator set value (`MWS`).
    GetSetValue(u8),
    /// Read a threshold register (`SE`).
    GetLimit(u8),
    /// Write a regulator set value (`RE{A|B}SSE`).
    SetRegulator {
        /// Regulator `1..=2`.
        regulator: u8,
        /// Set value.
        value: f64,
    },
    /// Lock or unlock a regulator (`RE{A|B}X`).
    LockRegulator {
        /// Regulator `1..=2`.
        regulator: u8,
        /// Target lock state.
        locked: bool,
    },
    /// Write one display text frame (`GTDT`).
    SetDisplay {
        /// Display line.
        line: u8,
        /// Frame number; `None` clears the line.
        part: Option<u8>,
        /// Up to [`DISPLAY_CHUNK`] characters.
        text: String,
    },
}

impl Request {
    /// Registry kind this request belongs to.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Analog { .. } => CommandKind::AnalogOut,
            Self::Relay { .. } => CommandKind::RelayOut,
            Self::Motor { .. } => CommandKind::Motor,
            Self::Button { .. } => CommandKind::Button,
            Self::Led { .. } => CommandKind::LedOut,
            Self::GetLeds => CommandKind::LedIn,
            Self::GetText { .. } => CommandKind::Name,
            Self::GetSerial => CommandKind::Serial,
            Self::GetSegmentRepeater { .. } => CommandKind::Repeater,
            Self::GetStatus(StatusScope::All) => CommandKind::StatusAll,
            Self::GetStatus(StatusScope::Analog) => CommandKind::StatusA,
            Self::GetStatus(StatusScope::Relay) => CommandKind::StatusR,
            Self::GetStatus(StatusScope::Sensor) => CommandKind::StatusS,
            Self::GetVariable(_) => CommandKind::Var,
            Self::GetCounter(_) => CommandKind::Counter,
            Self::GetSetValue(_) => CommandKind::Regulator,
            Self::GetLimit(_) => CommandKind::Limit,
            Self::SetRegulator { .. } => CommandKind::RegulatorOut,
            Self::LockRegulator { .. } => CommandKind::RegulatorLockOut,
            Self::SetDisplay { .. } => CommandKind::DisplayOut,
        }
    }

    /// Returns `true` if the frame asks the module for an acknowledgement.
    #[must_use]
    pub const fn requests_ack(&self) -> bool {
        matches!(
            self,
            Self::Analog { .. }
                | Self::Relay { .. }
                | Self::Button { .. }
                | Self::Led { .. }
        )
    }

    /// Pattern a reply must match to complete this request.
    #[inline]
    #[must_use]
    pub const fn acceptance(&self) -> Detector {
        self.kind().detector()
    }

    /// Builds the request behind `control(kind, output, value)`.
    ///
    /// Display text is not handled here; it needs several frames, see
    /// [`Request::display`].
    ///
    /// # Errors
    ///
    /// - [`Error::NotControllable`] if `kind` has no encoder
    /// - [`Error::InvalidArgument`] if `output` or `value` do not fit `kind`
    pub fn control(kind: CommandKind, output: &Output, value: &ControlValue) -> Result<Self> {
        match kind {
            CommandKind::AnalogOut | CommandKind::AnalogIn => Ok(Self::Analog {
                output: output.index()?,
                level: value.as_number()?,
                ramp: 0.0,
            }),
            CommandKind::RelayOut => Ok(Self::Relay {
                output: output.index()?,
                on: value.as_bool(),
            }),
            CommandKind::RegulatorOut => Ok(Self::SetRegulator {
                regulator: output.index()?,
                value: value.as_number()?,
            }),
            CommandKind::RegulatorLockOut => Ok(Self::LockRegulator {
                regulator: output.index()?,
                locked: value.as_bool(),
            }),
            CommandKind::Motor => Ok(Self::Motor {
                motor: output.index()?,
                position: value.as_number()?.trunc() as i64,
            }),
            CommandKind::Button => match *output {
                Output::Button { table, button } => Ok(Self::Button {
                    table,
                    button,
                    press: value.as_press()?,
                }),
                Output::Index(_) => Err(Error::invalid_argument(format!(
                    "button output must look like A1..D8, got {output}"
                ))),
            },
            CommandKind::LedOut => Ok(Self::Led {
                led: output.index()?,
                on: value.as_bool(),
            }),
            CommandKind::DisplayOut => Err(Error::invalid_argument(
                "display text is sent through Request::display",
            )),
            other => Err(Error::NotControllable {
                kind: other.key().to_string(),
            }),
        }
    }

    /// Splits display text into the frames that write it.
    #[inline]
    #[must_use]
    pub fn display(line: u8, text: &str) -> DisplayFrames {
        DisplayFrames::new(line, text)
    }
}

// ============================================================================
// DisplayFrames
// ============================================================================

/// Successive [`Request::SetDisplay`] frames for one display line.
///
/// Frames carry [`DISPLAY_CHUNK`] characters each, numbered `1..=5`. A
/// frame follows while text remains or the previous frame was exactly full,
/// so text whose length is a multiple of the chunk size ends with an empty
/// frame. Empty text yields a single part-less frame that clears the line.
#[derive(Debug, Clone)]
pub struct DisplayFrames {
    line: u8,
    rest: Vec<char>,
    next_part: u8,
    previous_len: usize,
    clear: bool,
}

impl DisplayFrames {
    fn new(line: u8, text: &str) -> Self {
        Self {
            line,
            rest: text.chars().collect(),
            next_part: 1,
            previous_len: 0,
            clear: text.is_empty(),
        }
    }
}

impl Iterator for DisplayFrames {
    type Item = Request;

    fn next(&mut self) -> Option<Request> {
        if self.clear {
            self.clear = false;
            self.next_part = DISPLAY_PARTS + 1;
            return Some(Request::SetDisplay {
                line: self.line,
                part: None,
                text: String::new(),
            });
        }
        if self.next_part > DISPLAY_PARTS {
            return None;
        }
        let first = self.next_part == 1;
        if !first && self.rest.is_empty() && self.previous_len != DISPLAY_CHUNK {
            return None;
        }

        let take = self.rest.len().min(DISPLAY_CHUNK);
        let chunk: String = self.rest.drain(..take).collect();
        let part = self.next_part;
        self.next_part += 1;
        self.previous_len = take;

        Some(Request::SetDisplay {
            line: self.line,
            part: Some(part),
            text: chunk,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(text: &str) -> Vec<(Option<u8>, String)> {
        Request::display(1, text)
            .map(|request| match request {
                Request::SetDisplay { part, text, .. } => (part, text),
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_output_parse() {
        assert_eq!("3".parse::<Output>().unwrap(), Output::Index(3));
        assert_eq!(
            "b7".parse::<Output>().unwrap(),
            Output::Button {
                table: ButtonTable::B,
                button: 7
            }
        );
        assert!("Z1".parse::<Output>().is_err());
        assert!("".parse::<Output>().is_err());
    }

    #[test]
    fn test_press_kind_parse() {
        assert_eq!("short".parse::<PressKind>().unwrap(), PressKind::Short);
        assert_eq!(ControlValue::Number(2.0).as_press().unwrap(), PressKind::Long);
        assert_eq!(ControlValue::Number(0.0).as_press().unwrap(), PressKind::Release);
        assert!(ControlValue::Bool(true).as_press().is_err());
    }

    #[test]
    fn test_value_coercion() {
        assert!(ControlValue::Number(1.0).as_bool());
        assert!(!ControlValue::Text("false".into()).as_bool());
        assert_eq!(ControlValue::Text(" 42 ".into()).as_number().unwrap(), 42.0);
        assert_eq!(ControlValue::Bool(true).as_number().unwrap(), 1.0);
        assert!(ControlValue::Text("x".into()).as_number().is_err());
    }

    #[test]
    fn test_control_relay() {
        let request =
            Request::control(CommandKind::RelayOut, &Output::Index(3), &ControlValue::Bool(true))
                .unwrap();
        assert_eq!(request, Request::Relay { output: 3, on: true });
        assert!(request.requests_ack());
        assert_eq!(request.acceptance(), Detector::Ack);
    }

    #[test]
    fn test_control_button_needs_table() {
        let err = Request::control(CommandKind::Button, &Output::Index(3), &"short".into());
        assert!(matches!(err, Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn test_control_rejects_read_kinds() {
        let err = Request::control(CommandKind::Serial, &Output::Index(1), &ControlValue::Bool(true));
        assert!(matches!(err, Err(Error::NotControllable { ref kind }) if kind == "SERIAL"));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Request::GetStatus(StatusScope::Relay).kind(), CommandKind::StatusR);
        assert_eq!(Request::GetSetValue(1).kind(), CommandKind::Regulator);
        assert_eq!(Request::GetSetValue(1).acceptance(), Detector::SetValues);
        assert!(!Request::GetSerial.requests_ack());
    }

    #[test]
    fn test_display_short_text() {
        assert_eq!(parts("Hello"), vec![(Some(1), "Hello".to_string())]);
    }

    #[test]
    fn test_display_exact_chunk_sends_trailing_empty_frame() {
        assert_eq!(
            parts("ABCDEFGHIJKL"),
            vec![(Some(1), "ABCDEFGHIJKL".to_string()), (Some(2), String::new())]
        );
    }

    #[test]
    fn test_display_multi_chunk() {
        let frames = parts("ABCDEFGHIJKLmnop");
        assert_eq!(
            frames,
            vec![(Some(1), "ABCDEFGHIJKL".to_string()), (Some(2), "mnop".to_string())]
        );
    }

    #[test]
    fn test_display_caps_at_five_parts() {
        let frames = parts(&"x".repeat(100));
        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(|(_, text)| text.len() == 12));
    }

    #[test]
    fn test_display_counts_chars_not_bytes() {
        let frames = parts("äöüäöüäöüäöüß");
        assert_eq!(frames[0].1.chars().count(), 12);
        assert_eq!(frames[1].1, "ß");
    }

    #[test]
    fn test_display_empty_clears() {
        assert_eq!(parts(""), vec![(None, String::new())]);
    }
}
