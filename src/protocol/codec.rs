//! Wire encoding and line decoding.
//!
//! [`Codec`] carries the analog mode negotiated with the gateway, so level
//! scaling never depends on shared state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::{Address, format_number};

use super::command::CommandKind;
use super::record::StateRecord;
use super::request::{ButtonTable, Request, StatusScope, TextField};

// ============================================================================
// AnalogMode
// ============================================================================

/// Numeric domain of analog output levels on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AnalogMode {
    /// 0-100 % mapped onto 0..50 (`!OM0P`).
    #[default]
    Iob100ToLcn50,
    /// 0-50 native (`!OM0N`).
    Iob50ToLcn50,
    /// 0-100 % mapped onto 0..200 (`!OM1P`).
    Iob100ToLcn200,
    /// 0-200 native (`!OM1N`).
    Iob200ToLcn200,
}

impl AnalogMode {
    /// Gateway command selecting this mode.
    #[must_use]
    pub const fn setup_command(self) -> &'static str {
        match self {
            Self::Iob100ToLcn50 => "!OM0P",
            Self::Iob50ToLcn50 => "!OM0N",
            Self::Iob100ToLcn200 => "!OM1P",
            Self::Iob200ToLcn200 => "!OM1N",
        }
    }

    /// Gateway answer confirming this mode.
    #[must_use]
    pub const fn setup_answer(self) -> &'static str {
        match self {
            Self::Iob100ToLcn50 => "(0..50-mode percent)",
            Self::Iob50ToLcn50 => "(0..50-mode native)",
            Self::Iob100ToLcn200 => "(0..200-mode percent)",
            Self::Iob200ToLcn200 => "(0..200-mode native)",
        }
    }
}

impl TryFrom<u8> for AnalogMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Iob100ToLcn50),
            2 => Ok(Self::Iob50ToLcn50),
            3 => Ok(Self::Iob100ToLcn200),
            4 => Ok(Self::Iob200ToLcn200),
            other => Err(Error::config(format!("analog mode must be 1-4, got {other}"))),
        }
    }
}

impl From<AnalogMode> for u8 {
    fn from(mode: AnalogMode) -> Self {
        match mode {
            AnalogMode::Iob100ToLcn50 => 1,
            AnalogMode::Iob50ToLcn50 => 2,
            AnalogMode::Iob100ToLcn200 => 3,
            AnalogMode::Iob200ToLcn200 => 4,
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Encoder and decoder for one gateway session.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    analog_mode: AnalogMode,
}

impl Codec {
    /// Creates a codec for the given analog mode.
    #[inline]
    #[must_use]
    pub const fn new(analog_mode: AnalogMode) -> Self {
        Self { analog_mode }
    }

    /// Configured analog mode.
    #[inline]
    #[must_use]
    pub const fn analog_mode(&self) -> AnalogMode {
        self.analog_mode
    }

    /// Clamps a 0-100 level and scales it into the native domain.
    #[must_use]
    pub fn analog_level(&self, level: f64) -> u32 {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 100.0) };
        let native = match self.analog_mode {
            AnalogMode::Iob200ToLcn200 => level * 2.0,
            AnalogMode::Iob50ToLcn50 => (level / 2.0).round(),
            AnalogMode::Iob100ToLcn50 | AnalogMode::Iob100ToLcn200 => level,
        };
        native.trunc() as u32
    }

    /// Clamps a ramp time to `0..=255`.
    #[must_use]
    pub fn ramp_time(time: f64) -> u32 {
        if time.is_nan() {
            return 0;
        }
        time.clamp(0.0, 255.0).trunc() as u32
    }

    /// Renders `request` for `address`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] if the address or a three-digit field
    ///   exceeds 255
    /// - [`Error::InvalidArgument`] if an output number is out of range
    pub fn encode(&self, address: &Address, request: &Request) -> Result<String> {
        let mut frame = format!(
            ">{}{}",
            address.encode()?,
            if request.requests_ack() { '!' } else { '.' }
        );

        match request {
            Request::Analog {
                output,
                level,
                ramp,
            } => {
                check_range("analog output", *output, 1, 4)?;
                let _ = write!(
                    frame,
                    "A{output}DI{}{}",
                    format_number(self.analog_level(*level))?,
                    format_number(Self::ramp_time(*ramp))?
                );
            }
            Request::Relay { output, on } => {
                check_range("relay output", *output, 1, 8)?;
                frame.push_str("R8");
                frame.extend((1..=8).map(|relay| match (relay == *output, *on) {
                    (true, true) => '1',
                    (true, false) => '0',
                    (false, _) => '-',
                }));
            }
            Request::Motor { motor, position } => {
                check_range("motor", *motor, 1, u8::MAX)?;
                let motor = match *motor {
                    3 => 5,
                    4 => 6,
                    m if m > 8 => 0,
                    m => m,
                };
                let _ = write!(frame, "R8M{motor}GO{}", (*position).clamp(0, 100));
            }
            Request::Button {
                table,
                button,
                press,
            } => {
                check_range("button", *button, 1, 8)?;
                let code = press.code();
                let _ = match table {
                    ButtonTable::A => write!(frame, "TS{code}--"),
                    ButtonTable::B => write!(frame, "TS-{code}-"),
                    ButtonTable::C => write!(frame, "TS--{code}"),
                    ButtonTable::D => write!(frame, "TS---{code}"),
                };
                frame.extend((1..=8).map(|b| if b == *button { '1' } else { '0' }));
            }
            Request::Led { led, on } => {
                check_range("LED", *led, 1, 12)?;
                let _ = write!(
                    frame,
                    "LA{}{}",
                    format_number(u32::from(*led))?,
                    if *on { 'E' } else { 'A' }
                );
            }
            Request::GetLeds => frame.push_str("SMT"),
            Request::GetText { field, part } => {
                let field = match field {
                    TextField::Name => 'N',
                    TextField::Comment => 'K',
                };
                let _ = write!(frame, "NM{field}{part}");
            }
            Request::GetSerial => frame.push_str("SN"),
            Request::GetSegmentRepeater {
                all_segments,
                group,
            } => {
                let _ = write!(
                    frame,
                    "G{}{}.SK",
                    if *all_segments { "003" } else { "000" },
                    format_number(u32::from(*group))?
                );
            }
            Request::GetStatus(scope) => frame.push_str(match scope {
                StatusScope::All => "SMM",
                StatusScope::Analog => "SMA",
                StatusScope::Relay => "SMR",
                StatusScope::Sensor => "SMB",
            }),
            Request::GetVariable(n) => {
                let _ = write!(frame, "MWT{n}");
            }
            Request::GetCounter(n) => {
                let _ = write!(frame, "MWC{n}");
            }
            Request::GetSetValue(n) => {
                let _ = write!(frame, "MWS{n}");
            }
            Request::GetLimit(n) => {
                let _ = write!(frame, "SE{n}");
            }
            Request::SetRegulator { regulator, value } => {
                check_range("regulator", *regulator, 1, 2)?;
                let raw = (1000.0 + value * 10.0).trunc();
                if !(0.0..=f64::from(0x7FFF)).contains(&raw) {
                    return Err(Error::invalid_argument(format!(
                        "regulator value {value} out of range"
                    )));
                }
                let _ = write!(
                    frame,
                    "RE{}SSE{:05}",
                    regulator_letter(*regulator),
                    raw as u32
                );
            }
            Request::LockRegulator { regulator, locked } => {
                check_range("regulator", *regulator, 1, 2)?;
                let _ = write!(
                    frame,
                    "RE{}X{}",
                    regulator_letter(*regulator),
                    if *locked { 'S' } else { 'A' }
                );
            }
            Request::SetDisplay { line, part, text } => {
                let _ = write!(frame, "GTDT{line}");
                if let Some(part) = part {
                    let _ = write!(frame, "{part}{text}");
                }
            }
        }

        trace!(%address, frame = %frame, "Encoded request");
        Ok(frame)
    }

    /// Identifies and decodes an incoming line.
    ///
    /// Returns `None` if no detector recognises the line.
    #[must_use]
    pub fn decode(&self, line: &str) -> Option<(CommandKind, Result<Vec<StateRecord>>)> {
        let kind = CommandKind::identify(line)?;
        Some((kind, kind.decode(line)))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Rejects numbers outside `low..=high`.
fn check_range(what: &str, value: u8, low: u8, high: u8) -> Result<()> {
    if (low..=high).contains(&value) {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "{what} {value} out of range {low}-{high}"
        )))
    }
}

#[inline]
fn regulator_letter(regulator: u8) -> char {
    if regulator == 1 { 'A' } else { 'B' }
}

// ============================================================================
// Tests
// ============================================================================
