//! Fixed-width frame decoders.
//!
//! Incoming frames carry no delimiters inside the payload; every decoder
//! reads specific character offsets. Offsets are documented above each
//! decoder with a column ruler.

// ============================================================================
// Imports
// ============================================================================

use std::ops::{Range, RangeFrom};
use std::str::FromStr;

use crate::error::{Error, Result};

use super::ack::{AckError, AckStatus};
use super::record::{
    HardwareType, Manufacturer, RecordDetail, RecordType, StateRecord, StateValue,
};

// ============================================================================
// Field Helpers
// ============================================================================

/// Returns `line[range]` or a parse error.
fn field<R>(line: &str, range: R) -> Result<&str>
where
    R: std::slice::SliceIndex<str, Output = str> + Clone + std::fmt::Debug,
{
    line.get(range.clone())
        .ok_or_else(|| Error::parse(line, format!("frame too short for {range:?}")))
}

/// Parses a fixed-width decimal field.
fn number<T: FromStr>(line: &str, range: Range<usize>) -> Result<T> {
    let raw = field(line, range.clone())?;
    raw.parse()
        .map_err(|_| Error::parse(line, format!("{raw:?} at {range:?} is not a number")))
}

/// Parses a fixed-width hexadecimal field.
fn hex(line: &str, range: Range<usize>) -> Result<u32> {
    let raw = field(line, range.clone())?;
    u32::from_str_radix(raw, 16)
        .map_err(|_| Error::parse(line, format!("{raw:?} at {range:?} is not hex")))
}

/// Parses the leading digits of the tail, ignoring trailing garbage.
fn leading(line: &str, range: RangeFrom<usize>) -> Result<i64> {
    let raw = field(line, range.clone())?;
    let end = raw
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map_or(raw.len(), |(i, _)| i);
    raw[..end]
        .parse()
        .map_err(|_| Error::parse(line, format!("no number at {range:?}")))
}

/// Reads a single decimal digit.
fn digit(line: &str, index: usize) -> Result<u16> {
    number(line, index..index + 1)
}

/// Returns the character at `index`.
fn char_at(line: &str, index: usize) -> Result<char> {
    line.get(index..)
        .and_then(|tail| tail.chars().next())
        .ok_or_else(|| Error::parse(line, format!("frame too short for index {index}")))
}

/// Reads the `sssmmm` address every incoming frame carries at `2..8`.
fn address(line: &str) -> Result<(u16, u16)> {
    Ok((number(line, 2..5)?, number(line, 5..8)?))
}

/// Drops the first `.`; some status frames send it, some don't.
fn without_dot(line: &str) -> String {
    line.replacen('.', "", 1)
}

// ============================================================================
// Acknowledgement
// ============================================================================

// 0123456789A
// -Msssmmm!
// -Msssmmmccc
pub(crate) fn parse_ack(line: &str) -> Result<Vec<StateRecord>> {
    let (segment, module) = address(line)?;
    let status = if char_at(line, 8)? == '!' {
        AckStatus::Success
    } else {
        AckStatus::Error(AckError::from_code(number(line, 8..11)?))
    };
    Ok(vec![StateRecord::new(
        segment,
        module,
        RecordType::Ack,
        None,
        StateValue::Ack(status),
    )])
}

// ============================================================================
// Status
// ============================================================================

// After removing the optional dot:
// 0123456789ABC
// :MsssmmmAoddd    analog output o, level ddd
// :MsssmmmRxnnn    relay mask
// :MsssmmmBxnnn    binary sensor mask
// :MsssmmmSknnn    sum key k
pub(crate) fn parse_status(line: &str) -> Result<Vec<StateRecord>> {
    let data = without_dot(line);
    let (segment, module) = address(&data)?;

    let mask_records = |record_type: RecordType| -> Result<Vec<StateRecord>> {
        let mask = leading(&data, 10..)?;
        Ok((0..8)
            .map(|bit| {
                StateRecord::new(
                    segment,
                    module,
                    record_type,
                    Some(bit + 1),
                    StateValue::Bool(mask & (1 << bit) != 0),
                )
            })
            .collect())
    };

    match char_at(&data, 8)? {
        'A' => Ok(vec![StateRecord::new(
            segment,
            module,
            RecordType::Analog,
            Some(digit(&data, 9)?),
            StateValue::Number(leading(&data, 10..)? as f64),
        )]),
        'R' => mask_records(RecordType::Relay),
        'B' => mask_records(RecordType::Sensor),
        'S' => Ok(vec![StateRecord::new(
            segment,
            module,
            RecordType::Sum,
            Some(digit(&data, 9)?),
            StateValue::Number(leading(&data, 10..)? as f64),
        )]),
        other => Err(Error::parse(line, format!("unknown status type {other:?}"))),
    }
}

// ============================================================================
// LEDs
// ============================================================================

// 0123456789AB          last four characters: logic-op summary, unused
// =Msssmmm.TLllllllllllllmmmm
pub(crate) fn parse_leds(line: &str) -> Result<Vec<StateRecord>> {
    let (segment, module) = address(line)?;
    let end = line
        .len()
        .checked_sub(4)
        .filter(|&end| end >= 11)
        .ok_or_else(|| Error::parse(line, "LED frame too short"))?;
    let states = field(line, 11..end)?;

    Ok(states
        .chars()
        .zip(1u16..)
        .map(|(c, input)| {
            StateRecord::new(
                segment,
                module,
                RecordType::Led,
                Some(input),
                StateValue::Bool(c != 'A'),
            )
        })
        .collect())
}

// ============================================================================
// Name / Comment
// ============================================================================

// 0123456789AB
// =Msssmmm.Nptext...   name part p
// =Msssmmm.Kptext...   comment part p
pub(crate) fn parse_text(line: &str) -> Result<Vec<StateRecord>> {
    let (segment, module) = address(line)?;
    let is_name = char_at(line, 9)? == 'N';
    let part = digit(line, 10)?;
    let text = field(line, 11..)?.replace('\u{FFFD}', "");

    Ok(vec![
        StateRecord::new(
            segment,
            module,
            RecordType::Name,
            Some(part),
            StateValue::Text(text),
        )
        .with_detail(RecordDetail::Text { is_name }),
    ])
}

// ============================================================================
// Serial
// ============================================================================

// 0         1         2         3
// 0123456789012345678901234567890123456
// =Msssmmm.SNnnnnnnnnnnttFWyymmddHWhhh
// =M000034.SN17020F556601FW17020FHW008
pub(crate) fn parse_serial(line: &str) -> Result<Vec<StateRecord>> {
    let (segment, module) = address(line)?;

    let serial = field(line, 11..21)?.to_string();
    let manufacturer = Manufacturer(hex(line, 21..23)? as u8);
    let year: u32 = number(line, 25..27)?;
    let month = hex(line, 27..29)?;
    let day = hex(line, 29..31)?;
    let hw_type = HardwareType(leading(line, 33..)? as u16);
    let century = if year < 50 { 20 } else { 19 };

    Ok(vec![
        StateRecord::new(
            segment,
            module,
            RecordType::Serial,
            None,
            StateValue::Text(serial.clone()),
        )
        .with_detail(RecordDetail::Serial {
            serial,
            manufacturer,
            hw_type,
            fw_version: format!("{century}{year:02}.{month:02}.{day:02}"),
        }),
    ])
}

// ============================================================================
// Motor
// ============================================================================

// 0         1         2         3         4
// 01234567890123456789012345678901234567890123456
// =Msssmmm.RMxpppllloooooiiiiiRMypppllloooooiiiii
pub(crate) fn parse_motor(line: &str) -> Result<Vec<StateRecord>> {
    let (segment, module) = address(line)?;

    let motor_at = |offset: usize| -> Result<StateRecord> {
        Ok(StateRecord::new(
            segment,
            module,
            RecordType::Motor,
            Some(digit(line, offset)?),
            StateValue::Number(f64::from(number::<u16>(line, offset + 1..offset + 4)?)),
        )
        .with_detail(RecordDetail::Motor {
            limit: number(line, offset + 4..offset + 7)?,
            step_out: number(line, offset + 7..offset + 12)?,
            step_in: number(line, offset + 12..offset + 17)?,
        }))
    };

    Ok(vec![motor_at(11)?, motor_at(30)?])
}

// ============================================================================
// Segment Repeater
// ============================================================================

// 01234567890123
// =Msssmmm.SKnnn
pub(crate) fn parse_repeater(line: &str) -> Result<Vec<StateRecord>> {
    let (segment, module) = address(line)?;
    let segment_id: u16 = number(line, 11..14)?;

    Ok(vec![
        StateRecord::new(
            segment,
            module,
            RecordType::Repeater,
            None,
            StateValue::Number(f64::from(segment_id)),
        )
        .with_detail(RecordDetail::Repeater { segment_id }),
    ])
}

// ============================================================================
// Variables / Counters / Measure
// ============================================================================

// 0123456789ABC
// %Msssmmm.Annnvvvvv   variable nnn
// %Msssmmm.Cnnnvvvvv   counter nnn
// %Msssmmm.vvvvv       measure value
pub(crate) fn parse_variables(line: &str) -> Result<Vec<StateRecord>> {
    let (segment, module) = address(line)?;

    match char_at(line, 9)? {
        'A' => {
            let input: u16 = number(line, 10..13)?;
            let raw = leading(line, 13..)? as f64;
            // Channels 2 and 3 carry temperatures in tenths with a 1000 offset.
            let status = if matches!(input, 2 | 3) {
                (raw - 1000.0) / 10.0
            } else {
                raw
            };
            Ok(vec![StateRecord::new(
                segment,
                module,
                RecordType::Variable,
                Some(input),
                StateValue::Number(status),
            )])
        }
        'C' => Ok(vec![StateRecord::new(
            segment,
            module,
            RecordType::Counter,
            Some(number(line, 10..13)?),
            StateValue::Number(leading(line, 13..)? as f64),
        )]),
        c if c.is_ascii_digit() => Ok(vec![StateRecord::new(
            segment,
            module,
            RecordType::Measure,
            None,
            StateValue::Number(leading(line, 9..)? as f64),
        )]),
        other => Err(Error::parse(line, format!("unknown variable frame {other:?}"))),
    }
}

// ============================================================================
// Limits
// ============================================================================

// 0123456789ABCDEF
// %Msssmmm.Trlvvvv   register r, threshold l
pub(crate) fn parse_limits(line: &str) -> Result<Vec<StateRecord>> {
    let (segment, module) = address(line)?;
    let limit = digit(line, 11)? as u8;

    Ok(vec![
        StateRecord::new(
            segment,
            module,
            RecordType::Limit,
            Some(digit(line, 10)?),
            StateValue::Number(leading(line, 12..)? as f64),
        )
        .with_detail(RecordDetail::Limit { limit }),
    ])
}

// ============================================================================
// Regulator Set Value
// ============================================================================

/// Lock flag inside a set-value frame.
const REGULATOR_LOCK_BIT: u32 = 0x8000;

// 0123456789ABCDEF
// %Msssmmm.Scvvvvv   regulator c, 15-bit value plus lock bit
pub(crate) fn parse_set_value(line: &str) -> Result<Vec<StateRecord>> {
    let (segment, module) = address(line)?;
    let input = digit(line, 10)?;
    let raw: u32 = number(line, 11..16)?;

    let locked = raw & REGULATOR_LOCK_BIT != 0;
    let value = (f64::from(raw & !REGULATOR_LOCK_BIT) - 1000.0) / 10.0;

    Ok(vec![
        StateRecord::new(
            segment,
            module,
            RecordType::RegulatorOut,
            Some(input),
            StateValue::Number(value),
        ),
        StateRecord::new(
            segment,
            module,
            RecordType::RegulatorLockOut,
            Some(input),
            StateValue::Bool(locked),
        ),
    ])
}

// ============================================================================
// Access Control
// ============================================================================

// After removing the dot:
// 0         1         2
// 0123456789012345678901234
// =MsssmmmZIsssssssssxxlkba   serial s, level l, key k, low battery b, action a
pub(crate) fn parse_ir(line: &str) -> Result<Vec<StateRecord>> {
    let data = without_dot(line);
    let (segment, module) = address(&data)?;
    let serial = field(&data, 10..19)?.to_string();

    let action = match char_at(&data, 24)? {
        '1' => 1,
        '2' => 2,
        _ => 0,
    };

    Ok(vec![
        StateRecord::new(
            segment,
            module,
            RecordType::Ir,
            None,
            StateValue::Text(serial.clone()),
        )
        .with_detail(RecordDetail::Ir {
            serial,
            level: digit(&data, 21)? as u8 + 1,
            key: digit(&data, 22)? as u8,
            low_bat: char_at(&data, 23)? == '1',
            action,
        }),
    ])
}

// After removing the dot:
// 0123456789012345678
// =MsssmmmZTsssssssss
pub(crate) fn parse_finger(line: &str) -> Result<Vec<StateRecord>> {
    let data = without_dot(line);
    let (segment, module) = address(&data)?;
    let serial = field(&data, 10..19)?.to_string();

    Ok(vec![
        StateRecord::new(
            segment,
            module,
            RecordType::Finger,
            None,
            StateValue::Text(serial.clone()),
        )
        .with_detail(RecordDetail::Finger { serial }),
    ])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bools(records: &[StateRecord]) -> Vec<bool> {
        records
            .iter()
            .map(|r| r.status.as_bool().expect("bool status"))
            .collect()
    }

    #[test]
    fn test_ack_success_and_error() {
        let ok = parse_ack("-M000005!").unwrap();
        assert_eq!((ok[0].segment, ok[0].module), (0, 5));
        assert_eq!(ok[0].status, StateValue::Ack(AckStatus::Success));

        let err = parse_ack("-M003012010").unwrap();
        assert_eq!((err[0].segment, err[0].module), (3, 12));
        assert_eq!(
            err[0].status,
            StateValue::Ack(AckStatus::Error(AckError::ModuleUnsuitable))
        );
    }

    #[test]
    fn test_relay_mask() {
        let records = parse_status(":M000007Rx005").unwrap();
        assert_eq!(records.len(), 8);
        assert_eq!(
            bools(&records),
            vec![true, false, true, false, false, false, false, false]
        );
        assert!(records.iter().all(|r| r.record_type == RecordType::Relay));
        assert_eq!(records[2].input, Some(3));
    }

    #[test]
    fn test_sensor_mask_with_dot() {
        let records = parse_status(":M000007.Bx128").unwrap();
        assert_eq!(records[7].status, StateValue::Bool(true));
        assert_eq!(records[7].record_type, RecordType::Sensor);
        assert!(bools(&records[..7]).iter().all(|b| !b));
    }

    #[test]
    fn test_analog_status() {
        let records = parse_status(":M000005A2050").unwrap();
        assert_eq!(records[0].input, Some(2));
        assert_eq!(records[0].status, StateValue::Number(50.0));
    }

    #[test]
    fn test_sum_status() {
        let records = parse_status(":M000005S1234").unwrap();
        assert_eq!(records[0].record_type, RecordType::Sum);
        assert_eq!(records[0].input, Some(1));
        assert_eq!(records[0].status, StateValue::Number(234.0));
    }

    #[test]
    fn test_leds() {
        let records = parse_leds("=M000034.TLAAEAABFEAABANVTN").unwrap();
        assert_eq!(records.len(), 12);
        assert_eq!(records[0].status, StateValue::Bool(false));
        assert_eq!(records[2].status, StateValue::Bool(true));
        assert_eq!(records[11].input, Some(12));
    }

    #[test]
    fn test_leds_too_short() {
        assert!(parse_leds("=M000034.TL").is_err());
    }

    #[test]
    fn test_name_and_comment() {
        let name = parse_text("=M000034.N1Kitchen\u{FFFD}").unwrap();
        assert_eq!(name[0].status, StateValue::Text("Kitchen".into()));
        assert_eq!(name[0].input, Some(1));
        assert_eq!(name[0].detail, Some(RecordDetail::Text { is_name: true }));

        let comment = parse_text("=M000034.K3floor 2").unwrap();
        assert_eq!(comment[0].detail, Some(RecordDetail::Text { is_name: false }));
        assert_eq!(comment[0].input, Some(3));
    }

    #[test]
    fn test_serial() {
        let records = parse_serial("=M000034.SN17020F556601FW17020FHW008").unwrap();
        let Some(RecordDetail::Serial {
            serial,
            manufacturer,
            hw_type,
            fw_version,
        }) = &records[0].detail
        else {
            panic!("expected serial detail");
        };
        assert_eq!(serial, "17020F5566");
        assert_eq!(manufacturer.name(), Some("Issendorff"));
        assert_eq!(hw_type.name(), Some("CMDS-HU"));
        assert_eq!(fw_version, "2017.02.15");
    }

    #[test]
    fn test_serial_unknown_codes_fall_back() {
        let records = parse_serial("=M000034.SN0A0B0C0D0E07FW9901FFHW099").unwrap();
        let Some(RecordDetail::Serial {
            manufacturer,
            hw_type,
            fw_version,
            ..
        }) = &records[0].detail
        else {
            panic!("expected serial detail");
        };
        assert_eq!(manufacturer.to_string(), "7");
        assert_eq!(hw_type.to_string(), "99");
        assert_eq!(fw_version, "1999.01.255");
    }

    #[test]
    fn test_motor() {
        let records =
            parse_motor("=M000010.RM10501000001200340RM21001000000000000").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].input, Some(1));
        assert_eq!(records[0].status, StateValue::Number(50.0));
        assert_eq!(
            records[0].detail,
            Some(RecordDetail::Motor {
                limit: 100,
                step_out: 12,
                step_in: 340,
            })
        );
        assert_eq!(records[1].input, Some(2));
        assert_eq!(records[1].status, StateValue::Number(100.0));
    }

    #[test]
    fn test_repeater() {
        let records = parse_repeater("=M022005.SK022").unwrap();
        assert_eq!((records[0].segment, records[0].module), (22, 5));
        assert_eq!(records[0].detail, Some(RecordDetail::Repeater { segment_id: 22 }));
    }

    #[test]
    fn test_variable_scaling() {
        let plain = parse_variables("%M000005.A00100477").unwrap();
        assert_eq!(plain[0].input, Some(1));
        assert_eq!(plain[0].status, StateValue::Number(477.0));

        let temperature = parse_variables("%M000005.A00201215").unwrap();
        assert_eq!(temperature[0].input, Some(2));
        assert_eq!(temperature[0].status, StateValue::Number(21.5));
    }

    #[test]
    fn test_counter_and_measure() {
        let counter = parse_variables("%M000005.C00400012").unwrap();
        assert_eq!(counter[0].record_type, RecordType::Counter);
        assert_eq!(counter[0].input, Some(4));
        assert_eq!(counter[0].status, StateValue::Number(12.0));

        let measure = parse_variables("%M000005.65535").unwrap();
        assert_eq!(measure[0].record_type, RecordType::Measure);
        assert_eq!(measure[0].status, StateValue::Number(65535.0));
    }

    #[test]
    fn test_limits() {
        let records = parse_limits("%M000111.T2401200").unwrap();
        assert_eq!(records[0].input, Some(2));
        assert_eq!(records[0].detail, Some(RecordDetail::Limit { limit: 4 }));
        assert_eq!(records[0].status, StateValue::Number(1200.0));
    }

    #[test]
    fn test_set_value_unlocked() {
        let records = parse_set_value("%M000111.S101200").unwrap();
        assert_eq!(records[0].record_type, RecordType::RegulatorOut);
        assert_eq!(records[0].status, StateValue::Number(20.0));
        assert_eq!(records[1].record_type, RecordType::RegulatorLockOut);
        assert_eq!(records[1].status, StateValue::Bool(false));
    }

    #[test]
    fn test_set_value_locked() {
        // 0x8000 | 1200 = 33968
        let records = parse_set_value("%M000111.S233968").unwrap();
        assert_eq!(records[0].input, Some(2));
        assert_eq!(records[0].status, StateValue::Number(20.0));
        assert_eq!(records[1].status, StateValue::Bool(true));
    }

    #[test]
    fn test_ir() {
        let records = parse_ir("=M000034.ZI017034051002102").unwrap();
        let Some(RecordDetail::Ir {
            serial,
            level,
            key,
            low_bat,
            action,
        }) = &records[0].detail
        else {
            panic!("expected ir detail");
        };
        assert_eq!(serial, "017034051");
        assert_eq!(*level, 3);
        assert_eq!(*key, 1);
        assert!(!low_bat);
        assert_eq!(*action, 2);
    }

    #[test]
    fn test_ir_captured_frame() {
        // serial 017034051, level 3, key 0, battery ok, action 2
        let records = parse_ir("=M000034.ZI017034051013002").unwrap();
        assert_eq!((records[0].segment, records[0].module), (0, 34));
        assert_eq!(records[0].status, StateValue::Text("017034051".into()));
        assert_eq!(
            records[0].detail,
            Some(RecordDetail::Ir {
                serial: "017034051".into(),
                level: 4,
                key: 0,
                low_bat: false,
                action: 2,
            })
        );
    }

    #[test]
    fn test_ir_frame_too_short() {
        assert!(parse_ir("=M000034.ZI01703405101300").is_err());
    }

    #[test]
    fn test_finger() {
        let records = parse_finger("=M000034.ZT017034051").unwrap();
        assert_eq!(records[0].status, StateValue::Text("017034051".into()));
    }

    #[test]
    fn test_truncated_frames_are_errors() {
        assert!(parse_serial("=M000034.SN1702").is_err());
        assert!(parse_motor("=M000010.RM1050").is_err());
        assert!(parse_ack("-M0000").is_err());
    }
}
