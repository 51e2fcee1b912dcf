//! Scan bookkeeping.
//!
//! A [`ScanSession`] lives in the driver while a scan runs, so that module
//! reports arriving on their own can be filed under the module they
//! describe.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;

use crate::protocol::{HardwareType, Manufacturer, RecordDetail, ScanStep, StateRecord};

// ============================================================================
// PartialDevice
// ============================================================================

/// What a scan learned about one module.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialDevice {
    /// Segment the module was scanned in.
    pub segment: u16,
    /// Module number.
    pub module: u16,
    /// Module name, trimmed.
    pub name: String,
    /// Module comment, trimmed.
    pub comment: String,
    /// Serial number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// Manufacturer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<Manufacturer>,
    /// Hardware type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hw_type: Option<HardwareType>,
    /// Firmware date as `YYYY.MM.DD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fw_version: Option<String>,
    /// State reports collected while scanning.
    pub states: Vec<StateRecord>,
}

impl PartialDevice {
    /// Creates an entry for a module that answered the probe.
    #[must_use]
    pub fn new(segment: u16, module: u16, name: impl Into<String>) -> Self {
        Self {
            segment,
            module,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Copies identity fields out of a serial record.
    ///
    /// Returns `false` if the record carries no serial detail.
    pub fn apply_serial(&mut self, record: &StateRecord) -> bool {
        let Some(RecordDetail::Serial {
            serial,
            manufacturer,
            hw_type,
            fw_version,
        }) = &record.detail
        else {
            return false;
        };

        self.serial = Some(serial.clone());
        self.manufacturer = Some(*manufacturer);
        self.hw_type = Some(*hw_type);
        self.fw_version = Some(fw_version.clone());
        true
    }
}

// ============================================================================
// ScanSession
// ============================================================================

/// State of the running scan.
#[derive(Debug, Clone)]
pub struct ScanSession {
    /// Scanned segment.
    pub segment: u16,
    /// First probed module.
    pub module_low: u16,
    /// Last probed module.
    pub module_high: u16,
    /// Module being probed or read.
    pub current_probe: u16,
    /// Modules found so far.
    pub discovered: BTreeMap<u16, PartialDevice>,
    /// Current phase.
    pub phase: ScanStep,
}

impl ScanSession {
    /// Creates a session about to probe `module_low..=module_high`.
    #[must_use]
    pub fn new(segment: u16, module_low: u16, module_high: u16) -> Self {
        Self {
            segment,
            module_low,
            module_high,
            current_probe: module_low,
            discovered: BTreeMap::new(),
            phase: ScanStep::Scanning,
        }
    }

    /// Number of modules found so far.
    #[inline]
    #[must_use]
    pub fn found(&self) -> usize {
        self.discovered.len()
    }

    /// Files a module report under an already discovered module.
    ///
    /// Returns the record back if it belongs to another segment or to a
    /// module the scan has not found.
    pub fn absorb(&mut self, record: StateRecord) -> Option<StateRecord> {
        if record.segment != self.segment {
            return Some(record);
        }
        match self.discovered.get_mut(&record.module) {
            Some(device) => {
                device.states.push(record);
                None
            }
            None => Some(record),
        }
    }

    /// Records a probe answer.
    ///
    /// The answer is filed under the module it names, which may differ
    /// from the probed one when it arrives late.
    pub fn discover(&mut self, module: u16, name: &str) {
        let segment = self.segment;
        self.discovered
            .entry(module)
            .and_modify(|device| device.name = name.to_string())
            .or_insert_with(|| PartialDevice::new(segment, module, name));
    }

    /// Mutable access to a discovered module.
    #[inline]
    pub fn device_mut(&mut self, module: u16) -> Option<&mut PartialDevice> {
        self.discovered.get_mut(&module)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::{RecordType, StateValue};

    fn led(segment: u16, module: u16) -> StateRecord {
        StateRecord::new(segment, module, RecordType::Led, Some(1), StateValue::Bool(true))
    }

    #[test]
    fn test_absorb_only_known_modules() {
        let mut session = ScanSession::new(0, 3, 10);
        session.discover(5, "Kitchen");

        assert!(session.absorb(led(0, 5)).is_none());
        assert!(session.absorb(led(0, 6)).is_some());
        assert!(session.absorb(led(1, 5)).is_some());
        assert_eq!(session.discovered[&5].states.len(), 1);
    }

    #[test]
    fn test_discover_keeps_states() {
        let mut session = ScanSession::new(0, 3, 10);
        session.discover(5, "A");
        session.absorb(led(0, 5));
        session.discover(5, "B");

        let device = &session.discovered[&5];
        assert_eq!(device.name, "B");
        assert_eq!(device.comment, "");
        assert_eq!(device.states.len(), 1);
        assert_eq!(session.found(), 1);
    }

    #[test]
    fn test_apply_serial() {
        let record = StateRecord::new(0, 5, RecordType::Serial, None, StateValue::None)
            .with_detail(RecordDetail::Serial {
                serial: "17020F5566".into(),
                manufacturer: Manufacturer(1),
                hw_type: HardwareType(8),
                fw_version: "2017.02.15".into(),
            });
        let mut device = PartialDevice::new(0, 5, "");
        assert!(device.apply_serial(&record));
        assert_eq!(device.serial.as_deref(), Some("17020F5566"));
        assert_eq!(device.hw_type, Some(HardwareType(8)));

        assert!(!device.apply_serial(&led(0, 5)));
    }

    #[test]
    fn test_serialize_device() {
        let device = PartialDevice::new(0, 7, "Hall");
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["name"], "Hall");
        assert_eq!(json["module"], 7);
        assert!(json.get("serial").is_none());
    }
}
