//! Driver events.
//!
//! Subscribers of [`Lcn::subscribe`](crate::Lcn::subscribe) receive one
//! [`Event`] per notification.
//!
//! | Event | Meaning |
//! |-------|---------|
//! | `Connected` | Session set up, commands accepted |
//! | `Disconnected` | Session lost, reconnect scheduled |
//! | `Data` | Unsolicited line nobody claimed |
//! | `Update` | Decoded module state |
//! | `Scan` | Scan progress |
//! | `Error` | Connection-level failure |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;

use super::record::StateRecord;

// ============================================================================
// Scan Progress
// ============================================================================

/// Phase of a running scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStep {
    /// No scan running.
    Inactive,
    /// Probing addresses.
    Scanning,
    /// Reading discovered modules.
    Reading,
}

impl ScanStep {
    /// Numeric step as reported to the automation host.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Inactive => 0,
            Self::Scanning => 1,
            Self::Reading => 2,
        }
    }
}

/// Scan progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    /// Current phase.
    pub step: ScanStep,
    /// Module being probed or read.
    pub progress: u16,
    /// Modules found so far.
    pub found: usize,
}

// ============================================================================
// Event
// ============================================================================

/// Notification broadcast by the driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Event {
    /// Session set up.
    Connected,
    /// Session lost.
    Disconnected,
    /// Unsolicited line no detector recognised.
    Data(String),
    /// Decoded module state.
    Update(StateRecord),
    /// Scan progress.
    Scan(ScanProgress),
    /// Connection-level failure.
    Error(String),
}

impl Event {
    /// Returns the event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Data(_) => "data",
            Self::Update(_) => "update",
            Self::Scan(_) => "scan",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::record::{RecordType, StateValue};

    #[test]
    fn test_event_names() {
        assert_eq!(Event::Connected.name(), "connected");
        assert_eq!(Event::Data("x".into()).name(), "data");
    }

    #[test]
    fn test_scan_serialization() {
        let event = Event::Scan(ScanProgress {
            step: ScanStep::Reading,
            progress: 7,
            found: 2,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "scan");
        assert_eq!(json["data"]["step"], "READING");
        assert_eq!(json["data"]["progress"], 7);
    }

    #[test]
    fn test_update_serialization() {
        let record = StateRecord::new(0, 5, RecordType::Led, Some(2), StateValue::Bool(true));
        let json = serde_json::to_value(Event::Update(record)).unwrap();
        assert_eq!(json["event"], "update");
        assert_eq!(json["data"]["type"], "LED");
    }

    #[test]
    fn test_step_codes() {
        assert_eq!(ScanStep::Inactive.code(), 0);
        assert_eq!(ScanStep::Reading.code(), 2);
    }
}
