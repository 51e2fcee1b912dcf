//! Status read plans.
//!
//! A read asks a module to report state; the replies are dispatched like
//! any other module report and surface as `Update` events.

// ============================================================================
// Imports
// ============================================================================

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::protocol::{Request, StatusScope};

// ============================================================================
// ReadOperation
// ============================================================================

/// What [`Lcn::read`](crate::Lcn::read) asks a module for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadOperation {
    /// LED states (`L`).
    Leds,
    /// Relay states (`R`).
    Relays,
    /// Relay and analog states (`AR` or `RA`).
    RelaysAndAnalogs,
    /// Variables 1-12 (`V`).
    Variables,
    /// Counters 1-4 (`C`).
    Counters,
    /// Threshold registers 1-3 (`SE`).
    Limits,
    /// Analog states (`A`).
    Analogs,
    /// Binary sensor states (`S`).
    Sensors,
    /// Full status block (anything else).
    All,
}

impl ReadOperation {
    /// Requests sent for this operation, in wire order.
    #[must_use]
    pub fn requests(self) -> Vec<Request> {
        match self {
            Self::Leds => vec![Request::GetLeds],
            Self::Relays => vec![Request::GetStatus(StatusScope::Relay)],
            Self::RelaysAndAnalogs => vec![
                Request::GetStatus(StatusScope::Relay),
                Request::GetStatus(StatusScope::Analog),
            ],
            Self::Variables => (1..=12).map(Request::GetVariable).collect(),
            Self::Counters => (1..=4).map(Request::GetCounter).collect(),
            Self::Limits => (1..=3).map(Request::GetLimit).collect(),
            Self::Analogs => vec![Request::GetStatus(StatusScope::Analog)],
            Self::Sensors => vec![Request::GetStatus(StatusScope::Sensor)],
            Self::All => vec![Request::GetStatus(StatusScope::All)],
        }
    }

    /// Short code used by the automation host.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Leds => "L",
            Self::Relays => "R",
            Self::RelaysAndAnalogs => "AR",
            Self::Variables => "V",
            Self::Counters => "C",
            Self::Limits => "SE",
            Self::Analogs => "A",
            Self::Sensors => "S",
            Self::All => "ALL",
        }
    }
}

impl FromStr for ReadOperation {
    type Err = Infallible;

    /// Unknown codes read the full status block.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "L" => Self::Leds,
            "R" => Self::Relays,
            "AR" | "RA" => Self::RelaysAndAnalogs,
            "V" => Self::Variables,
            "C" => Self::Counters,
            "SE" => Self::Limits,
            "A" => Self::Analogs,
            "S" => Self::Sensors,
            _ => Self::All,
        })
    }
}

impl fmt::Display for ReadOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// ModuleReadPlan
// ============================================================================

/// Which blocks [`Lcn::read_modules`](crate::Lcn::read_modules) refreshes
/// for one module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleReadPlan {
    /// Segment of the module.
    pub segment: u16,
    /// The module.
    pub module: u16,
    /// Read LED states.
    pub leds: bool,
    /// Read relay states.
    pub relays: bool,
    /// Read analog states.
    pub analogs: bool,
    /// Read binary sensor states.
    pub sensors: bool,
    /// Read regulator set values 1-2.
    pub regulators: bool,
    /// Read variables 1-12.
    pub variables: bool,
    /// Read counters 1-4.
    pub counters: bool,
}

impl ModuleReadPlan {
    /// Creates an empty plan for a module.
    #[inline]
    #[must_use]
    pub const fn new(segment: u16, module: u16) -> Self {
        Self {
            segment,
            module,
            leds: false,
            relays: false,
            analogs: false,
            sensors: false,
            regulators: false,
            variables: false,
            counters: false,
        }
    }

    /// Requests sent for this plan, in wire order.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        let mut requests = Vec::new();
        if self.leds {
            requests.push(Request::GetLeds);
        }
        if self.relays {
            requests.push(Request::GetStatus(StatusScope::Relay));
        }
        if self.analogs {
            requests.push(Request::GetStatus(StatusScope::Analog));
        }
        if self.sensors {
            requests.push(Request::GetStatus(StatusScope::Sensor));
        }
        if self.regulators {
            requests.extend((1..=2).map(Request::GetSetValue));
        }
        if self.variables {
            requests.extend((1..=12).map(Request::GetVariable));
        }
        if self.counters {
            requests.extend((1..=4).map(Request::GetCounter));
        }
        requests
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_codes() {
        let parse = |s: &str| s.parse::<ReadOperation>().unwrap();
        assert_eq!(parse("L"), ReadOperation::Leds);
        assert_eq!(parse("RA"), ReadOperation::RelaysAndAnalogs);
        assert_eq!(parse("AR"), ReadOperation::RelaysAndAnalogs);
        assert_eq!(parse("SE"), ReadOperation::Limits);
        assert_eq!(parse("whatever"), ReadOperation::All);
    }

    #[test]
    fn test_request_counts() {
        assert_eq!(ReadOperation::Variables.requests().len(), 12);
        assert_eq!(ReadOperation::Counters.requests().len(), 4);
        assert_eq!(ReadOperation::Limits.requests().len(), 3);
        assert_eq!(
            ReadOperation::RelaysAndAnalogs.requests(),
            vec![
                Request::GetStatus(StatusScope::Relay),
                Request::GetStatus(StatusScope::Analog)
            ]
        );
    }

    #[test]
    fn test_plan_requests() {
        let plan = ModuleReadPlan {
            leds: true,
            regulators: true,
            counters: true,
            ..ModuleReadPlan::new(0, 5)
        };
        let requests = plan.requests();
        assert_eq!(requests.len(), 1 + 2 + 4);
        assert_eq!(requests[0], Request::GetLeds);
        assert_eq!(requests[1], Request::GetSetValue(1));
    }

    #[test]
    fn test_plan_from_json() {
        let plan: ModuleReadPlan =
            serde_json::from_str(r#"{"segment":0,"module":12,"relays":true}"#).unwrap();
        assert_eq!(plan.module, 12);
        assert!(plan.relays);
        assert!(!plan.leds);
    }
}
