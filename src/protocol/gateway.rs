//! Gateway session lines.
//!
//! Everything the gateway itself says, as opposed to frames relayed from
//! bus modules: handshake prompts, session markers, command errors and the
//! keepalive echo.

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;

use super::codec::AnalogMode;

// ============================================================================
// Patterns
// ============================================================================

static VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"LCN-PCK/").expect("version pattern must compile"));

static LEGACY_DATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[%:]M\d{6}").expect("legacy data pattern must compile"));

static PARAMETER_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\((\w\w):p-error\)$").expect("parameter error pattern must compile")
});

static PING_ECHO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\^ping(\d+)-?").expect("ping pattern must compile"));

// ============================================================================
// Handshake
// ============================================================================

/// Gateway username prompt.
pub const PROMPT_USERNAME: &str = "Username:";

/// Gateway password prompt.
pub const PROMPT_PASSWORD: &str = "Password:";

/// Successful login.
pub const AUTH_OK: &str = "OK";

/// Rejected login; the spelling is the gateway's.
pub const AUTH_FAILED: &str = "Authentification failed.";

/// Bus attached to the gateway.
pub const BUS_CONNECTED: &str = "$io:#LCN:connected";

/// Bus detached from the gateway.
pub const BUS_DISCONNECTED: &str = "$io:#LCN:disconnected";

/// Gateway license problem.
pub const LICENSE_ERROR: &str = "$err:(license?)";

/// Generic command rejection.
pub const COMMAND_ERROR: &str = "(c-error)";

/// Returns `true` for the `LCN-PCK/…` banner.
#[inline]
#[must_use]
pub fn is_banner(line: &str) -> bool {
    VERSION.is_match(line)
}

/// Returns `true` for a module frame that older gateways send instead of
/// [`BUS_CONNECTED`].
#[inline]
#[must_use]
pub fn is_legacy_data(line: &str) -> bool {
    LEGACY_DATA.is_match(line)
}

// ============================================================================
// Session Lines
// ============================================================================

/// Gateway line seen while a session is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLine<'a> {
    /// Bus detached.
    BusDisconnected,
    /// License problem.
    License,
    /// `(c-error)`.
    CommandError,
    /// `(XX:p-error)` carrying the two-character code.
    ParameterError(&'a str),
    /// Not a gateway line.
    Other,
}

impl<'a> SessionLine<'a> {
    /// Classifies `line`, in the order the session checks them.
    #[must_use]
    pub fn classify(line: &'a str) -> Self {
        if line == BUS_DISCONNECTED {
            Self::BusDisconnected
        } else if line == LICENSE_ERROR {
            Self::License
        } else if line == COMMAND_ERROR {
            Self::CommandError
        } else if let Some(caps) = PARAMETER_ERROR.captures(line)
            && let Some(code) = caps.get(1)
        {
            Self::ParameterError(code.as_str())
        } else {
            Self::Other
        }
    }
}

// ============================================================================
// Setup Commands
// ============================================================================

/// Command the session sends before reporting `connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupCommand {
    /// Select the analog output mode.
    OutputMode(AnalogMode),
    /// Switch the gateway to decimal numbers (`!CHD`).
    DecimalMode,
}

impl SetupCommand {
    /// Wire text.
    #[must_use]
    pub const fn wire(self) -> &'static str {
        match self {
            Self::OutputMode(mode) => mode.setup_command(),
            Self::DecimalMode => "!CHD",
        }
    }

    /// Returns `true` if `line` is the gateway's confirmation.
    #[must_use]
    pub fn is_answer(self, line: &str) -> bool {
        match self {
            Self::OutputMode(mode) => line == mode.setup_answer(),
            Self::DecimalMode => line == "(dec-mode)",
        }
    }
}

// ============================================================================
// Keepalive
// ============================================================================

/// Keepalive counter wraps at this value.
pub const PING_MODULUS: u8 = 100;

/// Renders the keepalive command for `counter`.
#[inline]
#[must_use]
pub fn ping(counter: u8) -> String {
    format!("^ping{counter}")
}

/// Extracts the counter from a keepalive echo.
///
/// Returns `None` if `line` is no echo. A counter too large for `u32`
/// becomes `u32::MAX`, which never matches a sent counter.
#[must_use]
pub fn ping_echo(line: &str) -> Option<u32> {
    let caps = PING_ECHO.captures(line)?;
    let digits = caps.get(1)?.as_str();
    Some(digits.parse().unwrap_or(u32::MAX))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner() {
        assert!(is_banner("LCN-PCK/IP 1.0"));
        assert!(!is_banner("Username:"));
    }

    #[test]
    fn test_legacy_data() {
        assert!(is_legacy_data(":M000005A1050"));
        assert!(is_legacy_data("%M000005.A00100477"));
        assert!(!is_legacy_data("=M000005.SN"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(SessionLine::classify("$io:#LCN:disconnected"), SessionLine::BusDisconnected);
        assert_eq!(SessionLine::classify("$err:(license?)"), SessionLine::License);
        assert_eq!(SessionLine::classify("(c-error)"), SessionLine::CommandError);
        assert_eq!(SessionLine::classify("(P1:p-error)"), SessionLine::ParameterError("P1"));
        assert_eq!(SessionLine::classify("-M000005!"), SessionLine::Other);
    }

    #[test]
    fn test_setup_answers() {
        let mode = SetupCommand::OutputMode(AnalogMode::Iob200ToLcn200);
        assert_eq!(mode.wire(), "!OM1N");
        assert!(mode.is_answer("(0..200-mode native)"));
        assert!(!mode.is_answer("(0..50-mode native)"));
        assert!(SetupCommand::DecimalMode.is_answer("(dec-mode)"));
    }

    #[test]
    fn test_ping_echo() {
        assert_eq!(ping(7), "^ping7");
        assert_eq!(ping_echo("^ping7"), Some(7));
        assert_eq!(ping_echo("^ping42-"), Some(42));
        assert_eq!(ping_echo("ping7"), None);
    }
}
