//! Single-slot command queue.
//!
//! The gateway reply stream carries no request ids, so at most one command
//! may be on the wire. Everything else waits in FIFO order; session setup
//! commands jump the line.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::Result;
use crate::protocol::Detector;
use crate::protocol::gateway::{self, SetupCommand};

// ============================================================================
// Types
// ============================================================================

/// Channel completing a caller's command.
///
/// `Ok(None)` means the command timed out with the timeout ignored.
pub type CommandReply = oneshot::Sender<Result<Option<String>>>;

/// Pattern a reply must match to complete a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// A module frame family.
    Frame(Detector),
    /// Gateway confirmation of a setup command.
    Setup(SetupCommand),
    /// Keepalive echo.
    Ping,
}

impl Acceptance {
    /// Returns `true` if `line` completes the command.
    #[must_use]
    pub fn accepts(&self, line: &str) -> bool {
        match self {
            Self::Frame(detector) => detector.is_match(line),
            Self::Setup(setup) => setup.is_answer(line),
            Self::Ping => gateway::ping_echo(line).is_some(),
        }
    }
}

/// Who is waiting for a command.
#[derive(Debug)]
pub enum Completion {
    /// An API caller.
    Caller(CommandReply),
    /// The session setup sequence.
    Setup(SetupCommand),
    /// The keepalive with this counter.
    Ping(u8),
}

impl Completion {
    /// Returns `true` for API callers; internal commands never outlive a
    /// session.
    #[inline]
    #[must_use]
    pub fn is_caller(&self) -> bool {
        matches!(self, Self::Caller(_))
    }
}

/// Command waiting for, or occupying, the wire.
#[derive(Debug)]
pub struct PendingCommand {
    /// Wire text without terminator.
    pub wire: String,
    /// Reply pattern.
    pub acceptance: Acceptance,
    /// Reply deadline, counted from transmission.
    pub timeout: Duration,
    /// Treat an expired deadline as an empty success.
    pub ignore_timeout: bool,
    /// Completion target.
    pub completion: Completion,
    /// When the command was queued.
    pub enqueued_at: Instant,
}

impl PendingCommand {
    /// Creates a command for an API caller.
    #[must_use]
    pub fn caller(
        wire: String,
        acceptance: Detector,
        timeout: Duration,
        ignore_timeout: bool,
        reply: CommandReply,
    ) -> Self {
        Self {
            wire,
            acceptance: Acceptance::Frame(acceptance),
            timeout,
            ignore_timeout,
            completion: Completion::Caller(reply),
            enqueued_at: Instant::now(),
        }
    }

    /// Creates a session setup command.
    #[must_use]
    pub fn setup(setup: SetupCommand, timeout: Duration) -> Self {
        Self {
            wire: setup.wire().to_string(),
            acceptance: Acceptance::Setup(setup),
            timeout,
            ignore_timeout: false,
            completion: Completion::Setup(setup),
            enqueued_at: Instant::now(),
        }
    }

    /// Creates a keepalive command.
    #[must_use]
    pub fn ping(counter: u8, timeout: Duration) -> Self {
        Self {
            wire: gateway::ping(counter),
            acceptance: Acceptance::Ping,
            timeout,
            ignore_timeout: false,
            completion: Completion::Ping(counter),
            enqueued_at: Instant::now(),
        }
    }
}

// ============================================================================
// CommandQueue
// ============================================================================

/// Command in flight with its reply deadline.
#[derive(Debug)]
pub struct InFlight {
    /// The command.
    pub command: PendingCommand,
    /// When the reply is overdue.
    pub deadline: Instant,
}

/// FIFO queue with one in-flight slot.
#[derive(Debug, Default)]
pub struct CommandQueue {
    waiting: VecDeque<PendingCommand>,
    in_flight: Option<InFlight>,
}

impl CommandQueue {
    /// Creates an empty queue.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    #[inline]
    pub fn push(&mut self, command: PendingCommand) {
        self.waiting.push_back(command);
    }

    /// Puts a command ahead of everything waiting.
    #[inline]
    pub fn push_front(&mut self, command: PendingCommand) {
        self.waiting.push_front(command);
    }

    /// Moves the oldest waiting command into the slot.
    ///
    /// Returns `None` if the slot is taken or nothing waits.
    pub fn start_next(&mut self, now: Instant) -> Option<&PendingCommand> {
        if self.in_flight.is_some() {
            return None;
        }
        let command = self.waiting.pop_front()?;
        let deadline = now + command.timeout;
        self.in_flight = Some(InFlight { command, deadline });
        self.in_flight.as_ref().map(|slot| &slot.command)
    }

    /// Command currently in flight.
    #[inline]
    #[must_use]
    pub fn in_flight(&self) -> Option<&PendingCommand> {
        self.in_flight.as_ref().map(|slot| &slot.command)
    }

    /// Reply deadline of the command in flight.
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.in_flight.as_ref().map(|slot| slot.deadline)
    }

    /// Empties the slot, returning its command.
    #[inline]
    pub fn finish(&mut self) -> Option<PendingCommand> {
        self.in_flight.take().map(|slot| slot.command)
    }

    /// Drops waiting commands for which `keep` returns `false`.
    pub fn retain_waiting(&mut self, keep: impl FnMut(&PendingCommand) -> bool) {
        self.waiting.retain(keep);
    }

    /// Removes every waiting command.
    pub fn drain_waiting(&mut self) -> Vec<PendingCommand> {
        self.waiting.drain(..).collect()
    }

    /// Number of waiting commands, not counting the slot.
    #[inline]
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }

    /// Returns `true` if the slot is free.
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }
}

// ============================================================================
// Tests
// ============================================================================
