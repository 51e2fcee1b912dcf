//! Line framing.
//!
//! The gateway terminates lines with `\n`, `\r\n`, `\n\r` or `\r`,
//! depending on firmware. Any run of CR/LF ends a line and empty lines are
//! dropped, which covers all four.

// ============================================================================
// Imports
// ============================================================================

use tracing::warn;

// ============================================================================
// Constants
// ============================================================================

/// Longest partial line kept while waiting for its terminator.
const MAX_PENDING: usize = 64 * 1024;

// ============================================================================
// LineFramer
// ============================================================================

/// Splits a byte stream into text lines.
///
/// Bytes after the last terminator stay buffered until more data arrives.
/// Invalid UTF-8 is replaced, not rejected.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Creates an empty framer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every completed, non-empty line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let Some(end) = self.buffer.iter().rposition(|&b| is_terminator(b)) else {
            if self.buffer.len() > MAX_PENDING {
                warn!(len = self.buffer.len(), "Dropping unterminated line");
                self.buffer.clear();
            }
            return Vec::new();
        };

        let lines = self.buffer[..end]
            .split(|&b| is_terminator(b))
            .filter(|line| !line.is_empty())
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect();

        self.buffer.drain(..=end);
        lines
    }

    /// Discards any partial line.
    #[inline]
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Number of buffered bytes.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[inline]
fn is_terminator(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

// ============================================================================
// Tests
// ============================================================================
