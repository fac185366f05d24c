//! Line framing for the command channel
//!
//! # Protocol
//!
//! ```text
//! ┌───────────────────────────────┬──────┐
//! │ JSON object (UTF-8, one line) │ '\n' │
//! └───────────────────────────────┴──────┘
//! ```
//!
//! - One message per line, `\n` terminated. A trailing `\r` is stripped along
//!   with other surrounding whitespace.
//! - Blank lines are skipped.
//! - Lines longer than [`MAX_LINE_LEN`] cannot be resynchronised and close the
//!   connection.
//! - Same framing in both directions: commands from the client, replies from
//!   the robot.

use crate::error::{Error, Result};
use serde::Serialize;

/// Longest accepted line, excluding the terminator
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Serialize `message` as a single `\n`-terminated JSON line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message).map_err(|e| Error::Serialization(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Accumulates stream bytes and yields complete lines.
///
/// Bytes after the last newline are kept until more data arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `data` and return every line it completed.
    ///
    /// Lines are trimmed; blank lines are dropped. Invalid UTF-8 is replaced
    /// rather than rejected since replies are informational.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(data);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.pending[start..end]);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
            start = end + 1;
        }
        self.pending.drain(..start);

        if self.pending.len() > MAX_LINE_LEN {
            log::warn!(
                "Discarding {} bytes without a line terminator",
                self.pending.len()
            );
            self.pending.clear();
        }

        lines
    }

    /// Bytes waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::messages::{Command, Reply};

    #[test]
    fn test_encode_line() {
        assert_eq!(encode_line(&Reply::pong()).unwrap(), b"{\"status\":\"pong\"}\n");
        assert_eq!(
            encode_line(&Command::Stop).unwrap(),
            b"{\"action\":\"stop\"}\n"
        );
    }

    #[test]
    fn test_line_buffer_splits_across_reads() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"{\"status\":").is_empty());
        assert_eq!(buffer.pending_len(), 10);

        let lines = buffer.push(b"\"pong\"}\n{\"error\":\"Server busy\"}\r\n{\"sta");
        assert_eq!(
            lines,
            vec![
                "{\"status\":\"pong\"}".to_string(),
                "{\"error\":\"Server busy\"}".to_string()
            ]
        );
        assert_eq!(buffer.pending_len(), 5);
    }

    #[test]
    fn test_line_buffer_skips_blank_lines() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"\n  \nhello\n\n");
        assert_eq!(lines, vec!["hello".to_string()]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_line_buffer_discards_runaway_line() {
        let mut buffer = LineBuffer::new();
        let junk = vec![b'x'; MAX_LINE_LEN + 1];
        assert!(buffer.push(&junk).is_empty());
        assert_eq!(buffer.pending_len(), 0);
        assert_eq!(buffer.push(b"ok\n"), vec!["ok".to_string()]);
    }
}
