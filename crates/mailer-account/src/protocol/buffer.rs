//! Inbound line framing.

use bytes::{Bytes, BytesMut};

use crate::{Error, Result};

/// Longest line accepted without a CRLF (1 MiB).
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Accumulates received bytes and hands out complete CRLF-terminated lines.
///
/// Bytes already scanned for a line ending are not scanned again when more
/// data arrives, so feeding a response one byte at a time stays linear.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
    scanned: usize,
}

impl LineBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drops all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }

    /// Takes the next complete line, without its CRLF.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if more than [`MAX_LINE_LENGTH`] bytes are
    /// buffered without a line ending.
    pub fn next_line(&mut self) -> Result<Option<Bytes>> {
        // A CR at the end of the previous scan may pair with a new LF.
        let start = self.scanned.saturating_sub(1);
        let found = self.buf[start..]
            .windows(2)
            .position(|w| w == b"\r\n")
            .map(|p| p + start);

        match found {
            Some(pos) => {
                let mut line = self.buf.split_to(pos + 2);
                line.truncate(pos);
                self.scanned = 0;
                Ok(Some(line.freeze()))
            }
            None if self.buf.len() > MAX_LINE_LENGTH => Err(Error::Parse(format!(
                "line exceeds {MAX_LINE_LENGTH} bytes"
            ))),
            None => {
                self.scanned = self.buf.len();
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines() {
        let mut buf = LineBuffer::new();
        buf.extend(b"* OK ready\r\na1 OK done\r\npartial");

        assert_eq!(buf.next_line().unwrap().unwrap(), &b"* OK ready"[..]);
        assert_eq!(buf.next_line().unwrap().unwrap(), &b"a1 OK done"[..]);
        assert!(buf.next_line().unwrap().is_none());
        assert_eq!(buf.len(), 7);
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut buf = LineBuffer::new();
        buf.extend(b"+OK\r");
        assert!(buf.next_line().unwrap().is_none());
        buf.extend(b"\n");
        assert_eq!(buf.next_line().unwrap().unwrap(), &b"+OK"[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buf = LineBuffer::new();
        let mut lines = Vec::new();
        for byte in b"one\r\n\r\ntwo\r\n" {
            buf.extend(&[*byte]);
            while let Some(line) = buf.next_line().unwrap() {
                lines.push(line);
            }
        }
        assert_eq!(lines, vec![&b"one"[..], &b""[..], &b"two"[..]]);
    }

    #[test]
    fn test_bare_lf_is_not_a_line_ending() {
        let mut buf = LineBuffer::new();
        buf.extend(b"a\nb\r\n");
        assert_eq!(buf.next_line().unwrap().unwrap(), &b"a\nb"[..]);
    }

    #[test]
    fn test_overlong_line() {
        let mut buf = LineBuffer::new();
        buf.extend(&vec![b'x'; MAX_LINE_LENGTH + 1]);
        assert!(matches!(buf.next_line(), Err(Error::Parse(_))));
    }
}
