//! IMAP command tag generator.
//!
//! Tags are used to match commands with their responses.

use crate::types::Tag;

/// Tag generator for IMAP commands.
///
/// Generates tags of the form `a0000`, `a0001`, ... from a 16-bit counter
/// rendered in hexadecimal. The counter wraps; with one command in flight
/// at a time a reused tag can never be confused with a live one.
#[derive(Debug, Clone, Default)]
pub struct TagGenerator {
    counter: u16,
}

impl TagGenerator {
    /// Creates a new tag generator starting at `a0000`.
    #[must_use]
    pub const fn new() -> Self {
        Self { counter: 0 }
    }

    /// Generates the next tag.
    pub fn next_tag(&mut self) -> Tag {
        let n = self.counter;
        self.counter = self.counter.wrapping_add(1);
        Tag(format!("a{n:04x}"))
    }

    /// Returns the current counter value without incrementing.
    #[must_use]
    pub const fn current(&self) -> u16 {
        self.counter
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_generation() {
        let mut generator = TagGenerator::new();
        assert_eq!(generator.next_tag().as_str(), "a0000");
        assert_eq!(generator.next_tag().as_str(), "a0001");
        assert_eq!(generator.current(), 2);
    }

    #[test]
    fn test_hex_format() {
        let mut generator = TagGenerator::new();
        for _ in 0..10 {
            let _ = generator.next_tag();
        }
        assert_eq!(generator.next_tag().as_str(), "a000a");
        for _ in 11..0x100 {
            let _ = generator.next_tag();
        }
        assert_eq!(generator.next_tag().as_str(), "a0100");
    }

    #[test]
    fn test_wraps_around() {
        let mut generator = TagGenerator { counter: u16::MAX };
        assert_eq!(generator.next_tag().as_str(), "affff");
        assert_eq!(generator.next_tag().as_str(), "a0000");
    }

    #[test]
    fn test_uniqueness_within_cycle() {
        let mut generator = TagGenerator::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10000 {
            let tag = generator.next_tag();
            assert!(seen.insert(tag), "duplicate tag generated");
        }
    }
}
