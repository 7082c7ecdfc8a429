//! Line-level IMAP response grammar.
//!
//! Only the handful of productions the engine reacts to are recognized:
//! status conditions, `LIST`, `STATUS`, numbered data and the strings they
//! contain. Lines are handled one at a time; literals are dealt with by the
//! FETCH state machine.

use crate::types::FolderStatus;
use crate::{Error, Result};

/// Condition of a status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// `OK`.
    Ok,
    /// `NO`.
    No,
    /// `BAD`.
    Bad,
    /// `PREAUTH`, greeting only.
    PreAuth,
    /// `BYE`.
    Bye,
}

impl Condition {
    /// Parses a condition keyword, ignoring case.
    #[must_use]
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }
}

/// One `LIST` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// `\HasChildren` was present.
    pub has_children: bool,
    /// `\Noselect` or `\NonExistent` was present.
    pub no_select: bool,
    /// Hierarchy delimiter, `None` for `NIL`.
    pub delimiter: Option<char>,
    /// Full folder name.
    pub name: String,
}

/// Splits off the first space-separated word; the rest has leading spaces
/// removed.
#[must_use]
pub fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(' ') {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

/// Strips a leading keyword followed by a space or the end of the line.
#[must_use]
pub fn strip_keyword<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let (word, rest) = split_word(s);
    word.eq_ignore_ascii_case(keyword).then_some(rest)
}

/// Parses a leading decimal number followed by a space.
#[must_use]
pub fn number_prefix(s: &str) -> Option<(u32, &str)> {
    let (word, rest) = split_word(s);
    if word.is_empty() || !word.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    word.parse().ok().map(|n| (n, rest))
}

/// Parses a quoted string at the start of `s`.
///
/// # Errors
///
/// Returns [`Error::Parse`] if `s` does not start with a complete quoted
/// string.
pub fn quoted(s: &str) -> Result<(String, &str)> {
    let body = s
        .strip_prefix('"')
        .ok_or_else(|| Error::Parse(format!("expected quoted string: {s}")))?;
    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((out, &body[i + 1..])),
            '\\' => match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => break,
            },
            c => out.push(c),
        }
    }
    Err(Error::Parse(format!("unterminated quoted string: {s}")))
}

/// Parses a quoted string or an atom at the start of `s`.
///
/// # Errors
///
/// Returns [`Error::Parse`] if a quoted string is not terminated.
pub fn astring(s: &str) -> Result<(String, &str)> {
    let s = s.trim_start();
    if s.starts_with('"') {
        return quoted(s);
    }
    let (word, rest) = split_word(s);
    Ok((word.to_string(), rest))
}

/// Parses a `{n}` literal announcement.
#[must_use]
pub fn literal_size(s: &str) -> Option<usize> {
    let inner = s.trim_end().strip_prefix('{')?.strip_suffix('}')?;
    let inner = inner.strip_suffix('+').unwrap_or(inner);
    if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    inner.parse().ok()
}

/// Parses the data of a `LIST` response, after the `LIST` keyword.
///
/// ```text
/// (\HasChildren) "/" INBOX
/// (\Noselect) NIL "~/Mail/foo"
/// ```
///
/// # Errors
///
/// Returns [`Error::Parse`] if the attribute list, the delimiter or the name
/// is malformed.
pub fn list(s: &str) -> Result<ListEntry> {
    let s = s.trim_start();
    let (attributes, rest) = match s.strip_prefix('(') {
        Some(inner) => inner
            .split_once(')')
            .ok_or_else(|| Error::Parse(format!("unterminated LIST attributes: {s}")))?,
        None => ("", s),
    };
    let has = |name: &str| {
        attributes
            .split_whitespace()
            .any(|a| a.eq_ignore_ascii_case(name))
    };
    let has_children = has("\\HasChildren");
    let no_select = has("\\Noselect") || has("\\NonExistent");

    let rest = rest.trim_start();
    let (delimiter, rest) = if let Some(after) = strip_keyword(rest, "NIL") {
        (None, after)
    } else {
        let (text, after) = quoted(rest)?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => (Some(c), after.trim_start()),
            _ => return Err(Error::Parse(format!("invalid LIST delimiter: {text:?}"))),
        }
    };

    let name = if rest.starts_with('"') {
        quoted(rest)?.0
    } else if literal_size(rest).is_some() {
        return Err(Error::Parse("literal folder names are not supported".to_string()));
    } else {
        rest.trim_end().to_string()
    };

    Ok(ListEntry {
        has_children,
        no_select,
        delimiter,
        name,
    })
}

/// Parses the counters of a `STATUS` response, after the `STATUS` keyword.
///
/// Unknown items, bad numbers and a malformed item list are skipped; what
/// cannot be read is left unknown.
#[must_use]
pub fn status(s: &str) -> FolderStatus {
    let mut result = FolderStatus::default();
    let Ok((_, rest)) = astring(s) else {
        return result;
    };
    let Some(items) = rest.trim_start().strip_prefix('(') else {
        return result;
    };
    let items = items.split(')').next().unwrap_or_default();

    let mut words = items.split_whitespace();
    while let (Some(key), Some(value)) = (words.next(), words.next()) {
        let Ok(value) = value.parse::<u32>() else {
            continue;
        };
        match key.to_ascii_uppercase().as_str() {
            "MESSAGES" => result.messages = Some(value),
            "RECENT" => result.recent = Some(value),
            "UNSEEN" => result.unseen = Some(value),
            _ => {}
        }
    }
    result
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
    fn test_split_word() {
        assert_eq!(split_word("OK  LOGIN done"), ("OK", "LOGIN done"));
        assert_eq!(split_word("OK"), ("OK", ""));
        assert_eq!(split_word(""), ("", ""));
    }

    #[test]
    fn test_number_prefix() {
        assert_eq!(number_prefix("12 FETCH (FLAGS ())"), Some((12, "FETCH (FLAGS ())")));
        assert_eq!(number_prefix("3 EXISTS"), Some((3, "EXISTS")));
        assert_eq!(number_prefix("OK done"), None);
        assert_eq!(number_prefix("-1 EXISTS"), None);
    }

    #[test]
    fn test_quoted() {
        let (text, rest) = quoted("\"a \\\"b\\\" \\\\c\" tail").unwrap();
        assert_eq!(text, "a \"b\" \\c");
        assert_eq!(rest, " tail");
        assert!(quoted("\"open").is_err());
        assert!(quoted("atom").is_err());
    }

    #[test]
    fn test_literal_size() {
        assert_eq!(literal_size("{1024}"), Some(1024));
        assert_eq!(literal_size("{0}"), Some(0));
        assert_eq!(literal_size("{12+}"), Some(12));
        assert_eq!(literal_size("{}"), None);
        assert_eq!(literal_size("{x}"), None);
        assert_eq!(literal_size("NIL"), None);
    }

    #[test]
    fn test_list_entry() {
        let entry = list("(\\HasChildren) \"/\" INBOX").unwrap();
        assert!(entry.has_children);
        assert_eq!(entry.delimiter, Some('/'));
        assert_eq!(entry.name, "INBOX");

        let entry = list("(\\HasNoChildren) \".\" \"Sent Items\"").unwrap();
        assert!(!entry.has_children);
        assert_eq!(entry.name, "Sent Items");
    }

    #[test]
    fn test_list_unknown_attributes_and_atom_name() {
        let entry = list("(\\Noselect \\No \\Yes) \"/\" ~/Mail/foo").unwrap();
        assert!(entry.no_select);
        assert!(!entry.has_children);
        assert_eq!(entry.delimiter, Some('/'));
        assert_eq!(entry.name, "~/Mail/foo");
    }

    #[test]
    fn test_list_nil_delimiter() {
        let entry = list("() NIL Archive").unwrap();
        assert_eq!(entry.delimiter, None);
        assert_eq!(entry.name, "Archive");
    }

    #[test]
    fn test_list_escaped_delimiter() {
        let entry = list("(\\HasChildren) \"\\\\\" Work").unwrap();
        assert_eq!(entry.delimiter, Some('\\'));
    }

    #[test]
    fn test_list_malformed() {
        assert!(list("(\\HasChildren \"/\" INBOX").is_err());
        assert!(list("() \"//\" INBOX").is_err());
        assert!(list("() {5}").is_err());
    }

    #[test]
    fn test_status() {
        let status = status("INBOX (MESSAGES 231 RECENT 2 UNSEEN 5)");
        assert_eq!(status.messages, Some(231));
        assert_eq!(status.recent, Some(2));
        assert_eq!(status.unseen, Some(5));
    }

    #[test]
    fn test_status_quoted_name_and_unknown_items() {
        let status = status("\"Sent (old)\" (UIDNEXT 44 UNSEEN 1 MESSAGES x)");
        assert_eq!(status.unseen, Some(1));
        assert_eq!(status.messages, None);
        assert_eq!(status.recent, None);
    }

    #[test]
    fn test_status_malformed() {
        assert!(status("INBOX ()").is_empty());
        assert!(status("INBOX ( )").is_empty());
        assert!(status("\"\"").is_empty());
        assert!(status("").is_empty());
        assert!(status("\"INBOX").is_empty());
        assert!(status("INBOX (MESSAGES").is_empty());
    }

    #[test]
    fn test_status_is_idempotent() {
        let line = "INBOX (MESSAGES 4 UNSEEN 0)";
        assert_eq!(status(line), status(line));
    }

    #[test]
    fn test_condition() {
        assert_eq!(Condition::parse("ok"), Some(Condition::Ok));
        assert_eq!(Condition::parse("PREAUTH"), Some(Condition::PreAuth));
        assert_eq!(Condition::parse("MAYBE"), None);
    }
}
