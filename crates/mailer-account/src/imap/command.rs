//! IMAP command text.
//!
//! Commands are built as text without tag or line ending; the session adds
//! both when framing.

use crate::{Error, Result};

/// Items requested for every folder.
pub const STATUS_ITEMS: &str = "(MESSAGES RECENT UNSEEN)";

/// Keepalive command.
pub const NOOP: &str = "NOOP";

/// Fetches flags and headers of every message of the selected folder.
pub const FETCH_SUMMARIES: &str = "FETCH 1:* (FLAGS BODY.PEEK[HEADER])";

/// Appends `s` as an astring: bare when possible, quoted otherwise.
pub fn push_astring(out: &mut String, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        push_quoted(out, s);
    } else {
        out.push_str(s);
    }
}

/// Appends `s` as a quoted string.
pub fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

/// Returns true if the byte needs quoting.
const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']')
        || b < 0x20
        || b == 0x7F
}

fn check_line(s: &str) -> Result<()> {
    if s.contains(['\r', '\n']) {
        return Err(Error::Auth("credentials contain a line break".to_string()));
    }
    Ok(())
}

/// `LOGIN user password`.
///
/// # Errors
///
/// Returns [`Error::Auth`] if a credential cannot be sent as a quoted string.
pub fn login(username: &str, password: &str) -> Result<String> {
    check_line(username)?;
    check_line(password)?;
    let mut out = String::from("LOGIN ");
    push_astring(&mut out, username);
    out.push(' ');
    push_astring(&mut out, password);
    Ok(out)
}

/// `LIST "" "pattern"`.
#[must_use]
pub fn list(pattern: &str) -> String {
    let mut out = String::from("LIST \"\" ");
    push_quoted(&mut out, pattern);
    out
}

/// `STATUS "name" (MESSAGES RECENT UNSEEN)`.
#[must_use]
pub fn status(name: &str) -> String {
    let mut out = String::from("STATUS ");
    push_quoted(&mut out, name);
    out.push(' ');
    out.push_str(STATUS_ITEMS);
    out
}

/// `EXAMINE "name"`.
#[must_use]
pub fn examine(name: &str) -> String {
    let mut out = String::from("EXAMINE ");
    push_quoted(&mut out, name);
    out
}

/// Fetches one complete message without setting `\Seen`.
#[must_use]
pub fn fetch_message(id: u32) -> String {
    format!("FETCH {id} BODY.PEEK[]")
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
    fn test_login_quoting() {
        assert_eq!(login("joe", "secret").unwrap(), "LOGIN joe secret");
        assert_eq!(
            login("joe@example.com", "pass word").unwrap(),
            "LOGIN joe@example.com \"pass word\""
        );
        assert_eq!(
            login("joe", "a\"b\\c").unwrap(),
            "LOGIN joe \"a\\\"b\\\\c\""
        );
        assert_eq!(login("", "x").unwrap(), "LOGIN \"\" x");
        assert!(matches!(login("joe", "bad\r\npass"), Err(Error::Auth(_))));
    }

    #[test]
    fn test_list() {
        assert_eq!(list("%"), "LIST \"\" \"%\"");
        assert_eq!(list("INBOX/%"), "LIST \"\" \"INBOX/%\"");
    }

    #[test]
    fn test_status_and_examine() {
        assert_eq!(
            status("Sent Items"),
            "STATUS \"Sent Items\" (MESSAGES RECENT UNSEEN)"
        );
        assert_eq!(examine("INBOX"), "EXAMINE \"INBOX\"");
        assert_eq!(examine("say \"hi\""), "EXAMINE \"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_fetch() {
        assert_eq!(fetch_message(12), "FETCH 12 BODY.PEEK[]");
        assert_eq!(FETCH_SUMMARIES, "FETCH 1:* (FLAGS BODY.PEEK[HEADER])");
    }
}
