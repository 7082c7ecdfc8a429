//! FETCH response state machine.
//!
//! A FETCH command is answered by one `* n FETCH (...)` response per
//! message. Header and body data arrive as `{n}` literals that span several
//! lines, so the state of the current response is kept between lines:
//!
//! ```text
//! Id ──"* n FETCH ("──→ Command ──FLAGS──→ Flags ──→ Command
//!                          │
//!                          └──{n}──→ Headers ──empty line──→ Body
//!                                       │                     │
//!                                       └──n bytes consumed───┴──→ Command ──")"──→ Id
//! ```
//!
//! Literal bytes are counted exactly, line endings included. A line that
//! runs past the end of a literal is split at the boundary and the excess is
//! read as the continuation of the response.

use std::borrow::Cow;

use super::ImapContext;
use super::parse;
use crate::helper::BodyMode;
use crate::protocol::Exchange;
use crate::types::{FolderId, MessageFlag, MessageId};
use crate::{Error, Result};

/// Position inside the current FETCH response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchState {
    /// Waiting for the next `* n FETCH` response.
    #[default]
    Id,
    /// Reading data items.
    Command,
    /// Reading a flag list.
    Flags,
    /// Reading header lines of a literal.
    Headers,
    /// Reading body lines of a literal.
    Body,
}

/// State of a FETCH command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchContext {
    folder: FolderId,
    message: Option<MessageId>,
    id: u32,
    state: FetchState,
    remaining: usize,
}

impl FetchContext {
    /// Creates the context of a FETCH in `folder`, optionally for one message.
    #[must_use]
    pub const fn new(folder: FolderId, message: Option<MessageId>) -> Self {
        Self {
            folder,
            message,
            id: 0,
            state: FetchState::Id,
            remaining: 0,
        }
    }

    /// Folder the FETCH runs in.
    #[must_use]
    pub const fn folder(&self) -> FolderId {
        self.folder
    }

    /// Message the current response applies to.
    #[must_use]
    pub const fn message(&self) -> Option<MessageId> {
        self.message
    }

    /// Sequence number of the current response.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> FetchState {
        self.state
    }

    /// Literal bytes still expected.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    /// Returns true while literal bytes are expected.
    #[must_use]
    pub const fn in_literal(&self) -> bool {
        matches!(self.state, FetchState::Headers | FetchState::Body) && self.remaining > 0
    }
}

type Cx<'h, 'a> = Exchange<'h, 'a, ImapContext>;

/// Handles an untagged line while the FETCH is at the head.
///
/// Returns `Ok(false)` if the line is not a FETCH response.
pub fn untagged(fetch: &mut FetchContext, rest: &str, ex: &mut Cx<'_, '_>) -> Result<bool> {
    let Some((id, after)) = parse::number_prefix(rest) else {
        return Ok(false);
    };
    let Some(items) = parse::strip_keyword(after, "FETCH") else {
        return Ok(false);
    };
    let items = items
        .strip_prefix('(')
        .ok_or_else(|| Error::Parse(format!("expected FETCH data list: {rest}")))?;

    fetch.id = id;
    fetch.message = ex.message(fetch.folder, id);
    fetch.state = FetchState::Command;
    fetch.remaining = 0;
    tracing::trace!(id, message = ?fetch.message, "FETCH response");
    data_items(fetch, items, ex)?;
    Ok(true)
}

/// Handles a line that continues the current response after a literal.
///
/// # Errors
///
/// Returns [`Error::Parse`] if no response is in progress.
pub fn resume(fetch: &mut FetchContext, text: &str, ex: &mut Cx<'_, '_>) -> Result<()> {
    match fetch.state {
        FetchState::Command => data_items(fetch, text, ex),
        FetchState::Flags => flags(fetch, text, ex),
        _ => Err(Error::Parse(format!("unexpected FETCH data: {text}"))),
    }
}

/// Consumes one line of literal data.
pub fn literal(fetch: &mut FetchContext, line: &[u8], ex: &mut Cx<'_, '_>) -> Result<()> {
    let len = line.len();
    let (data, excess, crlf) = if len + 2 <= fetch.remaining {
        (line, &[][..], true)
    } else if len <= fetch.remaining {
        (line, &[][..], false)
    } else {
        (&line[..fetch.remaining], &line[fetch.remaining..], false)
    };
    fetch.remaining -= if crlf { len + 2 } else { fetch.remaining };

    match fetch.state {
        FetchState::Headers if data.is_empty() => {
            if crlf && fetch.remaining > 0 {
                fetch.state = FetchState::Body;
                if let Some(message) = fetch.message {
                    ex.set_body(message, &[], BodyMode::Replace);
                }
            }
        }
        FetchState::Headers => {
            if let Some(message) = fetch.message {
                ex.add_header(message, &String::from_utf8_lossy(data));
            }
        }
        FetchState::Body => {
            if let Some(message) = fetch.message {
                let chunk: Cow<'_, [u8]> = if crlf {
                    let mut owned = Vec::with_capacity(data.len() + 2);
                    owned.extend_from_slice(data);
                    owned.extend_from_slice(b"\r\n");
                    Cow::Owned(owned)
                } else {
                    Cow::Borrowed(data)
                };
                ex.set_body(message, &chunk, BodyMode::Append);
            }
        }
        FetchState::Id | FetchState::Command | FetchState::Flags => {
            return Err(Error::Parse("literal data outside a literal".to_string()));
        }
    }

    if fetch.remaining == 0 {
        fetch.state = FetchState::Command;
        if !excess.is_empty() {
            data_items(fetch, &String::from_utf8_lossy(excess), ex)?;
        }
    }
    Ok(())
}

fn data_items(fetch: &mut FetchContext, text: &str, ex: &mut Cx<'_, '_>) -> Result<()> {
    let mut text = text.trim_start();
    loop {
        if text.is_empty() {
            fetch.state = FetchState::Command;
            return Ok(());
        }
        if text.starts_with(')') {
            fetch.state = FetchState::Id;
            return Ok(());
        }

        let (name, rest) = item_name(text);
        if name.eq_ignore_ascii_case("FLAGS") {
            fetch.state = FetchState::Flags;
            return flags(fetch, rest, ex);
        }
        let rest = rest.trim_start();
        if rest.starts_with('{') {
            let size = parse::literal_size(rest)
                .ok_or_else(|| Error::Parse(format!("invalid literal for {name}: {rest}")))?;
            begin_literal(fetch, size, ex);
            return Ok(());
        }
        text = skip_value(name, rest)?.trim_start();
    }
}

fn flags(fetch: &mut FetchContext, text: &str, ex: &mut Cx<'_, '_>) -> Result<()> {
    let list = text
        .trim_start()
        .strip_prefix('(')
        .ok_or_else(|| Error::Parse(format!("expected flag list: {text}")))?;
    let (list, rest) = list
        .split_once(')')
        .ok_or_else(|| Error::Parse(format!("unterminated flag list: {text}")))?;

    if let Some(message) = fetch.message {
        for flag in list.split_whitespace().filter_map(MessageFlag::from_imap) {
            ex.set_flag(message, flag);
        }
    }
    fetch.state = FetchState::Command;
    data_items(fetch, rest, ex)
}

fn begin_literal(fetch: &mut FetchContext, size: usize, ex: &mut Cx<'_, '_>) {
    fetch.remaining = size;
    if size == 0 {
        fetch.state = FetchState::Command;
        return;
    }
    fetch.state = FetchState::Headers;
    if let Some(message) = fetch.message {
        ex.reset_headers(message);
    }
}

/// Splits a data item name, keeping bracketed sections like
/// `BODY[HEADER.FIELDS (FROM)]` together.
fn item_name(text: &str) -> (&str, &str) {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ' ' | ')' if depth == 0 => return (&text[..i], &text[i..]),
            _ => {}
        }
    }
    (text, "")
}

/// Skips the value of an item the engine does not use.
fn skip_value<'t>(name: &str, text: &'t str) -> Result<&'t str> {
    if text.is_empty() {
        return Err(Error::Parse(format!("missing value for {name}")));
    }
    if text.starts_with('"') {
        return Ok(parse::quoted(text)?.1);
    }
    if text.starts_with('(') {
        let mut depth = 0usize;
        let mut quoted = false;
        let mut escaped = false;
        for (i, c) in text.char_indices() {
            if quoted {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => quoted = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => quoted = true,
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(&text[i + 1..]);
                    }
                }
                _ => {}
            }
        }
        return Err(Error::Parse(format!("unterminated value for {name}")));
    }
    let end = text.find([' ', ')']).unwrap_or(text.len());
    Ok(&text[end..])
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
    fn test_item_name() {
        assert_eq!(item_name("RFC822 {10}"), ("RFC822", " {10}"));
        assert_eq!(
            item_name("BODY[HEADER.FIELDS (FROM TO)] {20}"),
            ("BODY[HEADER.FIELDS (FROM TO)]", " {20}")
        );
        assert_eq!(item_name("UID 4)"), ("UID", " 4)"));
    }

    #[test]
    fn test_skip_value() {
        assert_eq!(skip_value("UID", "44 FLAGS ()").unwrap(), " FLAGS ()");
        assert_eq!(skip_value("UID", "44)").unwrap(), ")");
        assert_eq!(skip_value("X", "\"a b\" rest").unwrap(), " rest");
        assert_eq!(
            skip_value("ENVELOPE", "(\"a)\" (NIL x) y) tail").unwrap(),
            " tail"
        );
        assert!(skip_value("UID", "").is_err());
        assert!(skip_value("ENVELOPE", "(open").is_err());
    }

    #[test]
    fn test_in_literal() {
        let mut fetch = FetchContext::new(FolderId(0), None);
        assert!(!fetch.in_literal());
        fetch.state = FetchState::Headers;
        fetch.remaining = 4;
        assert!(fetch.in_literal());
        fetch.remaining = 0;
        assert!(!fetch.in_literal());
    }
}
