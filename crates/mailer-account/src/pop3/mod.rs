//! POP3 protocol.
//!
//! POP3 has no folders: every message lands in a single Inbox created when
//! the connection comes up. After `USER`/`PASS` the engine runs `STAT` and
//! `LIST`, then `TOP n 0` for every listed message so the host gets the
//! headers. A refresh request for one message retrieves it with `RETR`.
//!
//! Every reply starts with `+OK` or `-ERR`. Multi-line replies end with a
//! line holding a single `.`; content lines starting with `.` are
//! dot-stuffed.

use crate::config::{Config, ConfigEntry, ConfigKind, ConfigValue};
use crate::event::AccountStatus;
use crate::helper::BodyMode;
use crate::protocol::{Command, CommandStatus, Exchange, Protocol};
use crate::types::{FolderId, FolderStatus, Mailbox, MessageId, Tag};
use crate::{Error, Result};

/// Download state of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieve {
    id: u32,
    message: Option<MessageId>,
    body: bool,
}

impl Retrieve {
    /// Starts the download of message `id`.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self {
            id,
            message: None,
            body: false,
        }
    }

    /// Message number on the server.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Message the data is stored into, once known.
    #[must_use]
    pub const fn message(&self) -> Option<MessageId> {
        self.message
    }

    /// Returns true once the headers are complete.
    #[must_use]
    pub const fn in_body(&self) -> bool {
        self.body
    }
}

/// What a POP3 command is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pop3Context {
    /// The server greeting.
    Init,
    /// `USER`.
    User,
    /// `PASS`.
    Pass,
    /// `STAT`.
    Stat,
    /// `LIST` of all messages, with the numbers listed so far.
    List(Vec<u32>),
    /// `TOP n 0`, headers only.
    Top(Retrieve),
    /// `RETR n`, complete message.
    Retr(Retrieve),
    /// `NOOP` keepalive.
    Noop,
}

type Cx<'h, 'a> = Exchange<'h, 'a, Pop3Context>;

/// POP3 protocol state for one connection.
#[derive(Debug, Default)]
pub struct Pop3 {
    inbox: Option<FolderId>,
}

impl Pop3 {
    /// The Inbox folder, once created.
    #[must_use]
    pub const fn inbox(&self) -> Option<FolderId> {
        self.inbox
    }
}

impl Protocol for Pop3 {
    type Context = Pop3Context;

    const NAME: &'static str = "POP3";
    const TITLE: &'static str = "POP3 server";
    const DEFAULT_PORT: u16 = 110;
    const HIERARCHICAL: bool = false;

    fn new() -> Self {
        Self::default()
    }

    fn default_config() -> Config {
        Config::new(vec![
            ConfigEntry::new("username", "Username", ConfigKind::String, ConfigValue::None),
            ConfigEntry::new("password", "Password", ConfigKind::Password, ConfigValue::None),
            ConfigEntry::new(
                "hostname",
                "Server hostname",
                ConfigKind::String,
                ConfigValue::None,
            ),
            ConfigEntry::new(
                "port",
                "Server port",
                ConfigKind::Port,
                ConfigValue::Port(Self::DEFAULT_PORT),
            ),
            ConfigEntry::new("ssl", "Use SSL", ConfigKind::Boolean, ConfigValue::Boolean(false)),
        ])
    }

    fn greeting() -> Pop3Context {
        Pop3Context::Init
    }

    fn keepalive() -> (Pop3Context, String) {
        (Pop3Context::Noop, "NOOP".to_string())
    }

    fn is_sensitive(context: &Pop3Context) -> bool {
        matches!(context, Pop3Context::Pass)
    }

    fn frame(&mut self, text: &str) -> (Option<Tag>, Vec<u8>) {
        (None, format!("{text}\r\n").into_bytes())
    }

    fn connected(&mut self, ex: &mut Cx<'_, '_>) -> Result<()> {
        self.inbox = ex.folder(None, "INBOX", None);
        if self.inbox.is_none() {
            tracing::warn!("host refused the Inbox, messages will be skipped");
        }
        Ok(())
    }

    fn refresh(
        &mut self,
        mailbox: &Mailbox,
        folder: FolderId,
        message: Option<MessageId>,
    ) -> Result<Option<(Pop3Context, String)>> {
        if mailbox.folder(folder).is_none() {
            return Err(Error::InvalidState(format!("unknown {folder}")));
        }
        let Some(message) = message else {
            return Ok(None);
        };
        let id = mailbox
            .message(message)
            .filter(|m| m.folder() == folder)
            .ok_or_else(|| Error::InvalidState(format!("unknown {message} in {folder}")))?
            .server_id();
        Ok(Some((
            Pop3Context::Retr(Retrieve::new(id)),
            format!("RETR {id}"),
        )))
    }

    fn receive(
        &mut self,
        command: &mut Command<Pop3Context>,
        line: &[u8],
        ex: &mut Cx<'_, '_>,
    ) -> Result<()> {
        let text = String::from_utf8_lossy(line);
        if command.status() != CommandStatus::Sent {
            return self.multiline(command, &text, ex);
        }

        if let Some(reason) = text.strip_prefix("-ERR") {
            command.set_status(CommandStatus::Error);
            return Err(Self::failed(command.context(), reason.trim_start()));
        }
        let Some(rest) = text.strip_prefix("+OK") else {
            return Err(Error::Parse(format!("expected +OK or -ERR: {text}")));
        };
        command.set_status(CommandStatus::Parsing);
        self.acknowledged(command, rest.trim_start(), ex)
    }
}

impl Pop3 {
    /// Maps a `-ERR` reply to the error it raises for `context`.
    fn failed(context: &Pop3Context, reason: &str) -> Error {
        let reason = reason.to_string();
        match context {
            Pop3Context::Init => Error::Bye(reason),
            Pop3Context::User | Pop3Context::Pass => Error::Auth(reason),
            _ => Error::ServerError(reason),
        }
    }

    /// Handles the `+OK` line that opens every reply.
    fn acknowledged(
        &self,
        command: &mut Command<Pop3Context>,
        rest: &str,
        ex: &mut Cx<'_, '_>,
    ) -> Result<()> {
        match command.context_mut() {
            Pop3Context::Init => {
                command.set_status(CommandStatus::Ok);
                let username = ex
                    .config()
                    .get_str("username")
                    .ok_or_else(|| Error::Auth("No username set".to_string()))?;
                let text = credential("USER", username)?;
                ex.enqueue(Pop3Context::User, text);
            }
            Pop3Context::User => {
                command.set_status(CommandStatus::Ok);
                let password = password(ex)?;
                let text = credential("PASS", &password)?;
                ex.enqueue(Pop3Context::Pass, text);
            }
            Pop3Context::Pass => {
                command.set_status(CommandStatus::Ok);
                ex.status(AccountStatus::Authenticated, None);
                ex.enqueue(Pop3Context::Stat, "STAT");
            }
            Pop3Context::Stat => {
                let (count, _size) = pair(rest)
                    .ok_or_else(|| Error::Parse(format!("invalid STAT reply: {rest}")))?;
                command.set_status(CommandStatus::Ok);
                if let Some(inbox) = self.inbox {
                    let status = FolderStatus {
                        messages: Some(count),
                        ..FolderStatus::default()
                    };
                    ex.set_status(inbox, &status);
                }
                ex.enqueue(Pop3Context::List(Vec::new()), "LIST");
            }
            Pop3Context::List(_) => {}
            Pop3Context::Top(retrieve) | Pop3Context::Retr(retrieve) => {
                retrieve.body = false;
                retrieve.message = self.inbox.and_then(|inbox| ex.message(inbox, retrieve.id));
                if let Some(message) = retrieve.message {
                    ex.reset_headers(message);
                }
            }
            Pop3Context::Noop => command.set_status(CommandStatus::Ok),
        }
        Ok(())
    }

    /// Handles the lines of a multi-line reply.
    fn multiline(
        &self,
        command: &mut Command<Pop3Context>,
        text: &str,
        ex: &mut Cx<'_, '_>,
    ) -> Result<()> {
        let multiline = matches!(
            command.context(),
            Pop3Context::List(_) | Pop3Context::Top(_) | Pop3Context::Retr(_)
        );
        if multiline && text == "." {
            command.set_status(CommandStatus::Ok);
            if let Pop3Context::List(listed) = command.context() {
                self.prune(listed, ex);
            }
            return Ok(());
        }
        let full = matches!(command.context(), Pop3Context::Retr(_));
        match command.context_mut() {
            Pop3Context::List(listed) => {
                let (id, _size) =
                    pair(text).ok_or_else(|| Error::Parse(format!("invalid LIST entry: {text}")))?;
                listed.push(id);
                ex.enqueue(Pop3Context::Top(Retrieve::new(id)), format!("TOP {id} 0"));
                Ok(())
            }
            Pop3Context::Top(retrieve) | Pop3Context::Retr(retrieve) => {
                let text = text.strip_prefix('.').filter(|t| t.starts_with('.')).unwrap_or(text);
                let Some(message) = retrieve.message else {
                    return Ok(());
                };
                if !retrieve.body && text.is_empty() {
                    retrieve.body = true;
                    if full {
                        ex.set_body(message, &[], BodyMode::Replace);
                    }
                } else if !retrieve.body {
                    ex.add_header(message, text);
                } else if full {
                    let mut line = Vec::with_capacity(text.len() + 2);
                    line.extend_from_slice(text.as_bytes());
                    line.extend_from_slice(b"\r\n");
                    ex.set_body(message, &line, BodyMode::Append);
                }
                Ok(())
            }
            context => Err(Error::Parse(format!(
                "unexpected line for {context:?}: {text}"
            ))),
        }
    }
}

impl Pop3 {
    /// Drops Inbox messages a complete `LIST` no longer names.
    fn prune(&self, listed: &[u32], ex: &mut Cx<'_, '_>) {
        let Some(inbox) = self.inbox else {
            return;
        };
        let mailbox = ex.mailbox();
        let gone: Vec<MessageId> = mailbox
            .folder(inbox)
            .map(|folder| {
                folder
                    .messages()
                    .iter()
                    .copied()
                    .filter(|&m| {
                        mailbox
                            .message(m)
                            .is_some_and(|m| !listed.contains(&m.server_id()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        for message in gone {
            tracing::debug!(%message, "message left the maildrop");
            ex.remove_message(message);
        }
    }
}

/// Builds a `USER`/`PASS` line, refusing values that would break framing.
fn credential(verb: &str, value: &str) -> Result<String> {
    if value.contains(['\r', '\n']) {
        return Err(Error::Auth("credentials contain a line break".to_string()));
    }
    Ok(format!("{verb} {value}"))
}

/// Returns the configured password, asking the host if there is none.
fn password(ex: &mut Cx<'_, '_>) -> Result<String> {
    let config = ex.config();
    if let Some(password) = config.get_str("password") {
        return Ok(password.to_string());
    }
    let prompt = format!(
        "Password for {}@{}",
        config.get_str("username").unwrap_or_default(),
        config.get_str("hostname").unwrap_or_default()
    );
    ex.authenticate(&prompt)
        .ok_or_else(|| Error::Auth("No password given".to_string()))
}

/// Parses `<number> <number>` as found in `STAT` and `LIST` replies.
fn pair(text: &str) -> Option<(u32, u64)> {
    let mut words = text.split_whitespace();
    let first = words.next()?.parse().ok()?;
    let second = words.next()?.parse().ok()?;
    Some((first, second))
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
    use crate::event::AccountEvent;
    use crate::helper::HelperEvent;
    use crate::protocol::harness::Harness;
    use crate::types::FolderKind;

    /// Logs in and lists messages 3 and 4.
    fn listed() -> (Harness<Pop3>, FolderId) {
        let mut h = Harness::<Pop3>::new();
        let inbox = h.session.protocol().inbox().unwrap();

        assert_eq!(h.exchange(b"+OK POP3 ready\r\n").unwrap(), vec!["USER joe\r\n"]);
        assert_eq!(h.exchange(b"+OK\r\n").unwrap(), vec!["PASS secret\r\n"]);
        assert_eq!(h.exchange(b"+OK logged in\r\n").unwrap(), vec!["STAT\r\n"]);
        assert_eq!(h.exchange(b"+OK 2 320\r\n").unwrap(), vec!["LIST\r\n"]);
        let sent = h
            .exchange(b"+OK 2 messages\r\n3 120\r\n4 200\r\n.\r\n")
            .unwrap();
        assert_eq!(sent, vec!["TOP 3 0\r\n"]);
        let sent = h
            .exchange(b"+OK\r\nSubject: three\r\n\r\n.\r\n")
            .unwrap();
        assert_eq!(sent, vec!["TOP 4 0\r\n"]);
        let sent = h
            .exchange(b"+OK\r\nSubject: four\r\nFrom: a@b\r\n\r\n.\r\n")
            .unwrap();
        assert!(sent.is_empty());
        assert!(h.session.queue().is_empty());
        (h, inbox)
    }

    #[test]
    fn test_inbox_created_on_connect() {
        let h = Harness::<Pop3>::new();
        assert_eq!(
            h.helper.events,
            vec![HelperEvent::FolderNew {
                folder: FolderId(0),
                parent: None,
                kind: FolderKind::Inbox,
                name: "Inbox".to_string(),
            }]
        );
    }

    #[test]
    fn test_login_and_headers() {
        let (h, inbox) = listed();
        assert!(
            h.helper
                .account_events()
                .contains(&&AccountEvent::status(AccountStatus::Authenticated, None))
        );
        assert_eq!(h.mailbox.folder(inbox).unwrap().status().messages, Some(2));

        let four = h.mailbox.find_message(inbox, 4).unwrap();
        let four = h.mailbox.message(four).unwrap();
        assert_eq!(four.headers(), ["Subject: four", "From: a@b"]);
        assert!(four.body().is_empty());
    }

    #[test]
    fn test_list_drops_messages_no_longer_on_server() {
        let mut h = Harness::<Pop3>::new();
        let inbox = h.session.protocol().inbox().unwrap();
        let stale = h
            .mailbox
            .message_get_or_create(&mut h.helper, inbox, 9)
            .unwrap();
        let kept = h
            .mailbox
            .message_get_or_create(&mut h.helper, inbox, 1)
            .unwrap();
        h.helper.clear();

        h.exchange(b"+OK\r\n+OK\r\n").unwrap();
        h.exchange(b"+OK\r\n").unwrap();
        h.exchange(b"+OK 1 50\r\n").unwrap();
        let sent = h.exchange(b"+OK\r\n1 50\r\n.\r\n").unwrap();
        assert_eq!(sent, vec!["TOP 1 0\r\n"]);

        assert!(h.mailbox.message(stale).is_none());
        assert!(h.mailbox.message(kept).is_some());
        assert_eq!(h.mailbox.folder(inbox).unwrap().messages(), &[kept]);
        assert!(h.helper.events.contains(&HelperEvent::MessageDelete(stale)));
        assert!(!h.helper.events.contains(&HelperEvent::MessageDelete(kept)));
    }

    #[test]
    fn test_retr_error_then_next_retr() {
        let (mut h, inbox) = listed();
        let three = h.mailbox.find_message(inbox, 3).unwrap();
        let four = h.mailbox.find_message(inbox, 4).unwrap();
        h.helper.clear();

        h.refresh(inbox, Some(three)).unwrap();
        h.refresh(inbox, Some(four)).unwrap();
        assert_eq!(h.flush().unwrap(), vec!["RETR 3\r\n"]);
        assert_eq!(h.session.queue().len(), 2);

        let sent = h.exchange(b"-ERR no such message\r\n").unwrap();
        assert_eq!(sent, vec!["RETR 4\r\n"]);
        assert_eq!(h.helper.errors(), vec!["Server returned -ERR: no such message"]);
        assert_eq!(h.session.queue().len(), 1);

        h.feed(b"+OK 200 octets\r\nSubject: four\r\n\r\nHello\r\n..dot\r\n\r\n.\r\n")
            .unwrap();
        assert!(h.session.queue().is_empty());
        let message = h.mailbox.message(four).unwrap();
        assert_eq!(message.headers(), ["Subject: four"]);
        assert_eq!(message.body(), b"Hello\r\n.dot\r\n\r\n");
    }

    #[test]
    fn test_auth_failure_is_fatal() {
        let mut h = Harness::<Pop3>::new();
        h.exchange(b"+OK ready\r\n").unwrap();
        h.exchange(b"+OK\r\n").unwrap();
        let err = h.feed(b"-ERR [AUTH] invalid password\r\n");
        assert!(matches!(err, Err(Error::Auth(text)) if text == "[AUTH] invalid password"));
    }

    #[test]
    fn test_greeting_error_is_fatal() {
        let mut h = Harness::<Pop3>::new();
        let err = h.feed(b"-ERR maildrop locked\r\n").unwrap_err();
        assert!(matches!(&err, Error::Bye(text) if text == "maildrop locked"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_garbage_reply_is_fatal() {
        let mut h = Harness::<Pop3>::new();
        assert!(matches!(h.feed(b"HELLO\r\n"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_invalid_stat() {
        let mut h = Harness::<Pop3>::new();
        h.exchange(b"+OK\r\n+OK\r\n").unwrap();
        h.exchange(b"+OK\r\n").unwrap();
        assert!(matches!(h.feed(b"+OK lots\r\n"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_password_prompt() {
        let mut config = Pop3::default_config();
        config.set_str("username", "joe").unwrap();
        config.set_str("hostname", "pop.example.com").unwrap();
        let mut h = Harness::<Pop3>::with_config(config);
        h.helper.password = Some("typed".to_string());

        h.exchange(b"+OK\r\n").unwrap();
        assert_eq!(h.exchange(b"+OK\r\n").unwrap(), vec!["PASS typed\r\n"]);
        assert!(h.helper.events.contains(&HelperEvent::Authenticate(
            "Password for joe@pop.example.com".to_string()
        )));
    }

    #[test]
    fn test_missing_username() {
        let mut h = Harness::<Pop3>::with_config(Pop3::default_config());
        assert!(matches!(h.feed(b"+OK\r\n"), Err(Error::Auth(_))));
    }

    #[test]
    fn test_refresh_folder_only_is_noop() {
        let (mut h, inbox) = listed();
        h.refresh(inbox, None).unwrap();
        assert!(h.session.queue().is_empty());
    }

    #[test]
    fn test_pair() {
        assert_eq!(pair("2 320"), Some((2, 320)));
        assert_eq!(pair("7 1200 extra"), Some((7, 1200)));
        assert_eq!(pair("2"), None);
        assert_eq!(pair("x 1"), None);
    }

    #[test]
    fn test_credentials_refuse_line_breaks() {
        assert_eq!(credential("USER", "joe").unwrap(), "USER joe");
        assert!(matches!(credential("PASS", "a\r\nDELE 1"), Err(Error::Auth(_))));
    }

    #[test]
    fn test_pass_is_sensitive() {
        assert!(Pop3::is_sensitive(&Pop3Context::Pass));
        assert!(!Pop3::is_sensitive(&Pop3Context::User));
    }
}
