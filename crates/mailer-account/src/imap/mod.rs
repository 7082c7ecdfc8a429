//! IMAP4 protocol.
//!
//! Synchronizes the folder tree read-only:
//!
//! 1. Wait for the greeting, then `LOGIN` (skipped on `PREAUTH`)
//! 2. `LIST` one level under the configured prefix, recursing into every
//!    folder flagged `\HasChildren`
//! 3. `STATUS` every selectable folder
//!
//! A refresh request `EXAMINE`s a folder and then fetches either the flags
//! and headers of all its messages or one complete message.

mod command;
mod fetch;
mod parse;
mod tag;

pub use fetch::{FetchContext, FetchState};
pub use parse::{Condition, ListEntry};
pub use tag::TagGenerator;

use crate::config::{Config, ConfigEntry, ConfigKind, ConfigValue};
use crate::event::AccountStatus;
use crate::protocol::{Command, CommandStatus, Exchange, Protocol};
use crate::types::{FolderId, Mailbox, MessageId, Tag};
use crate::{Error, Result};

/// Untagged responses accepted while any command is running.
const INFORMATIONAL: &[&str] = &[
    "CAPABILITY",
    "FLAGS",
    "LIST",
    "LSUB",
    "STATUS",
    "SEARCH",
    "ENABLED",
    "ID",
    "NAMESPACE",
];

/// Numbered untagged responses accepted while any command is running.
const NUMBERED: &[&str] = &["EXISTS", "RECENT", "EXPUNGE", "FETCH"];

/// What an IMAP command is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImapContext {
    /// The server greeting.
    Init,
    /// `LOGIN`.
    Login,
    /// `LIST` of the children of `parent`, or of the root.
    List {
        /// Folder whose children are listed.
        parent: Option<FolderId>,
    },
    /// `STATUS` of a folder.
    Status {
        /// Target folder.
        folder: FolderId,
    },
    /// `EXAMINE` before a fetch.
    Select {
        /// Folder being opened.
        folder: FolderId,
        /// Message to fetch afterwards, all summaries if `None`.
        message: Option<MessageId>,
        /// Message count reported by the server.
        exists: Option<u32>,
    },
    /// `FETCH`.
    Fetch(FetchContext),
    /// `NOOP` keepalive.
    Noop,
}

type Cx<'h, 'a> = Exchange<'h, 'a, ImapContext>;

/// IMAP4 protocol state for one connection.
#[derive(Debug, Default)]
pub struct Imap4 {
    tags: TagGenerator,
}

impl Protocol for Imap4 {
    type Context = ImapContext;

    const NAME: &'static str = "IMAP4";
    const TITLE: &'static str = "IMAP4 server";
    const DEFAULT_PORT: u16 = 143;

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
            ConfigEntry::separator(),
            ConfigEntry::new(
                "prefix",
                "Prefix for folders",
                ConfigKind::String,
                ConfigValue::None,
            ),
        ])
    }

    fn greeting() -> ImapContext {
        ImapContext::Init
    }

    fn keepalive() -> (ImapContext, String) {
        (ImapContext::Noop, command::NOOP.to_string())
    }

    fn is_sensitive(context: &ImapContext) -> bool {
        matches!(context, ImapContext::Login)
    }

    fn frame(&mut self, text: &str) -> (Option<Tag>, Vec<u8>) {
        let tag = self.tags.next_tag();
        let data = format!("{tag} {text}\r\n").into_bytes();
        (Some(tag), data)
    }

    fn refresh(
        &mut self,
        mailbox: &Mailbox,
        folder: FolderId,
        message: Option<MessageId>,
    ) -> Result<Option<(ImapContext, String)>> {
        let name = mailbox
            .folder(folder)
            .ok_or_else(|| Error::InvalidState(format!("unknown {folder}")))?
            .name();
        if let Some(message) = message {
            if mailbox
                .message(message)
                .is_none_or(|m| m.folder() != folder)
            {
                return Err(Error::InvalidState(format!("unknown {message} in {folder}")));
            }
        }
        let context = ImapContext::Select {
            folder,
            message,
            exists: None,
        };
        Ok(Some((context, command::examine(name))))
    }

    fn receive(
        &mut self,
        command: &mut Command<ImapContext>,
        line: &[u8],
        ex: &mut Cx<'_, '_>,
    ) -> Result<()> {
        if let ImapContext::Fetch(fetch) = command.context_mut() {
            if fetch.in_literal() {
                return fetch::literal(fetch, line, ex);
            }
        }
        if command.status() == CommandStatus::Sent {
            command.set_status(CommandStatus::Parsing);
        }

        let text = String::from_utf8_lossy(line);
        if let Some(rest) = text.strip_prefix("* ") {
            return Self::untagged(command, rest, ex);
        }
        let tagged = command
            .tag()
            .and_then(|tag| text.strip_prefix(tag.as_str()))
            .and_then(|rest| rest.strip_prefix(' '));
        if let Some(rest) = tagged {
            return Self::tagged(command, rest, ex);
        }
        if let ImapContext::Fetch(fetch) = command.context_mut() {
            if fetch.state() != FetchState::Id {
                return fetch::resume(fetch, &text, ex);
            }
        }
        Err(Error::Parse(format!("unexpected line: {text}")))
    }
}

impl Imap4 {
    fn untagged(command: &mut Command<ImapContext>, rest: &str, ex: &mut Cx<'_, '_>) -> Result<()> {
        match command.context_mut() {
            ImapContext::Init => {
                let done = Self::greeting_line(rest, ex)?;
                command.set_status(done);
                Ok(())
            }
            ImapContext::List { parent } => match parse::strip_keyword(rest, "LIST") {
                Some(data) => Self::list_entry(*parent, &parse::list(data)?, ex),
                None => informational(rest),
            },
            ImapContext::Status { folder } => match parse::strip_keyword(rest, "STATUS") {
                Some(data) => {
                    ex.set_status(*folder, &parse::status(data));
                    Ok(())
                }
                None => informational(rest),
            },
            ImapContext::Select { exists, .. } => {
                if let Some((count, after)) = parse::number_prefix(rest) {
                    if parse::strip_keyword(after, "EXISTS").is_some() {
                        *exists = Some(count);
                        return Ok(());
                    }
                }
                informational(rest)
            }
            ImapContext::Fetch(fetch) => {
                if fetch::untagged(fetch, rest, ex)? {
                    Ok(())
                } else {
                    informational(rest)
                }
            }
            ImapContext::Login | ImapContext::Noop => informational(rest),
        }
    }

    /// Handles the greeting and returns the new status of the pseudo-command.
    fn greeting_line(rest: &str, ex: &mut Cx<'_, '_>) -> Result<CommandStatus> {
        let (word, text) = parse::split_word(rest);
        match Condition::parse(word) {
            Some(Condition::Ok) => {
                tracing::debug!(greeting = text, "server ready");
                Self::login(ex)?;
                Ok(CommandStatus::Ok)
            }
            Some(Condition::PreAuth) => {
                tracing::debug!(greeting = text, "pre-authenticated");
                ex.status(AccountStatus::Authenticated, None);
                Self::list_root(ex);
                Ok(CommandStatus::Ok)
            }
            Some(Condition::Bye) => Err(Error::Bye(text.to_string())),
            _ => Err(Error::Parse(format!("unexpected greeting: {rest}"))),
        }
    }

    fn tagged(command: &mut Command<ImapContext>, rest: &str, ex: &mut Cx<'_, '_>) -> Result<()> {
        let (word, text) = parse::split_word(rest);
        match Condition::parse(word) {
            Some(Condition::Ok) => {
                command.set_status(CommandStatus::Ok);
                Self::completed(command.context(), ex);
                Ok(())
            }
            Some(condition @ (Condition::No | Condition::Bad)) => {
                command.set_status(CommandStatus::Error);
                if matches!(command.context(), ImapContext::Login) {
                    return Err(Error::Auth(text.to_string()));
                }
                if condition == Condition::No {
                    Err(Error::No(text.to_string()))
                } else {
                    Err(Error::Bad(text.to_string()))
                }
            }
            _ => Err(Error::Parse(format!("unexpected completion: {rest}"))),
        }
    }

    fn completed(context: &ImapContext, ex: &mut Cx<'_, '_>) {
        match context {
            ImapContext::Login => {
                ex.status(AccountStatus::Authenticated, None);
                Self::list_root(ex);
            }
            ImapContext::Select {
                folder,
                message: Some(message),
                ..
            } => {
                let Some(id) = ex.mailbox().message(*message).map(|m| m.server_id()) else {
                    return;
                };
                ex.enqueue(
                    ImapContext::Fetch(FetchContext::new(*folder, Some(*message))),
                    command::fetch_message(id),
                );
            }
            ImapContext::Select {
                folder,
                message: None,
                exists,
            } => {
                if *exists == Some(0) {
                    tracing::debug!(%folder, "folder is empty, nothing to fetch");
                    return;
                }
                ex.enqueue(
                    ImapContext::Fetch(FetchContext::new(*folder, None)),
                    command::FETCH_SUMMARIES,
                );
            }
            ImapContext::Init
            | ImapContext::List { .. }
            | ImapContext::Status { .. }
            | ImapContext::Fetch(_)
            | ImapContext::Noop => {}
        }
    }

    fn login(ex: &mut Cx<'_, '_>) -> Result<()> {
        let config = ex.config();
        let username = config
            .get_str("username")
            .ok_or_else(|| Error::Auth("No username set".to_string()))?
            .to_string();
        let password = match config.get_str("password") {
            Some(password) => password.to_string(),
            None => {
                let hostname = config.get_str("hostname").unwrap_or_default();
                let prompt = format!("Password for {username}@{hostname}");
                ex.authenticate(&prompt)
                    .ok_or_else(|| Error::Auth("No password given".to_string()))?
            }
        };
        ex.enqueue(ImapContext::Login, command::login(&username, &password)?);
        Ok(())
    }

    fn list_root(ex: &mut Cx<'_, '_>) {
        let pattern = format!("{}%", ex.config().get_str("prefix").unwrap_or_default());
        ex.enqueue(ImapContext::List { parent: None }, command::list(&pattern));
    }

    fn list_entry(parent: Option<FolderId>, entry: &ListEntry, ex: &mut Cx<'_, '_>) -> Result<()> {
        if entry.name.is_empty() {
            return Ok(());
        }
        if parent.is_some_and(|p| ex.mailbox().folder(p).is_some_and(|f| f.name() == entry.name)) {
            return Ok(());
        }
        let Some(folder) = ex.folder(parent, &entry.name, entry.delimiter) else {
            return Ok(());
        };
        if !entry.no_select {
            ex.enqueue(ImapContext::Status { folder }, command::status(&entry.name));
        }
        if let (true, Some(delimiter)) = (entry.has_children, entry.delimiter) {
            ex.enqueue(
                ImapContext::List {
                    parent: Some(folder),
                },
                command::list(&format!("{}{delimiter}%", entry.name)),
            );
        }
        Ok(())
    }
}

/// Accepts untagged data a command did not ask for.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the line is not a known response.
fn informational(rest: &str) -> Result<()> {
    let (word, text) = parse::split_word(rest);
    match Condition::parse(word) {
        Some(Condition::Bye) => {
            tracing::warn!(text, "server is closing the connection");
            return Ok(());
        }
        Some(Condition::No | Condition::Bad) => {
            tracing::warn!(text, "server warning");
            return Ok(());
        }
        Some(_) => return Ok(()),
        None => {}
    }
    if INFORMATIONAL.iter().any(|k| word.eq_ignore_ascii_case(k)) {
        return Ok(());
    }
    if let Some((_, after)) = parse::number_prefix(rest) {
        let (keyword, _) = parse::split_word(after);
        if NUMBERED.iter().any(|k| keyword.eq_ignore_ascii_case(k)) {
            return Ok(());
        }
    }
    Err(Error::Parse(format!("unexpected response: {rest}")))
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
    use crate::helper::{BodyMode, HelperEvent};
    use crate::protocol::harness::Harness;
    use crate::types::{FolderKind, MessageFlag};

    fn logged_in() -> Harness<Imap4> {
        let mut h = Harness::<Imap4>::new();
        let sent = h.exchange(b"* OK IMAP4rev1 ready\r\n").unwrap();
        assert_eq!(sent, vec!["a0000 LOGIN joe secret\r\n"]);
        let sent = h.exchange(b"a0000 OK LOGIN completed\r\n").unwrap();
        assert_eq!(sent, vec!["a0001 LIST \"\" \"%\"\r\n"]);
        h
    }

    /// Lists INBOX, answers its STATUS and opens it with `exists` messages.
    fn examined(exists: u32) -> (Harness<Imap4>, FolderId) {
        let mut h = logged_in();
        h.feed(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n").unwrap();
        let sent = h.exchange(b"a0001 OK LIST completed\r\n").unwrap();
        assert_eq!(sent, vec!["a0002 STATUS \"INBOX\" (MESSAGES RECENT UNSEEN)\r\n"]);
        h.exchange(b"a0002 OK STATUS completed\r\n").unwrap();

        let inbox = h.mailbox.find_folder(None, "INBOX").unwrap();
        h.refresh(inbox, None).unwrap();
        let sent = h.flush().unwrap();
        assert_eq!(sent, vec!["a0003 EXAMINE \"INBOX\"\r\n"]);
        h.feed(format!("* {exists} EXISTS\r\n* 0 RECENT\r\n").as_bytes())
            .unwrap();
        h.helper.clear();
        (h, inbox)
    }

    fn fetch_head(h: &Harness<Imap4>) -> &FetchContext {
        match h.session.queue().head().unwrap().context() {
            ImapContext::Fetch(fetch) => fetch,
            other => panic!("head is not a FETCH: {other:?}"),
        }
    }

    #[test]
    fn test_login_then_list() {
        let h = logged_in();
        assert!(
            h.helper
                .account_events()
                .contains(&&AccountEvent::status(AccountStatus::Authenticated, None))
        );
        assert_eq!(h.session.queue().len(), 1);
    }

    #[test]
    fn test_login_rejected_is_fatal() {
        let mut h = Harness::<Imap4>::new();
        h.exchange(b"* OK ready\r\n").unwrap();
        let err = h.feed(b"a0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n");
        assert!(matches!(err, Err(Error::Auth(text)) if text.contains("Invalid credentials")));
        assert_eq!(
            h.session.queue().head().unwrap().status(),
            CommandStatus::Error
        );
    }

    #[test]
    fn test_password_prompt() {
        let mut config = Imap4::default_config();
        config.set_str("username", "joe").unwrap();
        config.set_str("hostname", "mail.example.com").unwrap();
        let mut h = Harness::<Imap4>::with_config(config);
        h.helper.password = Some("typed".to_string());

        let sent = h.exchange(b"* OK ready\r\n").unwrap();
        assert_eq!(sent, vec!["a0000 LOGIN joe typed\r\n"]);
        assert!(h.helper.events.contains(&HelperEvent::Authenticate(
            "Password for joe@mail.example.com".to_string()
        )));
    }

    #[test]
    fn test_password_prompt_cancelled() {
        let mut config = Imap4::default_config();
        config.set_str("username", "joe").unwrap();
        let mut h = Harness::<Imap4>::with_config(config);
        assert!(matches!(h.feed(b"* OK ready\r\n"), Err(Error::Auth(_))));
    }

    #[test]
    fn test_preauth_skips_login() {
        let mut h = Harness::<Imap4>::new();
        let sent = h.exchange(b"* PREAUTH welcome back\r\n").unwrap();
        assert_eq!(sent, vec!["a0000 LIST \"\" \"%\"\r\n"]);
    }

    #[test]
    fn test_bye_greeting() {
        let mut h = Harness::<Imap4>::new();
        assert!(matches!(h.feed(b"* BYE too busy\r\n"), Err(Error::Bye(_))));
    }

    #[test]
    fn test_prefix_is_listed() {
        let mut config = Imap4::default_config();
        config.set_str("username", "joe").unwrap();
        config.set_str("password", "secret").unwrap();
        config.set_str("prefix", "INBOX.").unwrap();
        let mut h = Harness::<Imap4>::with_config(config);
        h.exchange(b"* OK ready\r\n").unwrap();
        let sent = h.exchange(b"a0000 OK done\r\n").unwrap();
        assert_eq!(sent, vec!["a0001 LIST \"\" \"INBOX.%\"\r\n"]);
    }

    #[test]
    fn test_list_with_children_recurses_once() {
        let mut h = logged_in();
        h.feed(b"* LIST (\\HasChildren) \"/\" Archive\r\n").unwrap();

        let lists: Vec<_> = h
            .session
            .queue()
            .iter()
            .filter(|c| matches!(c.context(), ImapContext::List { parent: Some(_) }))
            .collect();
        assert_eq!(lists.len(), 1);

        let sent = h.exchange(b"a0001 OK LIST completed\r\n").unwrap();
        assert_eq!(sent, vec!["a0002 STATUS \"Archive\" (MESSAGES RECENT UNSEEN)\r\n"]);
        let sent = h.exchange(b"a0002 OK STATUS completed\r\n").unwrap();
        assert_eq!(sent, vec!["a0003 LIST \"\" \"Archive/%\"\r\n"]);

        h.feed(b"* LIST (\\HasNoChildren) \"/\" Archive/2024\r\n")
            .unwrap();
        let archive = h.mailbox.find_folder(None, "Archive").unwrap();
        let year = h.mailbox.find_folder(Some(archive), "Archive/2024").unwrap();
        assert_eq!(h.mailbox.folder(year).unwrap().display_name(), "2024");
        assert_eq!(h.mailbox.folder(year).unwrap().parent(), Some(archive));
    }

    #[test]
    fn test_list_without_children_does_not_recurse() {
        let mut h = logged_in();
        h.feed(b"* LIST (\\HasNoChildren) \"/\" Drafts\r\n").unwrap();
        h.feed(b"* LIST () NIL Notes\r\n").unwrap();
        h.feed(b"* LIST (\\HasChildren) NIL Flat\r\n").unwrap();

        assert!(
            h.session
                .queue()
                .iter()
                .all(|c| !matches!(c.context(), ImapContext::List { parent: Some(_) }))
        );
        let drafts = h.mailbox.find_folder(None, "Drafts").unwrap();
        assert_eq!(h.mailbox.folder(drafts).unwrap().kind(), FolderKind::Drafts);
    }

    #[test]
    fn test_noselect_folder_named_after_last_segment() {
        let mut h = logged_in();
        h.feed(b"* LIST (\\Noselect \\No \\Yes) \"/\" ~/Mail/foo\r\n")
            .unwrap();

        let folders: Vec<_> = h
            .helper
            .events
            .iter()
            .filter_map(|e| match e {
                HelperEvent::FolderNew { name, kind, .. } => Some((name.clone(), *kind)),
                _ => None,
            })
            .collect();
        assert_eq!(folders, vec![("foo".to_string(), FolderKind::Generic)]);
        assert!(
            h.session
                .queue()
                .iter()
                .all(|c| !matches!(c.context(), ImapContext::Status { .. }))
        );
    }

    #[test]
    fn test_well_known_folder_case_insensitive() {
        let mut h = logged_in();
        h.feed(b"* LIST () \".\" \"INBOX.sent\"\r\n").unwrap();
        h.feed(b"* LIST () \".\" inbox\r\n").unwrap();
        let kinds: Vec<_> = h
            .mailbox
            .folders()
            .map(|(_, f)| (f.display_name().to_string(), f.kind()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("Sent".to_string(), FolderKind::Sent),
                ("Inbox".to_string(), FolderKind::Inbox),
            ]
        );
    }

    #[test]
    fn test_status_counts() {
        let mut h = logged_in();
        h.feed(b"* LIST () \"/\" INBOX\r\n").unwrap();
        h.exchange(b"a0001 OK done\r\n").unwrap();
        h.feed(b"* STATUS \"INBOX\" (MESSAGES 231 RECENT 2 UNSEEN 5)\r\n")
            .unwrap();
        h.feed(b"* STATUS \"INBOX\" (MESSAGES 231 RECENT 2 UNSEEN 5)\r\n")
            .unwrap();

        let inbox = h.mailbox.find_folder(None, "INBOX").unwrap();
        let status = *h.mailbox.folder(inbox).unwrap().status();
        assert_eq!(status.messages, Some(231));
        assert_eq!(status.unseen, Some(5));
        let notified = h
            .helper
            .events
            .iter()
            .filter(|e| matches!(e, HelperEvent::FolderStatus(..)))
            .count();
        assert_eq!(notified, 1);
    }

    #[test]
    fn test_status_malformed_leaves_counts() {
        let mut h = logged_in();
        h.feed(b"* LIST () \"/\" INBOX\r\n").unwrap();
        h.exchange(b"a0001 OK done\r\n").unwrap();
        h.feed(b"* STATUS INBOX ()\r\n* STATUS INBOX ( )\r\n* STATUS \"\"\r\n")
            .unwrap();
        let inbox = h.mailbox.find_folder(None, "INBOX").unwrap();
        assert!(h.mailbox.folder(inbox).unwrap().status().is_empty());
    }

    #[test]
    fn test_status_failure_continues() {
        let mut h = logged_in();
        h.feed(b"* LIST () \"/\" INBOX\r\n* LIST () \"/\" Junk\r\n")
            .unwrap();
        h.exchange(b"a0001 OK done\r\n").unwrap();
        let sent = h
            .exchange(b"a0002 NO [NONEXISTENT] Unknown mailbox\r\n")
            .unwrap();
        assert_eq!(sent, vec!["a0003 STATUS \"Junk\" (MESSAGES RECENT UNSEEN)\r\n"]);
        assert_eq!(
            h.helper.errors(),
            vec!["Server returned NO: [NONEXISTENT] Unknown mailbox"]
        );

        h.exchange(b"a0003 BAD unknown command\r\n").unwrap();
        assert_eq!(
            h.helper.errors(),
            vec![
                "Server returned NO: [NONEXISTENT] Unknown mailbox",
                "Server returned BAD: unknown command",
            ]
        );
        assert!(h.session.queue().is_empty());
    }

    #[test]
    fn test_unexpected_untagged_is_fatal() {
        let mut h = logged_in();
        let err = h.feed(b"* GARBAGE here\r\n");
        assert!(matches!(err, Err(Error::Parse(_))));
        assert_eq!(
            h.session.queue().head().unwrap().status(),
            CommandStatus::Error
        );
    }

    #[test]
    fn test_informational_lines_are_accepted() {
        let mut h = logged_in();
        h.feed(b"* CAPABILITY IMAP4rev1\r\n* 4 EXPUNGE\r\n* OK [ALERT] hi\r\n")
            .unwrap();
        assert!(h.helper.errors().is_empty());
    }

    #[test]
    fn test_empty_folder_is_not_fetched() {
        let (mut h, _) = examined(0);
        let sent = h.exchange(b"a0003 OK [READ-ONLY] EXAMINE completed\r\n").unwrap();
        assert!(sent.is_empty());
        assert!(h.session.queue().is_empty());
        assert!(
            h.helper
                .account_events()
                .contains(&&AccountEvent::status(AccountStatus::Idle, None))
        );
    }

    #[test]
    fn test_literal_announcement() {
        let (mut h, _) = examined(20);
        let sent = h.exchange(b"a0003 OK done\r\n").unwrap();
        assert_eq!(sent, vec!["a0004 FETCH 1:* (FLAGS BODY.PEEK[HEADER])\r\n"]);

        h.feed(b"* 12 FETCH (RFC822 {1024}\r\n").unwrap();
        let fetch = fetch_head(&h);
        assert_eq!(fetch.id(), 12);
        assert_eq!(fetch.remaining(), 1024);
        assert_eq!(fetch.state(), FetchState::Headers);
    }

    #[test]
    fn test_flags_mapping() {
        let (mut h, inbox) = examined(1);
        h.exchange(b"a0003 OK done\r\n").unwrap();
        h.feed(b"* 1 FETCH (FLAGS (\\Seen \\Answered))\r\n").unwrap();

        let message = h.mailbox.find_message(inbox, 1).unwrap();
        let flags = h.mailbox.message(message).unwrap().flags();
        assert!(flags.contains(MessageFlag::Answered));
        assert_eq!(flags.iter().count(), 1);
        assert_eq!(fetch_head(&h).state(), FetchState::Id);
    }

    #[test]
    fn test_header_literal_consumes_exact_count() {
        let (mut h, inbox) = examined(2);
        h.exchange(b"a0003 OK done\r\n").unwrap();

        // "Subject: hi\r\n" + "\r\n"
        h.feed(b"* 1 FETCH (FLAGS (\\Flagged) BODY[HEADER] {15}\r\n")
            .unwrap();
        h.feed(b"Subject: hi\r\n").unwrap();
        assert_eq!(fetch_head(&h).remaining(), 2);
        h.feed(b"\r\n").unwrap();
        assert_eq!(fetch_head(&h).remaining(), 0);
        assert_eq!(fetch_head(&h).state(), FetchState::Command);
        h.feed(b")\r\n").unwrap();
        assert_eq!(fetch_head(&h).state(), FetchState::Id);

        h.feed(b"* 2 FETCH (BODY[HEADER] {0}\r\n FLAGS (\\Draft))\r\n")
            .unwrap();
        let sent = h.exchange(b"a0004 OK FETCH completed\r\n").unwrap();
        assert!(sent.is_empty());

        let first = h.mailbox.find_message(inbox, 1).unwrap();
        let first = h.mailbox.message(first).unwrap();
        assert_eq!(first.headers(), ["Subject: hi"]);
        assert!(first.body().is_empty());
        assert!(first.flags().contains(MessageFlag::Urgent));

        let second = h.mailbox.find_message(inbox, 2).unwrap();
        assert!(h.mailbox.message(second).unwrap().flags().contains(MessageFlag::Draft));
    }

    #[test]
    fn test_literal_overrun_is_split() {
        let (mut h, inbox) = examined(3);
        h.exchange(b"a0003 OK done\r\n").unwrap();

        h.feed(b"* 3 FETCH (BODY[] {19}\r\nSubject: a\r\n\r\nhello FLAGS (\\Deleted))\r\n")
            .unwrap();
        let message = h.mailbox.find_message(inbox, 3).unwrap();
        let message = h.mailbox.message(message).unwrap();
        assert_eq!(message.source(), b"Subject: a\r\n\r\nhello");
        assert!(message.flags().contains(MessageFlag::Deleted));
        assert_eq!(fetch_head(&h).state(), FetchState::Id);
    }

    #[test]
    fn test_literal_data_is_not_a_response() {
        let (mut h, inbox) = examined(1);
        h.exchange(b"a0003 OK done\r\n").unwrap();

        // 3 + 2 + 2 + 18 + 2 + 5 + 2
        h.feed(b"* 1 FETCH (BODY[] {34}\r\nA:b\r\n\r\na0004 OK not a tag\r\n* BYE\r\n)\r\n")
            .unwrap();
        let message = h.mailbox.find_message(inbox, 1).unwrap();
        assert_eq!(
            h.mailbox.message(message).unwrap().body(),
            b"a0004 OK not a tag\r\n* BYE\r\n"
        );
        assert_eq!(h.session.queue().len(), 1);
    }

    #[test]
    fn test_refresh_single_message() {
        let (mut h, inbox) = examined(1);
        h.exchange(b"a0003 OK done\r\n").unwrap();
        h.feed(b"* 1 FETCH (FLAGS ())\r\n").unwrap();
        h.exchange(b"a0004 OK done\r\n").unwrap();
        let message = h.mailbox.find_message(inbox, 1).unwrap();
        h.helper.clear();

        h.refresh(inbox, Some(message)).unwrap();
        assert_eq!(h.flush().unwrap(), vec!["a0005 EXAMINE \"INBOX\"\r\n"]);
        let sent = h.exchange(b"* 1 EXISTS\r\na0005 OK done\r\n").unwrap();
        assert_eq!(sent, vec!["a0006 FETCH 1 BODY.PEEK[]\r\n"]);

        h.feed(b"* 1 FETCH (BODY[] {12}\r\nX: y\r\n\r\nhi\r\n)\r\n")
            .unwrap();
        let bodies: Vec<_> = h
            .helper
            .events
            .iter()
            .filter_map(|e| match e {
                HelperEvent::Body(m, data, mode) if *m == message => Some((data.clone(), *mode)),
                _ => None,
            })
            .collect();
        assert_eq!(
            bodies,
            vec![
                (Vec::new(), BodyMode::Replace),
                (b"hi\r\n".to_vec(), BodyMode::Append),
            ]
        );
    }

    #[test]
    fn test_refresh_before_greeting_waits_for_login() {
        let mut h = Harness::<Imap4>::new();
        let inbox = h
            .mailbox
            .folder_get_or_create(&mut h.helper, None, "INBOX", Some('/'))
            .unwrap();
        h.refresh(inbox, None).unwrap();
        assert!(!h.session.is_authenticated());

        let sent = h.exchange(b"* OK ready\r\n").unwrap();
        assert_eq!(sent, vec!["a0000 LOGIN joe secret\r\n"]);
        let sent = h.exchange(b"a0000 OK LOGIN completed\r\n").unwrap();
        assert_eq!(sent, vec!["a0001 LIST \"\" \"%\"\r\n"]);
        assert!(h.session.is_authenticated());

        let sent = h
            .exchange(b"* LIST () \"/\" INBOX\r\na0001 OK LIST completed\r\n")
            .unwrap();
        assert_eq!(sent, vec!["a0002 EXAMINE \"INBOX\"\r\n"]);
    }

    #[test]
    fn test_refresh_before_preauth_follows_list() {
        let mut h = Harness::<Imap4>::new();
        let inbox = h
            .mailbox
            .folder_get_or_create(&mut h.helper, None, "INBOX", Some('/'))
            .unwrap();
        h.refresh(inbox, None).unwrap();
        let sent = h.exchange(b"* PREAUTH welcome back\r\n").unwrap();
        assert_eq!(sent, vec!["a0000 LIST \"\" \"%\"\r\n"]);
        let sent = h.exchange(b"a0000 OK done\r\n").unwrap();
        assert_eq!(sent, vec!["a0001 EXAMINE \"INBOX\"\r\n"]);
    }

    #[test]
    fn test_refresh_unknown_folder() {
        let mut h = logged_in();
        let err = h.refresh(FolderId(7), None);
        assert!(matches!(err, Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_keepalive_and_login_redaction() {
        assert!(Imap4::is_sensitive(&ImapContext::Login));
        assert!(!Imap4::is_sensitive(&ImapContext::Noop));
        assert_eq!(Imap4::keepalive().1, "NOOP");
    }

    #[test]
    fn test_default_config() {
        let config = Imap4::default_config();
        assert_eq!(config.get_port("port"), Some(143));
        assert!(!config.get_bool("ssl"));
        let names: Vec<_> = config.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["username", "password", "hostname", "port", "ssl", "", "prefix"]
        );
    }
}
