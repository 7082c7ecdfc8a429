//! Scripted protocol conversations against the sans-I/O session.

#![allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]

use std::time::Duration;

use mailer_account::{
    AccountEvent, AccountStatus, BodyMode, CollectingHelper, Config, EventReporter, FolderId,
    HelperEvent, Host, Imap4, Mailbox, MessageFlag, Pop3, Protocol, Session,
};
use proptest::prelude::*;

const IDLE: Duration = Duration::from_secs(30);

/// Account state plus a session, without any socket.
struct Conversation<P: Protocol> {
    config: Config,
    mailbox: Mailbox,
    helper: CollectingHelper,
    events: EventReporter,
    session: Session<P>,
    sent: Vec<String>,
}

impl<P: Protocol> Conversation<P> {
    fn new() -> Self {
        let mut config = P::default_config();
        config.set_str("username", "joe").unwrap();
        config.set_str("password", "secret").unwrap();
        config.set_str("hostname", "mail.example.com").unwrap();
        let mut conversation = Self {
            config,
            mailbox: Mailbox::new(),
            helper: CollectingHelper::new(),
            events: EventReporter::new(),
            session: Session::new(IDLE),
            sent: Vec::new(),
        };
        let mut host = Host::new(
            &conversation.config,
            &mut conversation.mailbox,
            &mut conversation.helper,
            &mut conversation.events,
        );
        conversation.session.start(&mut host).unwrap();
        conversation
    }

    /// Feeds server bytes, then writes whatever the session wants to send.
    fn server(&mut self, data: &[u8]) -> mailer_account::Result<()> {
        let mut host = Host::new(
            &self.config,
            &mut self.mailbox,
            &mut self.helper,
            &mut self.events,
        );
        self.session.handle_input(data, &mut host)?;
        assert!(self.session.queue().in_flight() <= 1);
        while let Some(data) = self.session.poll_transmit() {
            let data = data.to_vec();
            self.session.advance(data.len(), &mut host)?;
            assert!(self.session.queue().in_flight() <= 1);
            self.sent.push(String::from_utf8(data).unwrap());
        }
        Ok(())
    }

    fn take_sent(&mut self) -> Vec<String> {
        std::mem::take(&mut self.sent)
    }

    fn folder_names(&self) -> Vec<String> {
        self.mailbox
            .folders()
            .map(|(_, folder)| folder.name().to_string())
            .collect()
    }
}

const IMAP_SERVER: &[u8] = b"* OK [CAPABILITY IMAP4rev1] ready\r\n\
a0000 OK LOGIN completed\r\n\
* LIST (\\HasNoChildren) \"/\" INBOX\r\n\
* LIST (\\HasChildren) \"/\" Lists\r\n\
a0001 OK LIST completed\r\n\
* STATUS \"INBOX\" (MESSAGES 3 RECENT 1 UNSEEN 2)\r\n\
a0002 OK STATUS completed\r\n\
* STATUS \"Lists\" (MESSAGES 0 RECENT 0 UNSEEN 0)\r\n\
a0003 OK STATUS completed\r\n\
* LIST (\\HasNoChildren) \"/\" Lists/rust\r\n\
a0004 OK LIST completed\r\n\
* STATUS \"Lists/rust\" (MESSAGES 9 RECENT 0 UNSEEN 0)\r\n\
a0005 OK STATUS completed\r\n";

const IMAP_CLIENT: &[&str] = &[
    "a0000 LOGIN joe secret\r\n",
    "a0001 LIST \"\" \"%\"\r\n",
    "a0002 STATUS \"INBOX\" (MESSAGES RECENT UNSEEN)\r\n",
    "a0003 STATUS \"Lists\" (MESSAGES RECENT UNSEEN)\r\n",
    "a0004 LIST \"\" \"Lists/%\"\r\n",
    "a0005 STATUS \"Lists/rust\" (MESSAGES RECENT UNSEEN)\r\n",
];

/// Opens a pre-authenticated session with a refresh of INBOX requested
/// before the greeting.
const FETCH_SERVER: &[u8] = b"* PREAUTH ready\r\n\
* LIST () \"/\" INBOX\r\n\
a0000 OK LIST completed\r\n\
* 2 EXISTS\r\n\
a0001 OK [READ-ONLY] EXAMINE completed\r\n\
* STATUS \"INBOX\" (MESSAGES 2 RECENT 0 UNSEEN 1)\r\n\
a0002 OK STATUS completed\r\n\
* 1 FETCH (FLAGS (\\Seen) BODY[HEADER] {18}\r\nSubject: hello\r\n\r\n)\r\n\
* 2 FETCH (BODY[HEADER] {18}\r\nSubject: two\r\nX: y FLAGS (\\Answered))\r\n\
a0003 OK FETCH completed\r\n";

const FETCH_CLIENT: &[&str] = &[
    "a0000 LIST \"\" \"%\"\r\n",
    "a0001 EXAMINE \"INBOX\"\r\n",
    "a0002 STATUS \"INBOX\" (MESSAGES RECENT UNSEEN)\r\n",
    "a0003 FETCH 1:* (FLAGS BODY.PEEK[HEADER])\r\n",
];

/// A conversation whose INBOX refresh waits for the login.
fn inbox_refresh_requested() -> (Conversation<Imap4>, FolderId) {
    let mut c = Conversation::<Imap4>::new();
    let inbox = c
        .mailbox
        .folder_get_or_create(&mut c.helper, None, "INBOX", Some('/'))
        .unwrap();
    c.session.refresh(&c.mailbox, inbox, None).unwrap();
    (c, inbox)
}

fn assert_summaries(c: &Conversation<Imap4>, inbox: FolderId) {
    let one = c.mailbox.find_message(inbox, 1).unwrap();
    let two = c.mailbox.find_message(inbox, 2).unwrap();
    let one = c.mailbox.message(one).unwrap();
    let two = c.mailbox.message(two).unwrap();
    assert_eq!(one.headers(), ["Subject: hello"]);
    assert_eq!(two.headers(), ["Subject: two", "X: y"]);
    assert!(one.flags().is_empty());
    assert!(two.flags().contains(MessageFlag::Answered));
    assert!(one.body().is_empty());
    assert!(two.body().is_empty());
}

#[test]
fn test_imap_folder_discovery() {
    let mut c = Conversation::<Imap4>::new();
    c.server(IMAP_SERVER).unwrap();

    assert_eq!(c.take_sent(), IMAP_CLIENT);
    assert_eq!(c.folder_names(), vec!["INBOX", "Lists", "Lists/rust"]);
    assert!(c.session.queue().is_empty());

    let statuses: Vec<_> = c
        .helper
        .account_events()
        .into_iter()
        .filter_map(|event| match event {
            AccountEvent::Status { status, .. } => Some(*status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![AccountStatus::Authenticated, AccountStatus::Idle]);

    let inbox = c.mailbox.find_folder(None, "INBOX").unwrap();
    let status = c.mailbox.folder(inbox).unwrap().status();
    assert_eq!(status.messages, Some(3));
    assert_eq!(status.unseen, Some(2));
}

#[test]
fn test_imap_summaries_then_message() {
    let mut c = Conversation::<Imap4>::new();
    c.server(b"* PREAUTH ready\r\n* LIST () \"/\" INBOX\r\na0000 OK done\r\n")
        .unwrap();
    c.server(b"a0001 OK done\r\n").unwrap();
    let inbox = c.mailbox.find_folder(None, "INBOX").unwrap();
    c.take_sent();

    c.session.refresh(&c.mailbox, inbox, None).unwrap();
    c.server(b"").unwrap();
    c.server(b"* 1 EXISTS\r\na0002 OK [READ-ONLY] done\r\n").unwrap();
    c.server(b"* 1 FETCH (FLAGS (\\Seen) BODY[HEADER] {18}\r\nSubject: hello\r\n\r\n)\r\n")
        .unwrap();
    c.server(b"a0003 OK FETCH completed\r\n").unwrap();
    assert_eq!(
        c.take_sent(),
        vec![
            "a0002 EXAMINE \"INBOX\"\r\n",
            "a0003 FETCH 1:* (FLAGS BODY.PEEK[HEADER])\r\n",
        ]
    );

    let message = c.mailbox.find_message(inbox, 1).unwrap();
    assert_eq!(c.mailbox.message(message).unwrap().headers(), ["Subject: hello"]);

    c.session.refresh(&c.mailbox, inbox, Some(message)).unwrap();
    c.server(b"").unwrap();
    c.server(b"a0004 OK done\r\n").unwrap();
    c.server(b"* 1 FETCH (BODY[] {22}\r\nSubject: hello\r\n\r\nhi\r\n)\r\na0005 OK done\r\n")
        .unwrap();
    assert_eq!(
        c.take_sent(),
        vec!["a0004 EXAMINE \"INBOX\"\r\n", "a0005 FETCH 1 BODY.PEEK[]\r\n"]
    );
    assert_eq!(c.mailbox.message(message).unwrap().body(), b"hi\r\n");
    assert!(c.session.queue().is_empty());
}

#[test]
fn test_imap_summaries_requested_before_greeting() {
    let (mut c, inbox) = inbox_refresh_requested();
    c.server(b"").unwrap();
    assert!(c.take_sent().is_empty());

    c.server(FETCH_SERVER).unwrap();
    assert_eq!(c.take_sent(), FETCH_CLIENT);
    assert_summaries(&c, inbox);
    assert!(c.session.queue().is_empty());
}

#[test]
fn test_imap_keepalive_after_idle() {
    let mut c = Conversation::<Imap4>::new();
    c.server(b"* PREAUTH ready\r\na0000 OK done\r\n").unwrap();
    assert!(c.session.queue().is_empty());
    c.take_sent();

    let deadline = c.session.poll_timeout().unwrap();
    c.session.handle_timeout(deadline - Duration::from_secs(1));
    assert!(c.session.poll_transmit().is_none());

    c.session.handle_timeout(deadline);
    assert!(c.session.poll_timeout().is_none());
    c.server(b"").unwrap();
    assert_eq!(c.take_sent(), vec!["a0001 NOOP\r\n"]);

    c.server(b"* 4 EXISTS\r\na0001 OK NOOP completed\r\n").unwrap();
    assert!(c.session.queue().is_empty());
    assert!(c.session.poll_timeout().is_some());
}

#[test]
fn test_imap_lines_without_command_are_discarded() {
    let mut c = Conversation::<Imap4>::new();
    c.server(b"* PREAUTH ready\r\na0000 OK done\r\n").unwrap();
    c.server(b"* 3 EXISTS\r\nstray\r\n").unwrap();
    assert!(c.session.queue().is_empty());
    assert!(c.helper.errors().is_empty());
}

#[test]
fn test_pop3_failed_retrieve_continues() {
    let mut c = Conversation::<Pop3>::new();
    c.server(b"+OK POP3 ready\r\n+OK\r\n").unwrap();
    c.server(b"+OK logged in\r\n").unwrap();
    c.server(b"+OK 2 320\r\n").unwrap();
    c.server(b"+OK\r\n3 120\r\n4 200\r\n.\r\n").unwrap();
    c.server(b"+OK\r\nSubject: three\r\n\r\n.\r\n").unwrap();
    c.server(b"+OK\r\nSubject: four\r\n\r\n.\r\n").unwrap();
    assert_eq!(
        c.take_sent(),
        vec![
            "USER joe\r\n",
            "PASS secret\r\n",
            "STAT\r\n",
            "LIST\r\n",
            "TOP 3 0\r\n",
            "TOP 4 0\r\n",
        ]
    );

    let inbox = c.session.protocol().inbox().unwrap();
    let three = c.mailbox.find_message(inbox, 3).unwrap();
    let four = c.mailbox.find_message(inbox, 4).unwrap();
    c.session.refresh(&c.mailbox, inbox, Some(three)).unwrap();
    c.session.refresh(&c.mailbox, inbox, Some(four)).unwrap();
    c.helper.clear();

    c.server(b"").unwrap();
    c.server(b"-ERR no such message\r\n").unwrap();
    c.server(b"+OK 20 octets\r\nSubject: four\r\n\r\nHello\r\n..dot\r\n.\r\n")
        .unwrap();
    assert_eq!(c.take_sent(), vec!["RETR 3\r\n", "RETR 4\r\n"]);
    assert_eq!(c.helper.errors(), vec!["Server returned -ERR: no such message"]);

    let bodies: Vec<_> = c
        .helper
        .events
        .iter()
        .filter_map(|event| match event {
            HelperEvent::Body(message, data, _) if *message == four => Some(data.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(bodies.concat(), b"Hello\r\n.dot\r\n");
    assert!(c.helper.events.iter().any(|event| matches!(
        event,
        HelperEvent::Body(message, _, BodyMode::Replace) if *message == four
    )));
    assert_eq!(c.mailbox.message(four).unwrap().body(), b"Hello\r\n.dot\r\n");
    assert!(c.session.queue().is_empty());
}

#[test]
fn test_pop3_retrieve_requested_before_login() {
    let mut c = Conversation::<Pop3>::new();
    let inbox = c.session.protocol().inbox().unwrap();
    let three = c
        .mailbox
        .message_get_or_create(&mut c.helper, inbox, 3)
        .unwrap();
    c.session.refresh(&c.mailbox, inbox, Some(three)).unwrap();
    c.server(b"").unwrap();
    assert!(c.take_sent().is_empty());

    c.server(b"+OK ready\r\n+OK\r\n+OK\r\n").unwrap();
    assert_eq!(c.take_sent(), vec!["USER joe\r\n", "PASS secret\r\n", "STAT\r\n"]);
    c.server(b"+OK 1 20\r\n").unwrap();
    assert_eq!(c.take_sent(), vec!["RETR 3\r\n"]);

    c.server(b"+OK\r\nSubject: three\r\n\r\nbody\r\n.\r\n").unwrap();
    assert_eq!(c.take_sent(), vec!["LIST\r\n"]);
    assert_eq!(c.mailbox.message(three).unwrap().body(), b"body\r\n");
}

#[test]
fn test_pop3_stat_sets_inbox_count() {
    let mut c = Conversation::<Pop3>::new();
    c.server(b"+OK ready\r\n+OK\r\n+OK\r\n+OK 5 1000\r\n").unwrap();
    let inbox = c.session.protocol().inbox().unwrap();
    assert_eq!(c.mailbox.folder(inbox).unwrap().status().messages, Some(5));
}

proptest! {
    #[test]
    fn prop_fragmentation_does_not_change_outcome(
        cuts in proptest::collection::vec(0..IMAP_SERVER.len(), 0..24)
    ) {
        let mut cuts = cuts;
        cuts.push(0);
        cuts.push(IMAP_SERVER.len());
        cuts.sort_unstable();
        cuts.dedup();

        let mut c = Conversation::<Imap4>::new();
        for window in cuts.windows(2) {
            c.server(&IMAP_SERVER[window[0]..window[1]]).unwrap();
        }
        prop_assert_eq!(c.take_sent(), IMAP_CLIENT);
        prop_assert_eq!(c.folder_names(), vec!["INBOX", "Lists", "Lists/rust"]);
        prop_assert!(c.session.queue().is_empty());
    }

    #[test]
    fn prop_fragmented_fetch_literals(
        cuts in proptest::collection::vec(0..FETCH_SERVER.len(), 0..24)
    ) {
        let mut cuts = cuts;
        cuts.push(0);
        cuts.push(FETCH_SERVER.len());
        cuts.sort_unstable();
        cuts.dedup();

        let (mut c, inbox) = inbox_refresh_requested();
        for window in cuts.windows(2) {
            c.server(&FETCH_SERVER[window[0]..window[1]]).unwrap();
        }
        prop_assert_eq!(c.take_sent(), FETCH_CLIENT);
        assert_summaries(&c, inbox);
        prop_assert!(c.session.queue().is_empty());
    }

    #[test]
    fn prop_garbage_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut c = Conversation::<Imap4>::new();
        let _ = c.server(&data);
        prop_assert!(c.session.queue().in_flight() <= 1);
    }
}
