//! Integration tests for the account driver.
//!
//! These tests run accounts against scripted servers listening on the
//! loopback interface.

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

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use mailer_account::{
    Account, AccountEvent, AccountHandle, AccountHelper, AccountKind, AccountStatus,
    CollectingHelper, ConfigValue, Error, FolderId, FolderKind, HelperEvent, Imap4, MessageId,
    Pop3, Protocol, requests,
};

const LIMIT: Duration = Duration::from_secs(10);

/// Records callbacks, refreshes the first folder on the first idle and stops
/// the account on the next one.
struct Scripted {
    inner: CollectingHelper,
    handle: AccountHandle,
    first_folder: Option<FolderId>,
    idles: usize,
    refresh_first: bool,
}

impl Scripted {
    fn new(handle: AccountHandle, refresh_first: bool) -> Self {
        Self {
            inner: CollectingHelper::new(),
            handle,
            first_folder: None,
            idles: 0,
            refresh_first,
        }
    }

    fn statuses(&self) -> Vec<AccountStatus> {
        self.inner
            .account_events()
            .into_iter()
            .filter_map(|event| match event {
                AccountEvent::Status { status, .. } => Some(*status),
                _ => None,
            })
            .collect()
    }
}

impl AccountHelper for Scripted {
    fn folder_new(
        &mut self,
        folder: FolderId,
        parent: Option<FolderId>,
        kind: FolderKind,
        name: &str,
    ) -> bool {
        self.first_folder.get_or_insert(folder);
        self.inner.folder_new(folder, parent, kind, name)
    }

    fn message_new(&mut self, folder: FolderId, message: MessageId) -> bool {
        self.inner.message_new(folder, message)
    }

    fn message_set_header(&mut self, message: MessageId, header: &str) {
        self.inner.message_set_header(message, header);
    }

    fn event(&mut self, event: &AccountEvent) {
        self.inner.event(event);
        if !matches!(
            event,
            AccountEvent::Status {
                status: AccountStatus::Idle,
                ..
            }
        ) {
            return;
        }
        self.idles += 1;
        match (self.idles, self.refresh_first, self.first_folder) {
            (1, true, Some(folder)) => self.handle.refresh(folder, None).unwrap(),
            _ => self.handle.stop(),
        }
    }

    fn error(&mut self, text: &str) -> bool {
        self.inner.error(text)
    }
}

fn account<P: Protocol>(
    port: u16,
    handle: AccountHandle,
    refresh_first: bool,
) -> Account<P, Scripted> {
    let mut account = Account::<P, Scripted>::new(Scripted::new(handle, refresh_first));
    let config = account.config_mut();
    config.set_str("username", "joe").unwrap();
    config.set_str("password", "secret").unwrap();
    config.set_str("hostname", "127.0.0.1").unwrap();
    config.set("port", ConfigValue::Port(port)).unwrap();
    account
}

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Answers one POP3 client, returning the commands it sent.
async fn pop3_server(listener: TcpListener) -> Vec<String> {
    let (stream, _) = listener.accept().await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut received = Vec::new();

    writer.write_all(b"+OK POP3 server ready\r\n").await.unwrap();
    while let Ok(Some(line)) = lines.next_line().await {
        let reply: &[u8] = match line.as_str() {
            "USER joe" | "PASS secret" => b"+OK\r\n",
            "STAT" => b"+OK 2 300\r\n",
            "LIST" => b"+OK 2 messages\r\n1 100\r\n2 200\r\n.\r\n",
            "TOP 1 0" => b"+OK\r\nSubject: first\r\n\r\n.\r\n",
            "TOP 2 0" => b"+OK\r\nSubject: second\r\nFrom: joe@example.com\r\n\r\n.\r\n",
            _ => b"-ERR unknown command\r\n",
        };
        received.push(line);
        if writer.write_all(reply).await.is_err() {
            break;
        }
    }
    received
}

/// Answers one IMAP client, returning the commands it sent without tags.
async fn imap_server(listener: TcpListener) -> Vec<String> {
    let (stream, _) = listener.accept().await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut received = Vec::new();

    writer.write_all(b"* OK IMAP4rev1 ready\r\n").await.unwrap();
    while let Ok(Some(line)) = lines.next_line().await {
        let (tag, command) = line.split_once(' ').unwrap();
        let data = match command {
            "LIST \"\" \"%\"" => "* LIST (\\HasNoChildren) \"/\" INBOX\r\n".to_string(),
            "STATUS \"INBOX\" (MESSAGES RECENT UNSEEN)" => {
                "* STATUS \"INBOX\" (MESSAGES 1 RECENT 0 UNSEEN 1)\r\n".to_string()
            }
            "EXAMINE \"INBOX\"" => "* 1 EXISTS\r\n* 0 RECENT\r\n".to_string(),
            "FETCH 1:* (FLAGS BODY.PEEK[HEADER])" => {
                "* 1 FETCH (FLAGS () BODY[HEADER] {18}\r\nSubject: hello\r\n\r\n)\r\n".to_string()
            }
            _ => String::new(),
        };
        let reply = format!("{data}{tag} OK done\r\n");
        received.push(command.to_string());
        if writer.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }
    received
}

#[tokio::test]
async fn test_pop3_account_downloads_headers() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(pop3_server(listener));

    let (handle, mut requests) = requests();
    let mut account = account::<Pop3>(port, handle, false);
    let result = tokio::time::timeout(LIMIT, account.run(&mut requests))
        .await
        .unwrap();
    assert!(result.is_ok());

    let helper = account.destroy();
    let events = helper.inner.account_events();
    assert_eq!(events.first(), Some(&&AccountEvent::Started));
    assert_eq!(events.last(), Some(&&AccountEvent::Stopped));
    assert_eq!(
        helper.statuses(),
        vec![
            AccountStatus::Connecting,
            AccountStatus::Connected,
            AccountStatus::Authenticated,
            AccountStatus::Idle,
        ]
    );
    assert!(helper.inner.events.contains(&HelperEvent::FolderNew {
        folder: FolderId(0),
        parent: None,
        kind: FolderKind::Inbox,
        name: "Inbox".to_string(),
    }));
    let headers: Vec<_> = helper
        .inner
        .events
        .iter()
        .filter_map(|event| match event {
            HelperEvent::Header(_, header) => Some(header.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        headers,
        vec!["Subject: first", "Subject: second", "From: joe@example.com"]
    );

    let received = server.await.unwrap();
    assert_eq!(
        received,
        vec!["USER joe", "PASS secret", "STAT", "LIST", "TOP 1 0", "TOP 2 0"]
    );
}

#[tokio::test]
async fn test_imap_account_lists_and_refreshes() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(imap_server(listener));

    let (handle, mut requests) = requests();
    let mut account = account::<Imap4>(port, handle, true);
    let result = tokio::time::timeout(LIMIT, account.run(&mut requests))
        .await
        .unwrap();
    assert!(result.is_ok());

    let inbox = account.mailbox().find_folder(None, "INBOX").unwrap();
    assert_eq!(account.mailbox().folder(inbox).unwrap().status().unseen, Some(1));
    let message = account.mailbox().find_message(inbox, 1).unwrap();
    assert_eq!(
        account.source(inbox, message).unwrap(),
        "Subject: hello\r\n\r\n"
    );
    assert_eq!(account.helper().idles, 2);
    assert!(account.helper().inner.errors().is_empty());

    drop(account);
    let received = server.await.unwrap();
    assert_eq!(
        received,
        vec![
            "LOGIN joe secret",
            "LIST \"\" \"%\"",
            "STATUS \"INBOX\" (MESSAGES RECENT UNSEEN)",
            "EXAMINE \"INBOX\"",
            "FETCH 1:* (FLAGS BODY.PEEK[HEADER])",
        ]
    );
}

#[tokio::test]
async fn test_connection_refused() {
    let (listener, port) = listener().await;
    drop(listener);

    let (handle, mut requests) = requests();
    let mut account = account::<Pop3>(port, handle, false);
    let result = tokio::time::timeout(LIMIT, account.run(&mut requests))
        .await
        .unwrap();
    assert!(matches!(result, Err(Error::Connect { .. })));

    let helper = account.helper();
    assert_eq!(helper.inner.errors().len(), 1);
    assert_eq!(helper.statuses(), vec![AccountStatus::Connecting]);
    assert_eq!(
        helper.inner.account_events().last(),
        Some(&&AccountEvent::Stopped)
    );
}

#[tokio::test]
async fn test_server_hangs_up() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (mut stream, _): (TcpStream, _) = listener.accept().await.unwrap();
        stream.write_all(b"+OK ready\r\n").await.unwrap();
        stream.shutdown().await.unwrap();
    });

    let (handle, mut requests) = requests();
    let mut account = account::<Pop3>(port, handle, false);
    let result = tokio::time::timeout(LIMIT, account.run(&mut requests))
        .await
        .unwrap();
    assert!(matches!(
        result,
        Err(Error::ConnectionLost(_) | Error::Io(_))
    ));
    assert_eq!(
        account.helper().statuses().last(),
        Some(&AccountStatus::Disconnected)
    );
    assert!(!account.is_running());
    server.await.unwrap();
}

#[tokio::test]
async fn test_stop_while_connected() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // Never greet; the account waits until it is stopped.
        tokio::time::sleep(LIMIT).await;
        stream.shutdown().await.ok();
    });

    let (handle, mut requests) = requests();
    let mut account = account::<Imap4>(port, handle.clone(), false);
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop();
    });
    let result = tokio::time::timeout(LIMIT, account.run(&mut requests))
        .await
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(
        account.helper().statuses(),
        vec![AccountStatus::Connecting, AccountStatus::Connected]
    );
    stopper.await.unwrap();
    server.abort();
}

#[tokio::test]
async fn test_backend_by_kind() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(pop3_server(listener));

    let (handle, mut requests) = requests();
    let mut backend = AccountKind::Pop3.create(Scripted::new(handle, false));
    backend
        .config_mut()
        .set_str("hostname", "127.0.0.1")
        .unwrap();
    backend.config_mut().set_str("username", "joe").unwrap();
    backend.config_mut().set_str("password", "secret").unwrap();
    backend
        .config_mut()
        .set("port", ConfigValue::Port(port))
        .unwrap();

    let result = tokio::time::timeout(LIMIT, backend.start(&mut requests))
        .await
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(backend.mailbox().message_count(), 2);
    backend.destroy();
    server.await.unwrap();
}
