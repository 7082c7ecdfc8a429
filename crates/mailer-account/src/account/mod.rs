//! Account driver.
//!
//! An [`Account`] owns the configuration, the mailbox model and the host
//! helper of one mail account, and runs a [`Session`] over a real
//! connection:
//!
//! ```text
//! resolve ──→ connect (each address in turn) ──→ TLS? ──→ session loop
//!                                                           │
//!          read ──→ handle_input      poll_transmit ──→ write
//!          idle deadline ──→ handle_timeout
//!          Request::Refresh ──→ refresh     Request::Stop ──→ return
//! ```
//!
//! The model outlives the connection: after [`Account::run`] returns the
//! host keeps its offline view, and a later run reuses the existing folders
//! and messages. [`Account::destroy`] tears the model down.

mod backend;
mod handle;

use std::marker::PhantomData;
use std::net::SocketAddr;

pub use backend::{AccountBackend, AccountKind, KnownProtocol, RunFuture};
pub use handle::{AccountHandle, Request, Requests, requests};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::connection::{
    AccountStream, Settings, TlsSetup, connect_addr, default_roots, resolve,
};
use crate::event::{AccountStatus, EventReporter};
use crate::helper::AccountHelper;
use crate::protocol::{Host, Protocol, Session};
use crate::types::{FolderId, Mailbox, MessageId};
use crate::{Error, Result};

/// One mail account speaking protocol `P` to its server.
pub struct Account<P: Protocol, H: AccountHelper> {
    config: Config,
    settings: Settings,
    mailbox: Mailbox,
    helper: H,
    events: EventReporter,
    protocol: PhantomData<fn() -> P>,
}

impl<P: Protocol, H: AccountHelper> Account<P, H> {
    /// Creates an account with the protocol's default configuration.
    #[must_use]
    pub fn new(helper: H) -> Self {
        Self {
            config: P::default_config(),
            settings: Settings::default(),
            mailbox: Mailbox::new(),
            helper,
            events: EventReporter::new(),
            protocol: PhantomData,
        }
    }

    /// Replaces the connection tunables.
    #[must_use]
    pub const fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Account configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Account configuration, for editing.
    pub const fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Connection tunables.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Connection tunables, for editing before the next run.
    pub const fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Folder and message model.
    #[must_use]
    pub const fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Host helper.
    #[must_use]
    pub const fn helper(&self) -> &H {
        &self.helper
    }

    /// Host helper, mutably.
    pub const fn helper_mut(&mut self) -> &mut H {
        &mut self.helper
    }

    /// Returns true between the start and the end of [`Self::run`].
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.events.is_running()
    }

    /// Returns the raw source of a message as far as it was downloaded.
    #[must_use]
    pub fn source(&self, folder: FolderId, message: MessageId) -> Option<String> {
        self.mailbox
            .message(message)
            .filter(|m| m.folder() == folder)
            .map(|m| String::from_utf8_lossy(&m.source()).into_owned())
    }

    /// Connects and serves requests until stopped or disconnected.
    ///
    /// Every failure is reported through the helper before this returns.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the connection. An explicit
    /// [`Request::Stop`] ends it with `Ok`.
    pub async fn run(&mut self, requests: &mut Requests) -> Result<()> {
        self.events.started(&mut self.helper);
        let result = self.serve(requests).await;
        requests.reset();
        match &result {
            Ok(()) => tracing::info!(protocol = P::NAME, "account stopped"),
            Err(e) => tracing::error!(protocol = P::NAME, error = %e, "account stopped"),
        }
        self.events.stopped(&mut self.helper);
        result
    }

    /// Tears the model down and returns the helper.
    pub fn destroy(mut self) -> H {
        self.mailbox.clear(&mut self.helper);
        self.helper
    }

    async fn serve(&mut self, requests: &mut Requests) -> Result<()> {
        let Some(hostname) = self.config.get_str("hostname").map(str::to_string) else {
            let error = Error::Config("No hostname set".to_string());
            self.helper.error("No hostname set");
            return Err(error);
        };
        let port = self.config.get_port("port").unwrap_or(P::DEFAULT_PORT);
        let ssl = self.config.get_bool("ssl");

        let stream = tokio::select! {
            result = self.establish(&hostname, port, ssl) => result?,
            () = requests.stopped() => {
                tracing::info!(%hostname, "stopped while connecting");
                return Ok(());
            }
        };

        let mut session = Session::<P>::new(self.settings.idle_delay);
        let result = self.drive(&mut session, stream, requests).await;
        session.teardown();
        result
    }

    /// Resolves the server and connects to the first address that answers.
    async fn establish(&mut self, hostname: &str, port: u16, ssl: bool) -> Result<AccountStream> {
        let addrs = match resolve(hostname, port).await {
            Ok(addrs) => addrs,
            Err(e) => {
                self.helper.error(&e.to_string());
                return Err(e);
            }
        };
        let tcp = self.connect_any(hostname, addrs).await?;
        if !ssl {
            return Ok(AccountStream::plain(tcp));
        }
        self.secure(hostname, tcp).await
    }

    /// Tries every address in order. Each failure is reported and the next
    /// address is tried regardless of the helper's answer.
    async fn connect_any(&mut self, hostname: &str, addrs: Vec<SocketAddr>) -> Result<TcpStream> {
        let mut last = None;
        for addr in addrs {
            self.events.status(
                &mut self.helper,
                AccountStatus::Connecting,
                Some(format!("Connecting to {hostname} ({addr})")),
            );
            match connect_addr(addr).await {
                Ok(tcp) => {
                    self.events.status(
                        &mut self.helper,
                        AccountStatus::Connected,
                        Some(format!("Connected to {hostname} ({addr})")),
                    );
                    return Ok(tcp);
                }
                Err(source) => {
                    let error = Error::Connect { addr, source };
                    tracing::warn!(%addr, error = %error, "connection attempt failed");
                    self.helper.error(&error.to_string());
                    last = Some(error);
                }
            }
        }
        Err(last.unwrap_or_else(|| Error::Resolve {
            host: hostname.to_string(),
            source: std::io::ErrorKind::NotFound.into(),
        }))
    }

    /// Runs the TLS handshake and asks the user about untrusted certificates.
    async fn secure(&mut self, hostname: &str, tcp: TcpStream) -> Result<AccountStream> {
        let roots = self.helper.tls_roots().unwrap_or_else(default_roots);
        let handshake = match TlsSetup::new(roots) {
            Ok(setup) => setup.connect(hostname, tcp).await,
            Err(e) => Err(e),
        };
        let (stream, issue) = match handshake {
            Ok(done) => done,
            Err(e) => {
                self.helper.error(&e.to_string());
                return Err(e);
            }
        };
        if let Some(issue) = issue {
            tracing::warn!(hostname, %issue, "server certificate is not trusted");
            if !self.helper.confirm(issue.prompt()) {
                let error = Error::CertificateRejected(issue.to_string());
                self.helper.error(&error.to_string());
                return Err(error);
            }
        }
        Ok(AccountStream::tls(stream))
    }

    async fn drive(
        &mut self,
        session: &mut Session<P>,
        stream: AccountStream,
        requests: &mut Requests,
    ) -> Result<()> {
        {
            let mut host = Host::new(
                &self.config,
                &mut self.mailbox,
                &mut self.helper,
                &mut self.events,
            );
            if let Err(e) = session.start(&mut host) {
                host.helper.error(&e.to_string());
                return Err(e);
            }
        }

        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut buf = vec![0u8; self.settings.read_chunk.max(1)];
        loop {
            let deadline = session.poll_timeout();
            tokio::select! {
                read = reader.read(&mut buf) => {
                    let n = match read {
                        Ok(0) => return self.disconnected(Error::ConnectionLost(
                            "closed by server".to_string(),
                        )),
                        Ok(n) => n,
                        Err(e) => return self.disconnected(Error::Io(e)),
                    };
                    let result = {
                        let mut host = Host::new(
                            &self.config,
                            &mut self.mailbox,
                            &mut self.helper,
                            &mut self.events,
                        );
                        session.handle_input(&buf[..n], &mut host)
                    };
                    if let Err(e) = result {
                        self.report(e)?;
                    }
                }
                written = transmit(&mut writer, session.poll_transmit()) => {
                    let n = match written {
                        Ok(n) => n,
                        Err(e) => return self.disconnected(Error::Io(e)),
                    };
                    let result = {
                        let mut host = Host::new(
                            &self.config,
                            &mut self.mailbox,
                            &mut self.helper,
                            &mut self.events,
                        );
                        session.advance(n, &mut host)
                    };
                    if let Err(e) = writer.flush().await {
                        return self.disconnected(Error::Io(e));
                    }
                    if let Err(e) = result {
                        self.report(e)?;
                    }
                }
                due = idle(deadline) => session.handle_timeout(due),
                request = requests.next() => match request {
                    Request::Refresh { folder, message } => {
                        if let Err(e) = session.refresh(&self.mailbox, folder, message) {
                            tracing::warn!(%folder, error = %e, "refresh refused");
                            self.report(e)?;
                        }
                    }
                    Request::Stop => {
                        tracing::info!(protocol = P::NAME, "stop requested");
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Reports a failure to the user. Only fatal errors end the session.
    fn report(&mut self, error: Error) -> Result<()> {
        self.helper.error(&error.to_string());
        if error.is_fatal() {
            return Err(error);
        }
        Ok(())
    }

    fn disconnected(&mut self, error: Error) -> Result<()> {
        tracing::warn!(protocol = P::NAME, error = %error, "connection lost");
        self.events.status(
            &mut self.helper,
            AccountStatus::Disconnected,
            Some(error.to_string()),
        );
        Err(error)
    }
}

impl<P: Protocol, H: AccountHelper> std::fmt::Debug for Account<P, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("protocol", &P::NAME)
            .field("folders", &self.mailbox.folder_count())
            .field("messages", &self.mailbox.message_count())
            .field("running", &self.events.is_running())
            .finish_non_exhaustive()
    }
}

/// Writes pending bytes with a single `write` call; never completes when
/// there are none.
///
/// Dropping the future before it completes writes nothing, so it can race
/// other branches of a `select!`. The caller flushes after accounting for
/// the bytes written.
async fn transmit<W>(writer: &mut W, data: Option<&[u8]>) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let Some(data) = data else {
        return std::future::pending().await;
    };
    let n = writer.write(data).await?;
    if n == 0 {
        return Err(std::io::ErrorKind::WriteZero.into());
    }
    Ok(n)
}

/// Sleeps until the keepalive deadline and returns it; never completes
/// when the timer is not armed.
async fn idle(deadline: Option<std::time::Instant>) -> std::time::Instant {
    let Some(deadline) = deadline else {
        return std::future::pending().await;
    };
    tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
    deadline
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
    use std::time::Duration;

    use super::*;
    use crate::config::ConfigValue;
    use crate::event::AccountEvent;
    use crate::helper::{CollectingHelper, HelperEvent};
    use crate::imap::Imap4;
    use crate::pop3::Pop3;

    #[tokio::test]
    async fn test_transmit_writes() {
        let mut mock = tokio_test::io::Builder::new().write(b"a0000 NOOP\r\n").build();
        let n = transmit(&mut mock, Some(b"a0000 NOOP\r\n")).await.unwrap();
        assert_eq!(n, 12);
    }

    #[tokio::test]
    async fn test_transmit_cancelled_writes_nothing() {
        let (mut client, mut server) = tokio::io::duplex(4);
        client.write_all(b"full").await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(20),
            transmit(&mut client, Some(b"a0000 NOOP\r\n")),
        )
        .await;
        assert!(blocked.is_err());

        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"full");

        let n = transmit(&mut client, Some(b"a0000 NOOP\r\n")).await.unwrap();
        assert_eq!(n, 4);
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"a000");
    }

    #[tokio::test]
    async fn test_connect_tries_next_address_after_refusal() {
        let refused = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let live = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_addr = live.local_addr().unwrap();

        let mut helper = CollectingHelper::new();
        helper.recoverable = false;
        let mut account = Account::<Pop3, _>::new(helper);
        let tcp = account
            .connect_any("localhost", vec![refused, live_addr])
            .await
            .unwrap();
        assert_eq!(tcp.peer_addr().unwrap(), live_addr);

        let helper = account.helper();
        assert_eq!(helper.errors().len(), 1);
        assert!(helper.errors()[0].starts_with("Connection failed"));
        let statuses: Vec<_> = helper
            .account_events()
            .into_iter()
            .filter_map(|event| match event {
                AccountEvent::Status { status, .. } => Some(*status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                AccountStatus::Connecting,
                AccountStatus::Connecting,
                AccountStatus::Connected,
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_reports_every_refusal() {
        let refused = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let mut account = Account::<Imap4, _>::new(CollectingHelper::new());
        let result = account.connect_any("localhost", vec![refused, refused]).await;
        assert!(matches!(result, Err(Error::Connect { addr, .. }) if addr == refused));
        assert_eq!(account.helper().errors().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_waits_for_deadline() {
        let deadline = std::time::Instant::now() + Duration::from_secs(30);
        let early = tokio::time::timeout(Duration::from_secs(10), idle(Some(deadline))).await;
        assert!(early.is_err());
        let due = tokio::time::timeout(Duration::from_secs(60), idle(Some(deadline))).await;
        assert_eq!(due.unwrap(), deadline);
        let never = tokio::time::timeout(Duration::from_secs(3600), idle(None)).await;
        assert!(never.is_err());
    }

    #[tokio::test]
    async fn test_missing_hostname() {
        let mut account = Account::<Imap4, _>::new(CollectingHelper::new());
        let (_handle, mut requests) = requests();
        let result = account.run(&mut requests).await;
        assert!(matches!(result, Err(Error::Config(_))));

        let helper = account.helper();
        assert_eq!(helper.errors(), vec!["No hostname set"]);
        assert_eq!(
            helper.account_events(),
            vec![&AccountEvent::Started, &AccountEvent::Stopped]
        );
        assert!(!account.is_running());
    }

    #[test]
    fn test_report_ends_session_only_when_fatal() {
        let mut account = Account::<Imap4, _>::new(CollectingHelper::new());
        assert!(account.report(Error::No("[NONEXISTENT] gone".into())).is_ok());
        assert!(account.report(Error::InvalidState("unknown folder #7".into())).is_ok());
        assert!(matches!(
            account.report(Error::Parse("junk".into())),
            Err(Error::Parse(_))
        ));
        assert_eq!(
            account.helper().errors(),
            vec![
                "Server returned NO: [NONEXISTENT] gone",
                "Invalid state: unknown folder #7",
                "Parse error: junk",
            ]
        );
    }

    #[test]
    fn test_source_and_destroy() {
        let mut account = Account::<Pop3, _>::new(CollectingHelper::new());
        let Account {
            mailbox, helper, ..
        } = &mut account;
        let inbox = mailbox.folder_get_or_create(helper, None, "INBOX", None).unwrap();
        let message = mailbox.message_get_or_create(helper, inbox, 1).unwrap();
        mailbox.add_header(helper, message, "Subject: hi");
        mailbox.set_body(helper, message, b"body\r\n", crate::helper::BodyMode::Replace);

        assert_eq!(
            account.source(inbox, message).as_deref(),
            Some("Subject: hi\r\n\r\nbody\r\n")
        );
        assert_eq!(account.source(FolderId(9), message), None);

        let helper = account.destroy();
        assert!(helper.events.contains(&HelperEvent::MessageDelete(message)));
        assert!(helper.events.contains(&HelperEvent::FolderDelete(inbox)));
    }

    #[test]
    fn test_settings_and_config() {
        let settings = Settings::builder().idle_delay(Duration::from_secs(5)).build();
        let mut account = Account::<Imap4, _>::new(CollectingHelper::new()).with_settings(settings);
        assert_eq!(account.settings().idle_delay, Duration::from_secs(5));
        account
            .config_mut()
            .set("hostname", ConfigValue::String("imap.example.com".into()))
            .unwrap();
        assert_eq!(account.config().get_str("hostname"), Some("imap.example.com"));
        assert!(format!("{account:?}").contains("IMAP4"));
    }
}
