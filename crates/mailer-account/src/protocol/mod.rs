//! Sans-I/O session engine.
//!
// Allow missing_const_for_fn since many functions can't be const in stable Rust.
#![allow(clippy::missing_const_for_fn)]
//!
//! A [`Session`] drives one connection of a [`Protocol`] without performing
//! any I/O itself:
//!
//! - Received bytes go in via `handle_input()`
//! - Bytes to send come out of `poll_transmit()` and are acknowledged with
//!   `advance()`
//! - The keepalive deadline is reported by `poll_timeout()` and fired by
//!   `handle_timeout()`
//!
//! Commands run strictly one at a time. Each received line is routed to the
//! command at the head of the queue; follow-up commands produced while
//! interpreting a line are appended to the tail. When the head completes it
//! is removed, and once the queue drains the host is told the account is
//! idle and the keepalive timer starts.
//!
//! # Example
//!
//! ```ignore
//! use mailer_account::protocol::{Host, Session};
//! use mailer_account::imap::Imap4;
//!
//! let mut session = Session::<Imap4>::new(idle_delay);
//! session.start(&mut host)?;
//!
//! loop {
//!     while let Some(data) = session.poll_transmit() {
//!         let n = send_to_server(data);
//!         session.advance(n, &mut host)?;
//!     }
//!     let received = read_from_server();
//!     session.handle_input(&received, &mut host)?;
//! }
//! ```

mod buffer;
#[cfg(test)]
pub(crate) mod harness;
mod queue;
mod state;

use std::time::{Duration, Instant};

pub use buffer::{LineBuffer, MAX_LINE_LENGTH};
pub use queue::{Command, CommandQueue};
pub use state::CommandStatus;

use crate::config::Config;
use crate::event::{AccountStatus, EventReporter};
use crate::helper::{AccountHelper, BodyMode};
use crate::types::{FolderId, FolderStatus, Mailbox, MessageFlag, MessageId, Tag};
use crate::Result;

/// A mail retrieval protocol.
///
/// Implementations hold no I/O; they frame commands and interpret the lines
/// the server sends in reply to the head command.
pub trait Protocol: Send + Sized + 'static {
    /// Per-command state carried in the queue.
    type Context: std::fmt::Debug + Send;

    /// Short protocol name.
    const NAME: &'static str;
    /// Human readable protocol title.
    const TITLE: &'static str;
    /// Port used when none is configured.
    const DEFAULT_PORT: u16;
    /// Folders can nest. Without a hierarchy every folder is a root.
    const HIERARCHICAL: bool = true;

    /// Creates the protocol state for a new connection.
    fn new() -> Self;

    /// Configuration entries of the protocol with their defaults.
    fn default_config() -> Config;

    /// Context of the pseudo-command that awaits the server greeting.
    fn greeting() -> Self::Context;

    /// Command queued after the connection stayed idle.
    fn keepalive() -> (Self::Context, String);

    /// Returns true if the command text must not be logged.
    fn is_sensitive(context: &Self::Context) -> bool {
        let _ = context;
        false
    }

    /// Turns command text into its tag and wire bytes.
    fn frame(&mut self, text: &str) -> (Option<Tag>, Vec<u8>);

    /// Called once when the connection is up, before any line is received.
    ///
    /// # Errors
    ///
    /// Errors returned here abort the connection.
    fn connected(&mut self, exchange: &mut Exchange<'_, '_, Self::Context>) -> Result<()> {
        let _ = exchange;
        Ok(())
    }

    /// Builds the command that refreshes a folder or a single message.
    ///
    /// Returns `None` when the protocol has nothing to do for the request.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidState`] if the folder or message is not
    /// in the model.
    fn refresh(
        &mut self,
        mailbox: &Mailbox,
        folder: FolderId,
        message: Option<MessageId>,
    ) -> Result<Option<(Self::Context, String)>>;

    /// Interprets one line received while `command` is at the head.
    ///
    /// # Errors
    ///
    /// An error is fatal for the connection. Recoverable failures mark the
    /// command [`CommandStatus::Error`] and return `Ok`.
    fn receive(
        &mut self,
        command: &mut Command<Self::Context>,
        line: &[u8],
        exchange: &mut Exchange<'_, '_, Self::Context>,
    ) -> Result<()>;
}

/// Account state a session works on.
pub struct Host<'a> {
    /// Account configuration.
    pub config: &'a Config,
    /// Folder and message model.
    pub mailbox: &'a mut Mailbox,
    /// Host callbacks.
    pub helper: &'a mut dyn AccountHelper,
    /// Event reporter.
    pub events: &'a mut EventReporter,
}

impl<'a> Host<'a> {
    /// Bundles the account state.
    pub fn new(
        config: &'a Config,
        mailbox: &'a mut Mailbox,
        helper: &'a mut dyn AccountHelper,
        events: &'a mut EventReporter,
    ) -> Self {
        Self {
            config,
            mailbox,
            helper,
            events,
        }
    }
}

/// What a protocol may touch while interpreting a line.
pub struct Exchange<'h, 'a, C> {
    host: &'h mut Host<'a>,
    hierarchical: bool,
    authenticated: bool,
    follow_ups: Vec<(C, String)>,
}

impl<'h, 'a, C> Exchange<'h, 'a, C> {
    fn new(host: &'h mut Host<'a>, hierarchical: bool) -> Self {
        Self {
            host,
            hierarchical,
            authenticated: false,
            follow_ups: Vec::new(),
        }
    }

    /// Commands queued by the protocol, and whether it reported a login.
    fn finish(self) -> (Vec<(C, String)>, bool) {
        (self.follow_ups, self.authenticated)
    }

    /// Queues a command behind everything already queued.
    pub fn enqueue(&mut self, context: C, text: impl Into<String>) {
        self.follow_ups.push((context, text.into()));
    }

    /// Account configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        self.host.config
    }

    /// Folder and message model.
    #[must_use]
    pub fn mailbox(&self) -> &Mailbox {
        self.host.mailbox
    }

    /// Reports a status change.
    pub fn status(&mut self, status: AccountStatus, message: Option<String>) {
        if status == AccountStatus::Authenticated {
            self.authenticated = true;
        }
        self.host.events.status(self.host.helper, status, message);
    }

    /// Asks the host for a password.
    pub fn authenticate(&mut self, prompt: &str) -> Option<String> {
        self.host.helper.authenticate(prompt)
    }

    /// Finds or creates a folder.
    ///
    /// Protocols without a hierarchy always get a root folder named `name`.
    pub fn folder(
        &mut self,
        parent: Option<FolderId>,
        name: &str,
        delimiter: Option<char>,
    ) -> Option<FolderId> {
        let (parent, delimiter) = if self.hierarchical {
            (parent, delimiter)
        } else {
            (None, None)
        };
        self.host
            .mailbox
            .folder_get_or_create(self.host.helper, parent, name, delimiter)
    }

    /// Finds or creates a message.
    pub fn message(&mut self, folder: FolderId, server_id: u32) -> Option<MessageId> {
        self.host
            .mailbox
            .message_get_or_create(self.host.helper, folder, server_id)
    }

    /// Merges STATUS counters into a folder.
    pub fn set_status(&mut self, folder: FolderId, status: &FolderStatus) {
        self.host.mailbox.set_status(self.host.helper, folder, status);
    }

    /// Sets a message flag.
    pub fn set_flag(&mut self, message: MessageId, flag: MessageFlag) {
        self.host.mailbox.set_flag(self.host.helper, message, flag);
    }

    /// Removes a message the server no longer has.
    pub fn remove_message(&mut self, message: MessageId) {
        self.host.mailbox.remove_message(self.host.helper, message);
    }

    /// Forgets the recorded headers of a message.
    pub fn reset_headers(&mut self, message: MessageId) {
        self.host.mailbox.reset_headers(message);
    }

    /// Records a header line.
    pub fn add_header(&mut self, message: MessageId, line: &str) {
        self.host.mailbox.add_header(self.host.helper, message, line);
    }

    /// Replaces or extends a message body.
    pub fn set_body(&mut self, message: MessageId, data: &[u8], mode: BodyMode) {
        self.host
            .mailbox
            .set_body(self.host.helper, message, data, mode);
    }
}

/// Sans-I/O connection state for one protocol.
pub struct Session<P: Protocol> {
    protocol: P,
    queue: CommandQueue<P::Context>,
    input: LineBuffer,
    idle_delay: Duration,
    idle_since: Option<Instant>,
    authenticated: bool,
    parked: Vec<(P::Context, String)>,
}

impl<P: Protocol> Session<P> {
    /// Creates a session that waits for the server greeting.
    #[must_use]
    pub fn new(idle_delay: Duration) -> Self {
        let mut queue = CommandQueue::new();
        queue.push(Command::awaiting(P::greeting()));
        Self {
            protocol: P::new(),
            queue,
            input: LineBuffer::new(),
            idle_delay,
            idle_since: None,
            authenticated: false,
            parked: Vec::new(),
        }
    }

    /// Protocol state.
    #[must_use]
    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Queued commands, head first.
    #[must_use]
    pub fn queue(&self) -> &CommandQueue<P::Context> {
        &self.queue
    }

    /// Lets the protocol prepare the model for the new connection.
    ///
    /// # Errors
    ///
    /// Returns the protocol's error; the connection must then be dropped.
    pub fn start(&mut self, host: &mut Host<'_>) -> Result<()> {
        let mut exchange = Exchange::new(host, P::HIERARCHICAL);
        let result = self.protocol.connected(&mut exchange);
        let (follow_ups, authenticated) = exchange.finish();
        result?;
        self.absorb(follow_ups, authenticated);
        Ok(())
    }

    /// Returns true once the server accepted the login.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Appends a command to the queue and cancels the keepalive timer.
    pub fn enqueue(&mut self, context: P::Context, text: &str) {
        let (tag, data) = self.protocol.frame(text);
        if P::is_sensitive(&context) {
            tracing::debug!(protocol = P::NAME, ?tag, "queued command (redacted)");
        } else {
            tracing::debug!(protocol = P::NAME, ?tag, command = text, "queued command");
        }
        self.idle_since = None;
        self.queue.push(Command::new(tag, data, context));
    }

    /// Queues the command refreshing a folder or one of its messages.
    ///
    /// Before the login completes the command is held back and queued right
    /// after the commands the login produces.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder or message is unknown.
    pub fn refresh(
        &mut self,
        mailbox: &Mailbox,
        folder: FolderId,
        message: Option<MessageId>,
    ) -> Result<()> {
        let Some((context, text)) = self.protocol.refresh(mailbox, folder, message)? else {
            return Ok(());
        };
        if self.authenticated {
            self.enqueue(context, &text);
        } else {
            tracing::debug!(protocol = P::NAME, %folder, "refresh held until login");
            self.parked.push((context, text));
        }
        Ok(())
    }

    /// Bytes of the head command that still have to be written.
    #[must_use]
    pub fn poll_transmit(&self) -> Option<&[u8]> {
        self.queue
            .head()
            .filter(|c| c.status() == CommandStatus::Queued)
            .map(Command::remaining)
    }

    /// Records that `n` bytes of [`Self::poll_transmit`] were written.
    ///
    /// Lines that arrived before the head was fully written are processed
    /// once it is.
    ///
    /// # Errors
    ///
    /// Returns a fatal protocol error raised by a buffered line.
    pub fn advance(&mut self, n: usize, host: &mut Host<'_>) -> Result<()> {
        if let Some(head) = self.queue.head_mut() {
            if head.status() == CommandStatus::Queued {
                head.advance(n);
                if head.status() == CommandStatus::Sent {
                    tracing::trace!(protocol = P::NAME, tag = ?head.tag(), "command sent");
                }
            }
        }
        self.process(host)
    }

    /// Feeds received bytes.
    ///
    /// # Errors
    ///
    /// Returns a fatal protocol error. The head command is marked
    /// [`CommandStatus::Error`] and the connection must be dropped.
    pub fn handle_input(&mut self, data: &[u8], host: &mut Host<'_>) -> Result<()> {
        self.input.extend(data);
        self.process(host)
    }

    /// Returns when the keepalive is due, if the timer is armed.
    #[must_use]
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.idle_since.map(|since| since + self.idle_delay)
    }

    /// Queues the keepalive if its deadline has passed.
    pub fn handle_timeout(&mut self, now: Instant) {
        let Some(deadline) = self.poll_timeout() else {
            return;
        };
        if now < deadline {
            return;
        }
        self.idle_since = None;
        if self.queue.is_empty() {
            let (context, text) = P::keepalive();
            self.enqueue(context, &text);
        }
    }

    /// Drops queued commands and buffered input.
    pub fn teardown(&mut self) {
        let dropped = self.queue.clear() + self.parked.len();
        self.parked.clear();
        self.authenticated = false;
        self.input.clear();
        self.idle_since = None;
        tracing::debug!(protocol = P::NAME, dropped, "session torn down");
    }

    fn process(&mut self, host: &mut Host<'_>) -> Result<()> {
        loop {
            let Some(head) = self.queue.head_mut() else {
                match self.input.next_line()? {
                    Some(line) => {
                        tracing::debug!(
                            protocol = P::NAME,
                            line = %String::from_utf8_lossy(&line),
                            "discarding line with no command queued"
                        );
                        continue;
                    }
                    None => return Ok(()),
                }
            };
            if !head.status().is_in_flight() {
                return Ok(());
            }
            let Some(line) = self.input.next_line()? else {
                return Ok(());
            };
            tracing::trace!(protocol = P::NAME, line = %String::from_utf8_lossy(&line), "S:");

            let mut exchange = Exchange::new(host, P::HIERARCHICAL);
            let result = self.protocol.receive(head, &line, &mut exchange);
            let (follow_ups, authenticated) = exchange.finish();
            if let Err(e) = result {
                head.set_status(CommandStatus::Error);
                if e.is_fatal() {
                    tracing::warn!(protocol = P::NAME, error = %e, "fatal protocol error");
                    return Err(e);
                }
                tracing::warn!(protocol = P::NAME, tag = ?head.tag(), error = %e, "command failed");
                host.helper.error(&e.to_string());
            }
            self.absorb(follow_ups, authenticated);
            self.retire(host);
        }
    }

    fn absorb(&mut self, follow_ups: Vec<(P::Context, String)>, authenticated: bool) {
        for (context, text) in follow_ups {
            self.enqueue(context, &text);
        }
        if authenticated && !self.authenticated {
            self.authenticated = true;
            for (context, text) in std::mem::take(&mut self.parked) {
                self.enqueue(context, &text);
            }
        }
    }

    fn retire(&mut self, host: &mut Host<'_>) {
        let done = self
            .queue
            .head()
            .is_some_and(|c| c.status().is_done() && c.is_drained());
        if !done {
            return;
        }
        if let Some(command) = self.queue.pop() {
            tracing::debug!(
                protocol = P::NAME,
                tag = ?command.tag(),
                status = ?command.status(),
                context = ?command.context(),
                "command complete"
            );
        }
        if self.queue.is_empty() {
            self.idle_since = Some(Instant::now());
            host.events
                .status(host.helper, AccountStatus::Idle, None);
        }
    }
}

impl<P: Protocol> std::fmt::Debug for Session<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("protocol", &P::NAME)
            .field("queued", &self.queue.len())
            .field("buffered", &self.input.len())
            .field("idle_since", &self.idle_since)
            .field("authenticated", &self.authenticated)
            .field("parked", &self.parked.len())
            .finish()
    }
}
