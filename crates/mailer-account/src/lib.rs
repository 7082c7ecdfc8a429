//! # mailer-account
//!
//! Mail retrieval engine for IMAP4 and POP3 accounts. An account connects to
//! its server, logs in, discovers folders and messages, and mirrors them into
//! the host application through the [`AccountHelper`] callbacks.
//!
//! ## Features
//!
//! - **Sans-I/O sessions**: every protocol is a state machine fed with bytes
//!   and polled for output; the async driver only moves bytes around
//! - **One command in flight**: commands are queued and answered strictly in
//!   order, with follow-up commands queued by response handlers
//! - **Keepalive**: a NOOP is queued after the session sat idle for a while
//! - **TLS via rustls**: certificate problems are put to the user, who may
//!   accept the certificate for the session
//! - **Offline model**: folders and messages stay known across reconnects
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailer_account::{AccountKind, LoggingHelper, requests};
//!
//! #[tokio::main]
//! async fn main() -> mailer_account::Result<()> {
//!     let mut account = AccountKind::Imap4.create(LoggingHelper);
//!     account.config_mut().set_str("hostname", "imap.example.com")?;
//!     account.config_mut().set_str("username", "joe")?;
//!     account.config_mut().set_str("password", "secret")?;
//!
//!     let (handle, mut requests) = requests();
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         handle.stop();
//!     });
//!     account.start(&mut requests).await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`account`]: the async driver and the protocol-independent backend
//! - [`config`]: typed per-account settings
//! - [`connection`]: name resolution, TCP and TLS
//! - [`imap`]: the IMAP4 session
//! - [`pop3`]: the POP3 session
//! - [`protocol`]: sans-I/O session core shared by both protocols
//! - [`types`]: folder and message model

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod config;
pub mod connection;
mod error;
pub mod event;
pub mod helper;
pub mod imap;
pub mod pop3;
pub mod protocol;
pub mod types;

pub use account::{
    Account, AccountBackend, AccountHandle, AccountKind, Request, Requests, requests,
};
pub use config::{Config, ConfigEntry, ConfigKind, ConfigValue};
pub use connection::{Settings, SettingsBuilder};
pub use error::{Error, Result};
pub use event::{AccountEvent, AccountStatus, EventReporter};
pub use helper::{AccountHelper, BodyMode, CollectingHelper, HelperEvent, LoggingHelper, NoopHelper};
pub use imap::Imap4;
pub use pop3::Pop3;
pub use protocol::{Exchange, Host, Protocol, Session};
pub use types::{
    Flags, Folder, FolderId, FolderKind, FolderStatus, Mailbox, Message, MessageFlag, MessageId,
    Tag,
};
