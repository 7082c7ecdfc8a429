//! Protocol-independent access to an account.
//!
//! Hosts pick the protocol from configuration at run time, so accounts are
//! handled as `Box<dyn AccountBackend>` created by [`AccountKind::create`].

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Account, Requests};
use crate::config::Config;
use crate::connection::Settings;
use crate::helper::AccountHelper;
use crate::imap::Imap4;
use crate::pop3::Pop3;
use crate::protocol::Protocol;
use crate::types::{FolderId, Mailbox, MessageId};
use crate::{Error, Result};

/// Future returned by [`AccountBackend::start`].
pub type RunFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// An account of any protocol.
///
/// Refresh and stop requests go through the [`super::AccountHandle`] paired
/// with the [`Requests`] given to [`AccountBackend::start`].
pub trait AccountBackend: Send {
    /// Protocol of the account.
    fn kind(&self) -> AccountKind;

    /// Account configuration.
    fn config(&self) -> &Config;

    /// Account configuration, for editing.
    fn config_mut(&mut self) -> &mut Config;

    /// Connection tunables.
    fn settings_mut(&mut self) -> &mut Settings;

    /// Folder and message model.
    fn mailbox(&self) -> &Mailbox;

    /// Connects and serves requests until stopped or disconnected.
    fn start<'a>(&'a mut self, requests: &'a mut Requests) -> RunFuture<'a>;

    /// Raw source of a message, as far as it was downloaded.
    fn source(&self, folder: FolderId, message: MessageId) -> Option<String>;

    /// Tears the model down.
    fn destroy(self: Box<Self>);
}

impl<P, H> AccountBackend for Account<P, H>
where
    P: Protocol + KnownProtocol,
    H: AccountHelper + 'static,
{
    fn kind(&self) -> AccountKind {
        P::KIND
    }

    fn config(&self) -> &Config {
        Self::config(self)
    }

    fn config_mut(&mut self) -> &mut Config {
        Self::config_mut(self)
    }

    fn settings_mut(&mut self) -> &mut Settings {
        Self::settings_mut(self)
    }

    fn mailbox(&self) -> &Mailbox {
        Self::mailbox(self)
    }

    fn start<'a>(&'a mut self, requests: &'a mut Requests) -> RunFuture<'a> {
        Box::pin(self.run(requests))
    }

    fn source(&self, folder: FolderId, message: MessageId) -> Option<String> {
        Self::source(self, folder, message)
    }

    fn destroy(self: Box<Self>) {
        let _helper = (*self).destroy();
    }
}

/// Maps a protocol to its [`AccountKind`].
pub trait KnownProtocol {
    /// Kind of the protocol.
    const KIND: AccountKind;
}

impl KnownProtocol for Imap4 {
    const KIND: AccountKind = AccountKind::Imap4;
}

impl KnownProtocol for Pop3 {
    const KIND: AccountKind = AccountKind::Pop3;
}

/// The built-in account types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    /// IMAP4 server.
    Imap4,
    /// POP3 server.
    Pop3,
}

impl AccountKind {
    /// All account types.
    pub const ALL: [Self; 2] = [Self::Imap4, Self::Pop3];

    /// Short identifier used in configuration files.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Imap4 => "imap4",
            Self::Pop3 => "pop3",
        }
    }

    /// Name shown to the user.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Imap4 => Imap4::TITLE,
            Self::Pop3 => Pop3::TITLE,
        }
    }

    /// Port used when none is configured.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Imap4 => Imap4::DEFAULT_PORT,
            Self::Pop3 => Pop3::DEFAULT_PORT,
        }
    }

    /// Returns true if folders of this kind of account can nest.
    #[must_use]
    pub const fn is_hierarchical(self) -> bool {
        match self {
            Self::Imap4 => Imap4::HIERARCHICAL,
            Self::Pop3 => Pop3::HIERARCHICAL,
        }
    }

    /// Configuration entries with their defaults.
    #[must_use]
    pub fn default_config(self) -> Config {
        match self {
            Self::Imap4 => Imap4::default_config(),
            Self::Pop3 => Pop3::default_config(),
        }
    }

    /// Creates an account of this type.
    pub fn create<H: AccountHelper + 'static>(self, helper: H) -> Box<dyn AccountBackend> {
        tracing::debug!(kind = self.id(), "creating account");
        match self {
            Self::Imap4 => Box::new(Account::<Imap4, H>::new(helper)),
            Self::Pop3 => Box::new(Account::<Pop3, H>::new(helper)),
        }
    }
}

impl FromStr for AccountKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Config(format!("unknown account type: {s}")))
    }
}

impl std::fmt::Display for AccountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
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
    use crate::helper::NoopHelper;

    #[test]
    fn test_from_str() {
        assert_eq!("imap4".parse::<AccountKind>().unwrap(), AccountKind::Imap4);
        assert_eq!("POP3".parse::<AccountKind>().unwrap(), AccountKind::Pop3);
        assert!(matches!(
            "smtp".parse::<AccountKind>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_names_and_ports() {
        assert_eq!(AccountKind::Imap4.to_string(), "IMAP4 server");
        assert_eq!(AccountKind::Pop3.name(), "POP3 server");
        assert_eq!(AccountKind::Imap4.default_port(), 143);
        assert_eq!(AccountKind::Pop3.default_port(), 110);
        assert!(AccountKind::Imap4.is_hierarchical());
        assert!(!AccountKind::Pop3.is_hierarchical());
    }

    #[test]
    fn test_create_backend() {
        for kind in AccountKind::ALL {
            let mut backend = kind.create(NoopHelper);
            assert_eq!(backend.kind(), kind);
            assert_eq!(backend.config(), &kind.default_config());
            backend.config_mut().set_str("hostname", "localhost").unwrap();
            assert_eq!(backend.config().get_str("hostname"), Some("localhost"));
            assert!(backend.mailbox().is_empty());
            backend.settings_mut().read_chunk = 512;
            assert_eq!(backend.source(FolderId(0), MessageId(0)), None);
            backend.destroy();
        }
    }

    #[test]
    fn test_serde_id() {
        let kind: AccountKind = serde_json::from_str("\"pop3\"").unwrap();
        assert_eq!(kind, AccountKind::Pop3);
        assert_eq!(serde_json::to_string(&AccountKind::Imap4).unwrap(), "\"imap4\"");
    }
}
