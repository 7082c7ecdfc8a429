//! Host callback interface.
//!
//! The engine never owns the user-visible folders and messages. Every
//! change to its mailbox model is mirrored into the host through an
//! [`AccountHelper`], and user interaction (errors, certificate prompts,
//! password prompts) goes through the same trait.
//!
//! # Example
//!
//! ```ignore
//! use mailer_account::{AccountHelper, FolderId, FolderKind};
//!
//! struct Tree {
//!     names: Vec<String>,
//! }
//!
//! impl AccountHelper for Tree {
//!     fn folder_new(
//!         &mut self,
//!         _folder: FolderId,
//!         _parent: Option<FolderId>,
//!         _kind: FolderKind,
//!         name: &str,
//!     ) -> bool {
//!         self.names.push(name.to_string());
//!         true
//!     }
//! }
//! ```

use crate::event::AccountEvent;
use crate::types::{FolderId, FolderKind, FolderStatus, MessageFlag, MessageId};

/// How a body chunk is applied to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Replace the current body.
    Replace,
    /// Append to the current body.
    Append,
}

/// Callbacks from the account engine into its host.
///
/// All methods have defaults so a host only implements what it cares about.
/// Creation callbacks return `false` to refuse the object; the engine then
/// skips it and everything that would have been attached to it.
pub trait AccountHelper: Send {
    /// Called when a folder is discovered.
    fn folder_new(
        &mut self,
        folder: FolderId,
        parent: Option<FolderId>,
        kind: FolderKind,
        name: &str,
    ) -> bool {
        let _ = (folder, parent, kind, name);
        true
    }

    /// Called when a folder is removed from the model.
    fn folder_delete(&mut self, folder: FolderId) {
        let _ = folder;
    }

    /// Called when STATUS counters of a folder change.
    fn folder_set_status(&mut self, folder: FolderId, status: &FolderStatus) {
        let _ = (folder, status);
    }

    /// Called when a message is discovered in a folder.
    fn message_new(&mut self, folder: FolderId, message: MessageId) -> bool {
        let _ = (folder, message);
        true
    }

    /// Called when a message is removed from the model.
    fn message_delete(&mut self, message: MessageId) {
        let _ = message;
    }

    /// Called when a flag is set on a message.
    fn message_set_flag(&mut self, message: MessageId, flag: MessageFlag) {
        let _ = (message, flag);
    }

    /// Called for each header line of a message, without the line ending.
    fn message_set_header(&mut self, message: MessageId, header: &str) {
        let _ = (message, header);
    }

    /// Called with body data of a message.
    fn message_set_body(&mut self, message: MessageId, data: &[u8], mode: BodyMode) {
        let _ = (message, data, mode);
    }

    /// Called for lifecycle and status events.
    fn event(&mut self, event: &AccountEvent) {
        let _ = event;
    }

    /// Reports an error to the user.
    ///
    /// Returns true if the host considers the error recoverable. The engine
    /// decides on its own whether to carry on: refused connections always
    /// move to the next candidate address and only fatal errors end a
    /// session.
    fn error(&mut self, text: &str) -> bool {
        let _ = text;
        true
    }

    /// Asks the user a yes/no question. Unanswered questions mean no.
    fn confirm(&mut self, text: &str) -> bool {
        let _ = text;
        false
    }

    /// Asks the user for a password when none is configured.
    fn authenticate(&mut self, prompt: &str) -> Option<String> {
        let _ = prompt;
        None
    }

    /// Trust anchors for TLS sessions.
    ///
    /// `None` selects the bundled web PKI roots.
    fn tls_roots(&mut self) -> Option<rustls::RootCertStore> {
        None
    }
}

impl<T: AccountHelper + ?Sized> AccountHelper for Box<T> {
    fn folder_new(
        &mut self,
        folder: FolderId,
        parent: Option<FolderId>,
        kind: FolderKind,
        name: &str,
    ) -> bool {
        (**self).folder_new(folder, parent, kind, name)
    }

    fn folder_delete(&mut self, folder: FolderId) {
        (**self).folder_delete(folder);
    }

    fn folder_set_status(&mut self, folder: FolderId, status: &FolderStatus) {
        (**self).folder_set_status(folder, status);
    }

    fn message_new(&mut self, folder: FolderId, message: MessageId) -> bool {
        (**self).message_new(folder, message)
    }

    fn message_delete(&mut self, message: MessageId) {
        (**self).message_delete(message);
    }

    fn message_set_flag(&mut self, message: MessageId, flag: MessageFlag) {
        (**self).message_set_flag(message, flag);
    }

    fn message_set_header(&mut self, message: MessageId, header: &str) {
        (**self).message_set_header(message, header);
    }

    fn message_set_body(&mut self, message: MessageId, data: &[u8], mode: BodyMode) {
        (**self).message_set_body(message, data, mode);
    }

    fn event(&mut self, event: &AccountEvent) {
        (**self).event(event);
    }

    fn error(&mut self, text: &str) -> bool {
        (**self).error(text)
    }

    fn confirm(&mut self, text: &str) -> bool {
        (**self).confirm(text)
    }

    fn authenticate(&mut self, prompt: &str) -> Option<String> {
        (**self).authenticate(prompt)
    }

    fn tls_roots(&mut self) -> Option<rustls::RootCertStore> {
        (**self).tls_roots()
    }
}

/// A helper that accepts everything and shows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHelper;

impl AccountHelper for NoopHelper {}

/// A helper that logs every callback using tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHelper;

impl AccountHelper for LoggingHelper {
    fn folder_new(
        &mut self,
        folder: FolderId,
        parent: Option<FolderId>,
        kind: FolderKind,
        name: &str,
    ) -> bool {
        tracing::info!(%folder, ?parent, %kind, name, "folder");
        true
    }

    fn folder_delete(&mut self, folder: FolderId) {
        tracing::debug!(%folder, "folder removed");
    }

    fn folder_set_status(&mut self, folder: FolderId, status: &FolderStatus) {
        tracing::info!(
            %folder,
            messages = status.messages,
            recent = status.recent,
            unseen = status.unseen,
            "folder status"
        );
    }

    fn message_new(&mut self, folder: FolderId, message: MessageId) -> bool {
        tracing::debug!(%folder, %message, "message");
        true
    }

    fn message_delete(&mut self, message: MessageId) {
        tracing::trace!(%message, "message removed");
    }

    fn message_set_flag(&mut self, message: MessageId, flag: MessageFlag) {
        tracing::trace!(%message, %flag, "flag");
    }

    fn message_set_header(&mut self, message: MessageId, header: &str) {
        tracing::trace!(%message, header, "header");
    }

    fn message_set_body(&mut self, message: MessageId, data: &[u8], mode: BodyMode) {
        tracing::trace!(%message, len = data.len(), ?mode, "body");
    }

    fn event(&mut self, event: &AccountEvent) {
        tracing::debug!(?event, "event");
    }

    fn error(&mut self, text: &str) -> bool {
        tracing::error!(text, "account error");
        true
    }
}

/// A helper that records every callback.
///
/// Useful for testing. Prompts are answered from the public fields.
#[derive(Debug, Default, Clone)]
pub struct CollectingHelper {
    /// Collected callbacks, in order.
    pub events: Vec<HelperEvent>,
    /// Answer given to [`AccountHelper::confirm`].
    pub confirm: bool,
    /// Answer given to [`AccountHelper::authenticate`].
    pub password: Option<String>,
    /// Whether [`AccountHelper::error`] reports the error as recoverable.
    pub recoverable: bool,
}

impl CollectingHelper {
    /// Creates a new collecting helper that refuses prompts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            recoverable: true,
            ..Self::default()
        }
    }

    /// Clears all collected events.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Takes all collected events, leaving the helper empty.
    pub fn take(&mut self) -> Vec<HelperEvent> {
        std::mem::take(&mut self.events)
    }

    /// Returns the error texts reported so far.
    #[must_use]
    pub fn errors(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                HelperEvent::Error(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Returns the account events reported so far.
    #[must_use]
    pub fn account_events(&self) -> Vec<&AccountEvent> {
        self.events
            .iter()
            .filter_map(|event| match event {
                HelperEvent::Event(event) => Some(event),
                _ => None,
            })
            .collect()
    }
}

impl AccountHelper for CollectingHelper {
    fn folder_new(
        &mut self,
        folder: FolderId,
        parent: Option<FolderId>,
        kind: FolderKind,
        name: &str,
    ) -> bool {
        self.events.push(HelperEvent::FolderNew {
            folder,
            parent,
            kind,
            name: name.to_string(),
        });
        true
    }

    fn folder_delete(&mut self, folder: FolderId) {
        self.events.push(HelperEvent::FolderDelete(folder));
    }

    fn folder_set_status(&mut self, folder: FolderId, status: &FolderStatus) {
        self.events.push(HelperEvent::FolderStatus(folder, *status));
    }

    fn message_new(&mut self, folder: FolderId, message: MessageId) -> bool {
        self.events.push(HelperEvent::MessageNew(folder, message));
        true
    }

    fn message_delete(&mut self, message: MessageId) {
        self.events.push(HelperEvent::MessageDelete(message));
    }

    fn message_set_flag(&mut self, message: MessageId, flag: MessageFlag) {
        self.events.push(HelperEvent::Flag(message, flag));
    }

    fn message_set_header(&mut self, message: MessageId, header: &str) {
        self.events
            .push(HelperEvent::Header(message, header.to_string()));
    }

    fn message_set_body(&mut self, message: MessageId, data: &[u8], mode: BodyMode) {
        self.events
            .push(HelperEvent::Body(message, data.to_vec(), mode));
    }

    fn event(&mut self, event: &AccountEvent) {
        self.events.push(HelperEvent::Event(event.clone()));
    }

    fn error(&mut self, text: &str) -> bool {
        self.events.push(HelperEvent::Error(text.to_string()));
        self.recoverable
    }

    fn confirm(&mut self, text: &str) -> bool {
        self.events.push(HelperEvent::Confirm(text.to_string()));
        self.confirm
    }

    fn authenticate(&mut self, prompt: &str) -> Option<String> {
        self.events
            .push(HelperEvent::Authenticate(prompt.to_string()));
        self.password.clone()
    }
}

/// A callback recorded by [`CollectingHelper`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperEvent {
    /// `folder_new`.
    FolderNew {
        /// Folder handle.
        folder: FolderId,
        /// Parent handle.
        parent: Option<FolderId>,
        /// Folder role.
        kind: FolderKind,
        /// Display name.
        name: String,
    },
    /// `folder_delete`.
    FolderDelete(FolderId),
    /// `folder_set_status`.
    FolderStatus(FolderId, FolderStatus),
    /// `message_new`.
    MessageNew(FolderId, MessageId),
    /// `message_delete`.
    MessageDelete(MessageId),
    /// `message_set_flag`.
    Flag(MessageId, MessageFlag),
    /// `message_set_header`.
    Header(MessageId, String),
    /// `message_set_body`.
    Body(MessageId, Vec<u8>, BodyMode),
    /// `event`.
    Event(AccountEvent),
    /// `error`.
    Error(String),
    /// `confirm`.
    Confirm(String),
    /// `authenticate`.
    Authenticate(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::event::AccountStatus;

    #[test]
    fn test_noop_helper_defaults() {
        let mut helper = NoopHelper;
        assert!(helper.folder_new(FolderId(0), None, FolderKind::Inbox, "Inbox"));
        assert!(helper.message_new(FolderId(0), MessageId(0)));
        assert!(helper.error("boom"));
        assert!(!helper.confirm("Connect anyway?"));
        assert!(helper.authenticate("Password").is_none());
        assert!(helper.tls_roots().is_none());
    }

    #[test]
    fn test_collecting_helper() {
        let mut helper = CollectingHelper::new();
        helper.password = Some("secret".to_string());

        helper.event(&AccountEvent::Started);
        assert!(helper.error("first"));
        helper.event(&AccountEvent::status(AccountStatus::Connected, None));
        assert_eq!(helper.authenticate("Password"), Some("secret".to_string()));

        assert_eq!(helper.errors(), vec!["first"]);
        assert_eq!(helper.account_events().len(), 2);

        let taken = helper.take();
        assert_eq!(taken.len(), 4);
        assert!(helper.events.is_empty());
    }

    #[test]
    fn test_boxed_helper_forwards() {
        let mut boxed: Box<dyn AccountHelper> = Box::new(CollectingHelper::new());
        assert!(!boxed.confirm("Connect anyway?"));
        boxed.message_set_header(MessageId(3), "Subject: hi");
    }
}
