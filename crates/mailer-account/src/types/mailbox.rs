//! Mailbox model.
//!
//! The engine keeps its own tree of folders and messages and mirrors every
//! change one to one into the host through [`AccountHelper`]. Folders and
//! messages live in slabs and are addressed by [`FolderId`] and
//! [`MessageId`]; removed slots are never reused while the model lives, so a
//! stale handle resolves to `None` instead of to a different object.

use super::flags::{Flags, FolderKind, MessageFlag};
use super::identifiers::{FolderId, MessageId};
use crate::helper::{AccountHelper, BodyMode};

/// Counters reported by an IMAP `STATUS` response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderStatus {
    /// Number of messages (`MESSAGES`).
    pub messages: Option<u32>,
    /// Number of recent messages (`RECENT`).
    pub recent: Option<u32>,
    /// Number of unseen messages (`UNSEEN`).
    pub unseen: Option<u32>,
}

impl FolderStatus {
    /// Returns true if no counter is known.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.messages.is_none() && self.recent.is_none() && self.unseen.is_none()
    }

    /// Overlays the known counters of `other`, returning true on change.
    pub fn merge(&mut self, other: &Self) -> bool {
        let before = *self;
        self.messages = other.messages.or(self.messages);
        self.recent = other.recent.or(self.recent);
        self.unseen = other.unseen.or(self.unseen);
        before != *self
    }
}

/// A folder of the account.
#[derive(Debug, Clone)]
pub struct Folder {
    name: String,
    display_name: String,
    kind: FolderKind,
    parent: Option<FolderId>,
    children: Vec<FolderId>,
    messages: Vec<MessageId>,
    status: FolderStatus,
}

impl Folder {
    /// Full name of the folder on the server.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name shown to the user.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Role of the folder.
    #[must_use]
    pub const fn kind(&self) -> FolderKind {
        self.kind
    }

    /// Parent folder, `None` at the root.
    #[must_use]
    pub const fn parent(&self) -> Option<FolderId> {
        self.parent
    }

    /// Child folders in discovery order.
    #[must_use]
    pub fn children(&self) -> &[FolderId] {
        &self.children
    }

    /// Messages in discovery order.
    #[must_use]
    pub fn messages(&self) -> &[MessageId] {
        &self.messages
    }

    /// Last known STATUS counters.
    #[must_use]
    pub const fn status(&self) -> &FolderStatus {
        &self.status
    }
}

/// A message of the account.
#[derive(Debug, Clone)]
pub struct Message {
    folder: FolderId,
    server_id: u32,
    flags: Flags,
    headers: Vec<String>,
    body: Vec<u8>,
}

impl Message {
    /// Folder holding the message.
    #[must_use]
    pub const fn folder(&self) -> FolderId {
        self.folder
    }

    /// Server-side identifier: the IMAP sequence number or POP3 message number.
    #[must_use]
    pub const fn server_id(&self) -> u32 {
        self.server_id
    }

    /// Flags set on the message.
    #[must_use]
    pub const fn flags(&self) -> Flags {
        self.flags
    }

    /// Header lines received so far.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Body received so far.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Reassembles the raw message from headers and body.
    #[must_use]
    pub fn source(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + self.headers.len() * 64 + 2);
        for header in &self.headers {
            out.extend_from_slice(header.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// The folder and message tree of one account.
#[derive(Debug, Default)]
pub struct Mailbox {
    folders: Vec<Option<Folder>>,
    messages: Vec<Option<Message>>,
    roots: Vec<FolderId>,
}

impl Mailbox {
    /// Creates an empty mailbox.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            folders: Vec::new(),
            messages: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Returns true if the model holds no folder.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Top-level folders in discovery order.
    #[must_use]
    pub fn roots(&self) -> &[FolderId] {
        &self.roots
    }

    /// Looks up a folder.
    #[must_use]
    pub fn folder(&self, id: FolderId) -> Option<&Folder> {
        self.folders.get(id.0).and_then(Option::as_ref)
    }

    /// Looks up a message.
    #[must_use]
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.get(id.0).and_then(Option::as_ref)
    }

    /// Number of live folders.
    #[must_use]
    pub fn folder_count(&self) -> usize {
        self.folders.iter().flatten().count()
    }

    /// Number of live messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.iter().flatten().count()
    }

    /// Iterates over live folders.
    pub fn folders(&self) -> impl Iterator<Item = (FolderId, &Folder)> {
        self.folders
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.as_ref().map(|f| (FolderId(i), f)))
    }

    /// Finds a child folder of `parent` by its server name.
    #[must_use]
    pub fn find_folder(&self, parent: Option<FolderId>, name: &str) -> Option<FolderId> {
        let siblings = match parent {
            Some(parent) => self.folder(parent)?.children.as_slice(),
            None => self.roots.as_slice(),
        };
        siblings
            .iter()
            .copied()
            .find(|id| self.folder(*id).is_some_and(|f| f.name == name))
    }

    /// Finds a message of `folder` by its server identifier.
    #[must_use]
    pub fn find_message(&self, folder: FolderId, server_id: u32) -> Option<MessageId> {
        self.folder(folder)?
            .messages
            .iter()
            .copied()
            .find(|id| self.message(*id).is_some_and(|m| m.server_id == server_id))
    }

    /// Returns the folder named `name` under `parent`, creating it if needed.
    ///
    /// Top-level folders whose name matches a well-known folder get its
    /// kind and canonical name. With a hierarchy `delimiter` the display name
    /// is the last path component. Returns `None` if the host refuses the
    /// folder, in which case nothing is recorded.
    pub fn folder_get_or_create(
        &mut self,
        helper: &mut dyn AccountHelper,
        parent: Option<FolderId>,
        name: &str,
        delimiter: Option<char>,
    ) -> Option<FolderId> {
        if let Some(id) = self.find_folder(parent, name) {
            return Some(id);
        }
        if parent.is_some_and(|p| self.folder(p).is_none()) {
            return None;
        }

        let short = delimiter
            .and_then(|d| name.rsplit(d).next())
            .filter(|s| !s.is_empty())
            .unwrap_or(name);
        let (kind, display_name) = match (parent, FolderKind::from_name(short)) {
            (None, Some((kind, canonical))) => (kind, canonical.to_string()),
            _ => (FolderKind::Generic, short.to_string()),
        };

        let id = FolderId(self.folders.len());
        if !helper.folder_new(id, parent, kind, &display_name) {
            tracing::debug!(name, "folder refused by host");
            return None;
        }
        tracing::debug!(%id, name, display_name, %kind, "new folder");

        self.folders.push(Some(Folder {
            name: name.to_string(),
            display_name,
            kind,
            parent,
            children: Vec::new(),
            messages: Vec::new(),
            status: FolderStatus::default(),
        }));
        match parent.and_then(|p| self.folder_mut(p)) {
            Some(parent) => parent.children.push(id),
            None => self.roots.push(id),
        }
        Some(id)
    }

    /// Returns message `server_id` of `folder`, creating it if needed.
    ///
    /// Returns `None` if the folder is unknown or the host refuses the message.
    pub fn message_get_or_create(
        &mut self,
        helper: &mut dyn AccountHelper,
        folder: FolderId,
        server_id: u32,
    ) -> Option<MessageId> {
        if let Some(id) = self.find_message(folder, server_id) {
            return Some(id);
        }
        self.folder(folder)?;

        let id = MessageId(self.messages.len());
        if !helper.message_new(folder, id) {
            tracing::debug!(%folder, server_id, "message refused by host");
            return None;
        }
        self.messages.push(Some(Message {
            folder,
            server_id,
            flags: Flags::new(),
            headers: Vec::new(),
            body: Vec::new(),
        }));
        if let Some(folder) = self.folder_mut(folder) {
            folder.messages.push(id);
        }
        Some(id)
    }

    /// Merges STATUS counters into a folder and notifies the host on change.
    pub fn set_status(
        &mut self,
        helper: &mut dyn AccountHelper,
        folder: FolderId,
        status: &FolderStatus,
    ) {
        let Some(entry) = self.folder_mut(folder) else {
            return;
        };
        if entry.status.merge(status) {
            let merged = entry.status;
            helper.folder_set_status(folder, &merged);
        }
    }

    /// Sets a flag on a message.
    pub fn set_flag(
        &mut self,
        helper: &mut dyn AccountHelper,
        message: MessageId,
        flag: MessageFlag,
    ) {
        if let Some(entry) = self.message_mut(message) {
            entry.flags.insert(flag);
            helper.message_set_flag(message, flag);
        }
    }

    /// Drops the header lines recorded for a message before they are resent.
    pub fn reset_headers(&mut self, message: MessageId) {
        if let Some(entry) = self.message_mut(message) {
            entry.headers.clear();
        }
    }

    /// Records one header line of a message.
    pub fn add_header(&mut self, helper: &mut dyn AccountHelper, message: MessageId, line: &str) {
        if let Some(entry) = self.message_mut(message) {
            entry.headers.push(line.to_string());
            helper.message_set_header(message, line);
        }
    }

    /// Replaces or extends the body of a message.
    pub fn set_body(
        &mut self,
        helper: &mut dyn AccountHelper,
        message: MessageId,
        data: &[u8],
        mode: BodyMode,
    ) {
        if let Some(entry) = self.message_mut(message) {
            if mode == BodyMode::Replace {
                entry.body.clear();
            }
            entry.body.extend_from_slice(data);
            helper.message_set_body(message, data, mode);
        }
    }

    /// Removes a message.
    pub fn remove_message(&mut self, helper: &mut dyn AccountHelper, message: MessageId) {
        let Some(entry) = self.messages.get_mut(message.0).and_then(Option::take) else {
            return;
        };
        if let Some(folder) = self.folder_mut(entry.folder) {
            folder.messages.retain(|m| *m != message);
        }
        helper.message_delete(message);
    }

    /// Removes a folder with its messages and descendants.
    pub fn remove_folder(&mut self, helper: &mut dyn AccountHelper, folder: FolderId) {
        let Some(entry) = self.folders.get_mut(folder.0).and_then(Option::take) else {
            return;
        };
        for child in entry.children {
            self.remove_folder(helper, child);
        }
        for message in entry.messages {
            if self.messages.get_mut(message.0).and_then(Option::take).is_some() {
                helper.message_delete(message);
            }
        }
        match entry.parent {
            Some(parent) => {
                if let Some(parent) = self.folder_mut(parent) {
                    parent.children.retain(|c| *c != folder);
                }
            }
            None => self.roots.retain(|r| *r != folder),
        }
        helper.folder_delete(folder);
    }

    /// Removes every folder and message.
    pub fn clear(&mut self, helper: &mut dyn AccountHelper) {
        let roots = std::mem::take(&mut self.roots);
        let count = roots.len();
        for root in roots {
            self.remove_folder(helper, root);
        }
        tracing::debug!(count, "mailbox cleared");
    }

    fn folder_mut(&mut self, id: FolderId) -> Option<&mut Folder> {
        self.folders.get_mut(id.0).and_then(Option::as_mut)
    }

    fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.get_mut(id.0).and_then(Option::as_mut)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::helper::{CollectingHelper, HelperEvent};

    struct Refusing;

    impl AccountHelper for Refusing {
        fn folder_new(&mut self, _: FolderId, _: Option<FolderId>, _: FolderKind, _: &str) -> bool {
            false
        }
    }

    #[test]
    fn test_well_known_folders_at_root() {
        let mut helper = CollectingHelper::new();
        let mut mailbox = Mailbox::new();

        let inbox = mailbox
            .folder_get_or_create(&mut helper, None, "INBOX", Some('/'))
            .unwrap();
        let trash = mailbox
            .folder_get_or_create(&mut helper, None, "trash", Some('/'))
            .unwrap();

        assert_eq!(mailbox.folder(inbox).unwrap().kind(), FolderKind::Inbox);
        assert_eq!(mailbox.folder(inbox).unwrap().display_name(), "Inbox");
        assert_eq!(mailbox.folder(inbox).unwrap().name(), "INBOX");
        assert_eq!(mailbox.folder(trash).unwrap().display_name(), "Trash");
        assert_eq!(
            helper.events[0],
            HelperEvent::FolderNew {
                folder: inbox,
                parent: None,
                kind: FolderKind::Inbox,
                name: "Inbox".to_string(),
            }
        );
    }

    #[test]
    fn test_child_folders_use_last_component() {
        let mut helper = CollectingHelper::new();
        let mut mailbox = Mailbox::new();

        let archive = mailbox
            .folder_get_or_create(&mut helper, None, "Archive", Some('.'))
            .unwrap();
        let sent = mailbox
            .folder_get_or_create(&mut helper, Some(archive), "Archive.Sent", Some('.'))
            .unwrap();

        let folder = mailbox.folder(sent).unwrap();
        assert_eq!(folder.display_name(), "Sent");
        assert_eq!(folder.kind(), FolderKind::Generic);
        assert_eq!(folder.parent(), Some(archive));
        assert_eq!(mailbox.folder(archive).unwrap().children(), &[sent]);
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut helper = CollectingHelper::new();
        let mut mailbox = Mailbox::new();

        let first = mailbox.folder_get_or_create(&mut helper, None, "Work", None);
        let second = mailbox.folder_get_or_create(&mut helper, None, "Work", None);
        assert_eq!(first, second);
        assert_eq!(mailbox.folder_count(), 1);

        let folder = first.unwrap();
        let m1 = mailbox.message_get_or_create(&mut helper, folder, 7);
        let m2 = mailbox.message_get_or_create(&mut helper, folder, 7);
        assert_eq!(m1, m2);
        assert_eq!(mailbox.message_count(), 1);
        assert_eq!(helper.events.len(), 2);
    }

    #[test]
    fn test_refused_folder_is_not_recorded() {
        let mut mailbox = Mailbox::new();
        let id = mailbox.folder_get_or_create(&mut Refusing, None, "INBOX", None);
        assert!(id.is_none());
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_status_merge_reports_changes_only() {
        let mut helper = CollectingHelper::new();
        let mut mailbox = Mailbox::new();
        let inbox = mailbox
            .folder_get_or_create(&mut helper, None, "INBOX", None)
            .unwrap();
        helper.clear();

        let status = FolderStatus {
            messages: Some(3),
            recent: None,
            unseen: Some(1),
        };
        mailbox.set_status(&mut helper, inbox, &status);
        mailbox.set_status(&mut helper, inbox, &status);
        mailbox.set_status(&mut helper, inbox, &FolderStatus::default());

        assert_eq!(helper.events, vec![HelperEvent::FolderStatus(inbox, status)]);
        assert_eq!(mailbox.folder(inbox).unwrap().status(), &status);
    }

    #[test]
    fn test_message_source() {
        let mut helper = CollectingHelper::new();
        let mut mailbox = Mailbox::new();
        let inbox = mailbox
            .folder_get_or_create(&mut helper, None, "INBOX", None)
            .unwrap();
        let message = mailbox.message_get_or_create(&mut helper, inbox, 1).unwrap();

        mailbox.add_header(&mut helper, message, "Subject: hello");
        mailbox.set_body(&mut helper, message, b"ignored", BodyMode::Replace);
        mailbox.set_body(&mut helper, message, b"hi\r\n", BodyMode::Replace);
        mailbox.set_body(&mut helper, message, b"there\r\n", BodyMode::Append);
        mailbox.set_flag(&mut helper, message, MessageFlag::Answered);

        let entry = mailbox.message(message).unwrap();
        assert_eq!(entry.source(), b"Subject: hello\r\n\r\nhi\r\nthere\r\n".to_vec());
        assert!(entry.flags().contains(MessageFlag::Answered));
        assert_eq!(entry.server_id(), 1);
    }

    #[test]
    fn test_clear_mirrors_deletions() {
        let mut helper = CollectingHelper::new();
        let mut mailbox = Mailbox::new();
        let root = mailbox
            .folder_get_or_create(&mut helper, None, "Archive", Some('/'))
            .unwrap();
        let child = mailbox
            .folder_get_or_create(&mut helper, Some(root), "Archive/2023", Some('/'))
            .unwrap();
        let message = mailbox.message_get_or_create(&mut helper, child, 1).unwrap();
        helper.clear();

        mailbox.clear(&mut helper);

        assert!(mailbox.is_empty());
        assert!(mailbox.folder(root).is_none());
        assert_eq!(
            helper.events,
            vec![
                HelperEvent::MessageDelete(message),
                HelperEvent::FolderDelete(child),
                HelperEvent::FolderDelete(root),
            ]
        );
    }

    #[test]
    fn test_remove_message() {
        let mut helper = CollectingHelper::new();
        let mut mailbox = Mailbox::new();
        let inbox = mailbox
            .folder_get_or_create(&mut helper, None, "INBOX", None)
            .unwrap();
        let message = mailbox.message_get_or_create(&mut helper, inbox, 4).unwrap();

        mailbox.remove_message(&mut helper, message);
        assert!(mailbox.message(message).is_none());
        assert!(mailbox.folder(inbox).unwrap().messages().is_empty());
        assert!(mailbox.find_message(inbox, 4).is_none());
    }
}
