//! Core types.
//!
//! Identifiers, flags and the folder/message model shared by both
//! protocols and mirrored into the host.

#![allow(clippy::missing_const_for_fn)]

mod flags;
mod identifiers;
mod mailbox;

pub use flags::{Flags, FolderKind, MessageFlag};
pub use identifiers::{FolderId, MessageId, Tag};
pub use mailbox::{Folder, FolderStatus, Mailbox, Message};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_imap_flag_mapping() {
        assert_eq!(MessageFlag::from_imap("\\Answered"), Some(MessageFlag::Answered));
        assert_eq!(MessageFlag::from_imap("\\DRAFT"), Some(MessageFlag::Draft));
        assert_eq!(MessageFlag::from_imap("\\Flagged"), Some(MessageFlag::Urgent));
        assert_eq!(MessageFlag::from_imap("\\Deleted"), Some(MessageFlag::Deleted));
        assert_eq!(MessageFlag::from_imap("\\Seen"), None);
        assert_eq!(MessageFlag::from_imap("\\Recent"), None);
        assert_eq!(MessageFlag::from_imap("$Junk"), None);
    }

    #[test]
    fn test_flags_collection() {
        let mut flags = Flags::new();
        assert!(flags.is_empty());

        assert!(flags.insert(MessageFlag::Draft));
        assert!(!flags.insert(MessageFlag::Draft));
        assert!(flags.insert(MessageFlag::Answered));
        assert!(flags.contains(MessageFlag::Answered));
        assert!(!flags.contains(MessageFlag::Urgent));

        let set: Vec<_> = flags.iter().collect();
        assert_eq!(set, vec![MessageFlag::Answered, MessageFlag::Draft]);
    }

    #[test]
    fn test_folder_kind_from_name() {
        assert_eq!(
            FolderKind::from_name("INBOX"),
            Some((FolderKind::Inbox, "Inbox"))
        );
        assert_eq!(
            FolderKind::from_name("drafts"),
            Some((FolderKind::Drafts, "Drafts"))
        );
        assert_eq!(FolderKind::from_name("Sent"), Some((FolderKind::Sent, "Sent")));
        assert_eq!(FolderKind::from_name("Sent Items"), None);
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(Tag::new("a0001").to_string(), "a0001");
        assert_eq!(FolderId(3).to_string(), "folder#3");
        assert_eq!(MessageId(9).get(), 9);
    }
}
