//! Core identifiers.
//!
//! Types for command tags and for the handles the engine shares with its host.

/// IMAP command tag.
///
/// Tags identify commands and their completion responses. Each command sent
/// by the client has a unique tag, and the server's tagged response carries
/// the same tag to correlate request and response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(pub String);

impl Tag {
    /// Creates a new tag from a string.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of a folder in the mailbox model.
///
/// The same handle is passed to the host when the folder is announced, so
/// the host can key its own folder objects on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FolderId(pub usize);

impl FolderId {
    /// Returns the underlying index.
    #[must_use]
    pub fn get(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for FolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "folder#{}", self.0)
    }
}

/// Handle of a message in the mailbox model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub(crate) usize);

impl MessageId {
    /// Returns the underlying index.
    #[must_use]
    pub fn get(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "message#{}", self.0)
    }
}
