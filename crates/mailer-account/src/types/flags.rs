//! Message flags and folder kinds.

/// Message flags surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageFlag {
    /// Message has been answered.
    Answered,
    /// Message is flagged for special attention.
    Urgent,
    /// Message is a draft.
    Draft,
    /// Message is marked for deletion.
    Deleted,
}

impl MessageFlag {
    /// All flags, in bit order.
    pub const ALL: [Self; 4] = [
        Self::Answered,
        Self::Urgent,
        Self::Draft,
        Self::Deleted,
    ];

    /// Maps an IMAP system flag onto a host flag.
    ///
    /// `\Seen` and `\Recent` are recognized but carry nothing for the host,
    /// and keywords are ignored, so all of those return `None`.
    #[must_use]
    pub fn from_imap(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "\\ANSWERED" => Some(Self::Answered),
            "\\DRAFT" => Some(Self::Draft),
            "\\FLAGGED" => Some(Self::Urgent),
            "\\DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Answered => 1,
            Self::Urgent => 1 << 1,
            Self::Draft => 1 << 2,
            Self::Deleted => 1 << 3,
        }
    }
}

impl std::fmt::Display for MessageFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Answered => "answered",
            Self::Urgent => "urgent",
            Self::Draft => "draft",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// Set of message flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    bits: u8,
}

impl Flags {
    /// Creates an empty flag set.
    #[must_use]
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    /// Adds a flag, returning true if it was not already set.
    pub const fn insert(&mut self, flag: MessageFlag) -> bool {
        let fresh = self.bits & flag.bit() == 0;
        self.bits |= flag.bit();
        fresh
    }

    /// Returns true if the flag is set.
    #[must_use]
    pub const fn contains(self, flag: MessageFlag) -> bool {
        self.bits & flag.bit() != 0
    }

    /// Returns true if no flag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Iterates over the flags that are set.
    pub fn iter(self) -> impl Iterator<Item = MessageFlag> {
        MessageFlag::ALL
            .into_iter()
            .filter(move |flag| self.contains(*flag))
    }
}

/// Role of a folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FolderKind {
    /// The incoming mail folder.
    Inbox,
    /// Unfinished messages.
    Drafts,
    /// Messages sent by the user.
    Sent,
    /// Deleted messages.
    Trash,
    /// Any other folder.
    #[default]
    Generic,
}

impl FolderKind {
    /// Matches a folder name against the well-known folders.
    ///
    /// Matching ignores ASCII case. On a hit the kind is returned together
    /// with its canonical display name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<(Self, &'static str)> {
        [
            (Self::Inbox, "Inbox"),
            (Self::Drafts, "Drafts"),
            (Self::Trash, "Trash"),
            (Self::Sent, "Sent"),
        ]
        .into_iter()
        .find(|(_, canonical)| canonical.eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for FolderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Inbox => "inbox",
            Self::Drafts => "drafts",
            Self::Sent => "sent",
            Self::Trash => "trash",
            Self::Generic => "folder",
        };
        f.write_str(name)
    }
}
