//! Command lifecycle.

/// Where a queued command stands.
///
/// ```text
/// Queued ──all bytes written──→ Sent ──completion seen──→ Parsing ──→ Ok | Error
/// ```
///
/// Only the head of the queue ever leaves `Queued`, so at most one command
/// is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandStatus {
    /// Waiting to be written.
    #[default]
    Queued,
    /// Fully written, waiting for the response.
    Sent,
    /// The response is being interpreted.
    Parsing,
    /// Completed successfully.
    Ok,
    /// Completed with a failure.
    Error,
}

impl CommandStatus {
    /// Returns true while the server owes a response.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Sent | Self::Parsing)
    }

    /// Returns true once the command completed either way.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Ok | Self::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(!CommandStatus::Queued.is_in_flight());
        assert!(CommandStatus::Sent.is_in_flight());
        assert!(CommandStatus::Parsing.is_in_flight());
        assert!(CommandStatus::Ok.is_done());
        assert!(CommandStatus::Error.is_done());
        assert!(!CommandStatus::Parsing.is_done());
    }
}
