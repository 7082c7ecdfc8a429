//! Account lifecycle and status events.
//!
//! Internal connection transitions are mapped onto a small closed set of
//! statuses before they reach the host. `Started` and `Stopped` bracket
//! every run of an account.

use crate::helper::AccountHelper;

/// Connection status reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountStatus {
    /// A connection attempt to one address is in progress.
    Connecting,
    /// The transport is connected.
    Connected,
    /// The server accepted the credentials.
    Authenticated,
    /// The command queue drained.
    Idle,
    /// The transport was closed.
    Disconnected,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Authenticated => "Authenticated",
            Self::Idle => "Idle",
            Self::Disconnected => "Disconnected",
        };
        f.write_str(name)
    }
}

/// Event delivered to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    /// The account began running.
    Started,
    /// The account stopped running.
    Stopped,
    /// The connection status changed.
    Status {
        /// New status.
        status: AccountStatus,
        /// Human readable detail, if any.
        message: Option<String>,
    },
}

impl AccountEvent {
    /// Creates a status event.
    #[must_use]
    pub const fn status(status: AccountStatus, message: Option<String>) -> Self {
        Self::Status { status, message }
    }
}

/// Emits events to the host and keeps `Started`/`Stopped` paired.
#[derive(Debug, Default)]
pub struct EventReporter {
    running: bool,
    last: Option<AccountStatus>,
}

impl EventReporter {
    /// Creates a reporter for an account that is not running.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            running: false,
            last: None,
        }
    }

    /// Returns true between `started` and `stopped`.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Returns the last status reported.
    #[must_use]
    pub const fn last_status(&self) -> Option<AccountStatus> {
        self.last
    }

    /// Reports that the account started.
    pub fn started(&mut self, helper: &mut dyn AccountHelper) {
        if self.running {
            return;
        }
        self.running = true;
        self.last = None;
        tracing::debug!("account started");
        helper.event(&AccountEvent::Started);
    }

    /// Reports that the account stopped. Does nothing if it was not running.
    pub fn stopped(&mut self, helper: &mut dyn AccountHelper) {
        if !self.running {
            return;
        }
        self.running = false;
        tracing::debug!("account stopped");
        helper.event(&AccountEvent::Stopped);
    }

    /// Reports a status change.
    pub fn status(
        &mut self,
        helper: &mut dyn AccountHelper,
        status: AccountStatus,
        message: Option<String>,
    ) {
        match &message {
            Some(text) => tracing::info!(%status, text, "status"),
            None => tracing::info!(%status, "status"),
        }
        self.last = Some(status);
        helper.event(&AccountEvent::status(status, message));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::helper::{CollectingHelper, HelperEvent};

    #[test]
    fn test_started_stopped_are_paired() {
        let mut helper = CollectingHelper::new();
        let mut reporter = EventReporter::new();

        reporter.stopped(&mut helper);
        reporter.started(&mut helper);
        reporter.started(&mut helper);
        reporter.status(&mut helper, AccountStatus::Idle, None);
        reporter.stopped(&mut helper);
        reporter.stopped(&mut helper);

        assert_eq!(
            helper.events,
            vec![
                HelperEvent::Event(AccountEvent::Started),
                HelperEvent::Event(AccountEvent::status(AccountStatus::Idle, None)),
                HelperEvent::Event(AccountEvent::Stopped),
            ]
        );
        assert!(!reporter.is_running());
        assert_eq!(reporter.last_status(), Some(AccountStatus::Idle));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(AccountStatus::Authenticated.to_string(), "Authenticated");
        assert_eq!(AccountStatus::Disconnected.to_string(), "Disconnected");
    }
}
