//! Terminal host for an account.
//!
//! Logs every callback, answers prompts on the terminal and asks for the
//! Inbox to be synchronized as soon as it is discovered. Passwords are
//! looked up in the system keyring before the user is asked.

use std::io::{self, BufRead, Write};

use keyring::Entry;
use mailer_account::{
    AccountEvent, AccountHandle, AccountHelper, BodyMode, FolderId, FolderKind, FolderStatus,
    LoggingHelper, MessageFlag, MessageId,
};
use tracing::{debug, warn};

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "mailer";

/// Helper that talks to the user on the terminal.
#[derive(Debug)]
pub struct ConsoleHelper {
    log: LoggingHelper,
    handle: AccountHandle,
    keyring_user: String,
    remember_password: bool,
    inbox: Option<FolderId>,
}

impl ConsoleHelper {
    /// Creates a helper that sends refreshes through `handle`.
    pub fn new(handle: AccountHandle, keyring_user: String, remember_password: bool) -> Self {
        Self {
            log: LoggingHelper,
            handle,
            keyring_user,
            remember_password,
            inbox: None,
        }
    }

    fn stored_password(&self) -> Option<String> {
        let entry = match Entry::new(SERVICE_NAME, &self.keyring_user) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Keyring unavailable: {e}");
                return None;
            }
        };
        match entry.get_password() {
            Ok(password) => Some(password),
            Err(keyring::Error::NoEntry) => {
                debug!("No stored password for {}", self.keyring_user);
                None
            }
            Err(e) => {
                warn!("Failed to read password from keyring: {e}");
                None
            }
        }
    }

    fn store_password(&self, password: &str) {
        let stored = Entry::new(SERVICE_NAME, &self.keyring_user)
            .and_then(|entry| entry.set_password(password));
        match stored {
            Ok(()) => debug!("Stored password for {}", self.keyring_user),
            Err(e) => warn!("Failed to store password in keyring: {e}"),
        }
    }
}

/// Prints `prompt` and reads one line from the terminal.
fn ask(prompt: &str) -> Option<String> {
    let mut stderr = io::stderr().lock();
    write!(stderr, "{prompt}").ok()?;
    stderr.flush().ok()?;
    drop(stderr);

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

/// Returns true for an affirmative answer.
fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

impl AccountHelper for ConsoleHelper {
    fn folder_new(
        &mut self,
        folder: FolderId,
        parent: Option<FolderId>,
        kind: FolderKind,
        name: &str,
    ) -> bool {
        self.log.folder_new(folder, parent, kind, name);
        if kind == FolderKind::Inbox && self.inbox.is_none() {
            self.inbox = Some(folder);
            if let Err(e) = self.handle.refresh(folder, None) {
                warn!("Cannot refresh {name}: {e}");
            }
        }
        true
    }

    fn folder_delete(&mut self, folder: FolderId) {
        if self.inbox == Some(folder) {
            self.inbox = None;
        }
        self.log.folder_delete(folder);
    }

    fn folder_set_status(&mut self, folder: FolderId, status: &FolderStatus) {
        self.log.folder_set_status(folder, status);
    }

    fn message_new(&mut self, folder: FolderId, message: MessageId) -> bool {
        self.log.message_new(folder, message)
    }

    fn message_delete(&mut self, message: MessageId) {
        self.log.message_delete(message);
    }

    fn message_set_flag(&mut self, message: MessageId, flag: MessageFlag) {
        self.log.message_set_flag(message, flag);
    }

    fn message_set_header(&mut self, message: MessageId, header: &str) {
        self.log.message_set_header(message, header);
    }

    fn message_set_body(&mut self, message: MessageId, data: &[u8], mode: BodyMode) {
        self.log.message_set_body(message, data, mode);
    }

    fn event(&mut self, event: &AccountEvent) {
        self.log.event(event);
    }

    fn error(&mut self, text: &str) -> bool {
        self.log.error(text)
    }

    fn confirm(&mut self, text: &str) -> bool {
        ask(&format!("{text} [y/N] ")).is_some_and(|answer| is_yes(&answer))
    }

    fn authenticate(&mut self, prompt: &str) -> Option<String> {
        if let Some(password) = self.stored_password() {
            return Some(password);
        }
        let password = ask(&format!("{prompt}: "))?;
        if password.is_empty() {
            return None;
        }
        if self.remember_password {
            self.store_password(&password);
        }
        Some(password)
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
    use mailer_account::{Request, requests};

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES\n"));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
    }

    #[tokio::test]
    async fn test_inbox_is_refreshed_once() {
        let (handle, mut requests) = requests();
        let mut helper = ConsoleHelper::new(handle.clone(), "pop3:joe@host".to_string(), false);

        assert!(helper.folder_new(FolderId(0), None, FolderKind::Generic, "Archive"));
        assert!(helper.folder_new(FolderId(1), None, FolderKind::Inbox, "Inbox"));
        assert!(helper.folder_new(FolderId(2), None, FolderKind::Inbox, "INBOX"));
        handle.stop();

        assert_eq!(
            requests.next().await,
            Request::Refresh {
                folder: FolderId(1),
                message: None
            }
        );
        assert_eq!(requests.next().await, Request::Stop);
    }

    #[test]
    fn test_inbox_forgotten_on_delete() {
        let (handle, _requests) = requests();
        let mut helper = ConsoleHelper::new(handle, "imap4:joe@host".to_string(), false);
        helper.folder_new(FolderId(3), None, FolderKind::Inbox, "INBOX");
        helper.folder_delete(FolderId(3));
        assert_eq!(helper.inbox, None);
    }
}
