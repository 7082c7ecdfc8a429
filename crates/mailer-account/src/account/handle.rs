//! Requests from the host to a running account.

use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::types::{FolderId, MessageId};
use crate::{Error, Result};

/// A request to a running account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Synchronize a folder, or download one of its messages.
    Refresh {
        /// Folder to refresh.
        folder: FolderId,
        /// Message to download, the folder summary if `None`.
        message: Option<MessageId>,
    },
    /// Close the connection.
    Stop,
}

/// Cloneable sender of [`Request`]s.
///
/// Sending never blocks, so a handle may be used from inside helper
/// callbacks.
#[derive(Debug, Clone)]
pub struct AccountHandle {
    tx: mpsc::UnboundedSender<Request>,
}

impl AccountHandle {
    /// Asks the account to refresh a folder or download a message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the request queue was dropped.
    pub fn refresh(&self, folder: FolderId, message: Option<MessageId>) -> Result<()> {
        self.tx
            .send(Request::Refresh { folder, message })
            .map_err(|_| Error::InvalidState("account is gone".to_string()))
    }

    /// Asks the account to disconnect.
    pub fn stop(&self) {
        if self.tx.send(Request::Stop).is_err() {
            tracing::debug!("stop requested for an account that is gone");
        }
    }
}

/// Receiving side of an [`AccountHandle`].
#[derive(Debug)]
pub struct Requests {
    rx: mpsc::UnboundedReceiver<Request>,
    deferred: VecDeque<Request>,
    closed: bool,
}

impl Requests {
    /// Waits for the next request.
    ///
    /// Once every handle is dropped this never completes; the account then
    /// runs until the server goes away.
    pub async fn next(&mut self) -> Request {
        if let Some(request) = self.deferred.pop_front() {
            return request;
        }
        if !self.closed {
            if let Some(request) = self.rx.recv().await {
                return request;
            }
            self.closed = true;
        }
        std::future::pending().await
    }

    /// Waits for a stop request, keeping other requests for later.
    pub async fn stopped(&mut self) {
        while !self.closed {
            match self.rx.recv().await {
                Some(Request::Stop) => return,
                Some(request) => self.deferred.push_back(request),
                None => self.closed = true,
            }
        }
        std::future::pending().await
    }

    /// Drops deferred requests; they refer to a connection that is gone.
    pub fn reset(&mut self) {
        self.deferred.clear();
    }
}

/// Creates a connected handle/request pair.
#[must_use]
pub fn requests() -> (AccountHandle, Requests) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        AccountHandle { tx },
        Requests {
            rx,
            deferred: VecDeque::new(),
            closed: false,
        },
    )
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

    #[tokio::test]
    async fn test_requests_in_order() {
        let (handle, mut requests) = requests();
        handle.refresh(FolderId(1), None).unwrap();
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

    #[tokio::test]
    async fn test_stopped_defers_refreshes() {
        let (handle, mut requests) = requests();
        handle.refresh(FolderId(2), Some(MessageId(5))).unwrap();
        handle.stop();
        requests.stopped().await;
        assert_eq!(
            requests.next().await,
            Request::Refresh {
                folder: FolderId(2),
                message: Some(MessageId(5))
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_never_completes() {
        let (handle, mut requests) = requests();
        drop(handle);
        let waited =
            tokio::time::timeout(std::time::Duration::from_secs(60), requests.next()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_refresh_after_drop() {
        let (handle, requests) = requests();
        drop(requests);
        assert!(matches!(
            handle.refresh(FolderId(0), None),
            Err(Error::InvalidState(_))
        ));
        handle.stop();
    }
}
