//! In-memory driver for protocol tests.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use super::{Host, Protocol, Session};
use crate::Result;
use crate::config::{Config, ConfigValue};
use crate::event::EventReporter;
use crate::helper::CollectingHelper;
use crate::types::Mailbox;

/// A session wired to an in-memory account.
pub struct Harness<P: Protocol> {
    pub config: Config,
    pub mailbox: Mailbox,
    pub helper: CollectingHelper,
    pub events: EventReporter,
    pub session: Session<P>,
}

impl<P: Protocol> Harness<P> {
    /// Creates a started session with `joe`/`secret` credentials.
    pub fn new() -> Self {
        let mut config = P::default_config();
        config
            .set("username", ConfigValue::String("joe".into()))
            .unwrap();
        config
            .set("password", ConfigValue::String("secret".into()))
            .unwrap();
        config
            .set("hostname", ConfigValue::String("mail.example.com".into()))
            .unwrap();
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Self {
        let mut harness = Self {
            config,
            mailbox: Mailbox::new(),
            helper: CollectingHelper::new(),
            events: EventReporter::new(),
            session: Session::new(Duration::from_secs(30)),
        };
        let Self {
            config,
            mailbox,
            helper,
            events,
            session,
        } = &mut harness;
        let mut host = Host::new(config, mailbox, helper, events);
        session.start(&mut host).unwrap();
        harness
    }

    /// Feeds server bytes.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        let Self {
            config,
            mailbox,
            helper,
            events,
            session,
        } = self;
        let mut host = Host::new(config, mailbox, helper, events);
        session.handle_input(data, &mut host)
    }

    /// Writes everything the session wants to send, one command at a time.
    pub fn flush(&mut self) -> Result<Vec<String>> {
        let Self {
            config,
            mailbox,
            helper,
            events,
            session,
        } = self;
        let mut host = Host::new(config, mailbox, helper, events);
        let mut sent = Vec::new();
        while let Some(data) = session.poll_transmit() {
            let data = data.to_vec();
            session.advance(data.len(), &mut host)?;
            sent.push(String::from_utf8(data).unwrap());
        }
        Ok(sent)
    }

    /// Feeds server bytes and writes what the session answers.
    pub fn exchange(&mut self, data: &[u8]) -> Result<Vec<String>> {
        self.feed(data)?;
        self.flush()
    }

    /// Queues a refresh request.
    pub fn refresh(
        &mut self,
        folder: crate::types::FolderId,
        message: Option<crate::types::MessageId>,
    ) -> Result<()> {
        self.session.refresh(&self.mailbox, folder, message)
    }
}
