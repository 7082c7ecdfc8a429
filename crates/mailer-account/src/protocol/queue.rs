//! Command queue.

use std::collections::VecDeque;

use bytes::Bytes;

use super::state::CommandStatus;
use crate::types::Tag;

/// A command with its wire bytes and protocol-specific context.
#[derive(Debug)]
pub struct Command<C> {
    tag: Option<Tag>,
    data: Bytes,
    written: usize,
    status: CommandStatus,
    context: C,
}

impl<C> Command<C> {
    /// Creates a command waiting to be written.
    pub fn new(tag: Option<Tag>, data: impl Into<Bytes>, context: C) -> Self {
        Self {
            tag,
            data: data.into(),
            written: 0,
            status: CommandStatus::Queued,
            context,
        }
    }

    /// Creates a command with nothing to write that already awaits a
    /// response, such as the server greeting.
    pub fn awaiting(context: C) -> Self {
        Self {
            tag: None,
            data: Bytes::new(),
            written: 0,
            status: CommandStatus::Sent,
            context,
        }
    }

    /// Tag of the command, if the protocol uses tags.
    #[must_use]
    pub const fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> CommandStatus {
        self.status
    }

    /// Updates the status.
    pub const fn set_status(&mut self, status: CommandStatus) {
        self.status = status;
    }

    /// Protocol context.
    #[must_use]
    pub const fn context(&self) -> &C {
        &self.context
    }

    /// Mutable protocol context.
    pub const fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// Bytes still to be written.
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.written..]
    }

    /// Returns true once every byte was written.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.written >= self.data.len()
    }

    /// Records `n` written bytes; the command becomes `Sent` once drained.
    pub fn advance(&mut self, n: usize) {
        self.written = (self.written + n).min(self.data.len());
        if self.is_drained() && self.status == CommandStatus::Queued {
            self.status = CommandStatus::Sent;
        }
    }
}

/// FIFO of commands. Only the head is ever written or answered.
#[derive(Debug)]
pub struct CommandQueue<C> {
    commands: VecDeque<Command<C>>,
}

impl<C> Default for CommandQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CommandQueue<C> {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            commands: VecDeque::new(),
        }
    }

    /// Appends a command, returning true if the queue was empty.
    pub fn push(&mut self, command: Command<C>) -> bool {
        let was_empty = self.commands.is_empty();
        self.commands.push_back(command);
        was_empty
    }

    /// The oldest command.
    #[must_use]
    pub fn head(&self) -> Option<&Command<C>> {
        self.commands.front()
    }

    /// The oldest command, mutably.
    pub fn head_mut(&mut self) -> Option<&mut Command<C>> {
        self.commands.front_mut()
    }

    /// Removes the oldest command.
    pub fn pop(&mut self) -> Option<Command<C>> {
        self.commands.pop_front()
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if no command is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of commands awaiting a response.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| c.status.is_in_flight())
            .count()
    }

    /// Iterates from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &Command<C>> {
        self.commands.iter()
    }

    /// Drops every command, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.commands.len();
        self.commands.clear();
        count
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_writes() {
        let mut command = Command::new(None, b"NOOP\r\n".to_vec(), ());
        assert_eq!(command.status(), CommandStatus::Queued);

        command.advance(2);
        assert_eq!(command.remaining(), b"OP\r\n");
        assert_eq!(command.status(), CommandStatus::Queued);

        command.advance(10);
        assert!(command.is_drained());
        assert_eq!(command.status(), CommandStatus::Sent);
    }

    #[test]
    fn test_awaiting_command() {
        let command = Command::awaiting("greeting");
        assert_eq!(command.status(), CommandStatus::Sent);
        assert!(command.is_drained());
        assert!(command.tag().is_none());
        assert_eq!(*command.context(), "greeting");
    }

    #[test]
    fn test_queue_order() {
        let mut queue = CommandQueue::new();
        assert!(queue.push(Command::awaiting(0)));
        assert!(!queue.push(Command::new(Some(Tag::new("a0001")), b"x".to_vec(), 1)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.in_flight(), 1);

        assert_eq!(*queue.pop().unwrap().context(), 0);
        assert_eq!(queue.head().unwrap().tag().unwrap().as_str(), "a0001");
        assert_eq!(queue.clear(), 1);
        assert!(queue.is_empty());
    }
}
