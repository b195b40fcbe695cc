//! Event log abstraction.
//!
//! The log is an external collaborator: a durable, append-only, globally
//! ordered sequence of messages. This module defines the contract the
//! engine needs from it: reading in total order from an offset, observing
//! the head, and (for writers) appending with optimistic concurrency.
//! Stream splitting is signaled via the new-stream-start message header
//! rather than a separate API.

use async_trait::async_trait;

use crate::errors::EventLogError;
use crate::message::Message;
use crate::types::{GlobalOffset, Playhead, StreamId};

/// A message paired with its position in the total log order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedMessage {
    /// The message's position in the total order.
    pub offset: GlobalOffset,
    /// The message itself.
    pub message: Message,
}

impl SequencedMessage {
    /// Creates a new sequenced message.
    pub const fn new(offset: GlobalOffset, message: Message) -> Self {
        Self { offset, message }
    }
}

/// Expected stream playhead for optimistic concurrency control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedPlayhead {
    /// The stream must not exist yet.
    New,
    /// The stream must currently end exactly at this playhead.
    Exact(Playhead),
    /// Any playhead is acceptable (no concurrency control).
    Any,
}

/// Contract for the durable, globally ordered event log.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// The offset of the most recently appended message, or
    /// [`GlobalOffset::start`] when the log is empty.
    async fn head(&self) -> Result<GlobalOffset, EventLogError>;

    /// Reads up to `limit` messages strictly after `after`, in global log
    /// order. Reading after [`GlobalOffset::start`] yields the log from
    /// its beginning.
    async fn read_from(
        &self,
        after: GlobalOffset,
        limit: usize,
    ) -> Result<Vec<SequencedMessage>, EventLogError>;

    /// Appends messages to a stream, enforcing the expected playhead.
    ///
    /// Returns the stream's new playhead. Fails with
    /// [`EventLogError::ConcurrencyConflict`] when `expected` does not
    /// match the stream's current playhead.
    async fn append(
        &self,
        stream: &StreamId,
        expected: ExpectedPlayhead,
        messages: Vec<Message>,
    ) -> Result<Playhead, EventLogError>;
}
