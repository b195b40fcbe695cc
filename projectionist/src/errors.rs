//! Error types for the `Projectionist` engine.
//!
//! Each subsystem has its own error enum so that callers can tell a
//! write-side concurrency conflict from a projector handler failure from an
//! administrative misuse. The engine's failure-isolation rules are built on
//! this split:
//!
//! - `HandlerError` is caught per subscription, recorded into the
//!   subscription row, and surfaced via the error notification; it never
//!   escapes the run loop unless the error policy says so.
//! - `HeaderError` is a programming error and propagates immediately.
//! - Lock acquisition returning `false` is not represented here at all:
//!   losing the dispatch lock race is a skipped cycle, not a fault.

use crate::types::{EventName, GlobalOffset, Playhead, ProjectorId, StreamId};
use thiserror::Error;

/// Errors raised by the event log collaborator.
#[derive(Debug, Clone, Error)]
pub enum EventLogError {
    /// Optimistic concurrency control detected a conflicting append.
    ///
    /// This is a write-side concern; the projection engine never raises or
    /// retries it.
    #[error(
        "concurrency conflict on stream '{stream}': expected playhead {expected:?}, current is {current:?}"
    )]
    ConcurrencyConflict {
        /// The stream with the conflicting append.
        stream: StreamId,
        /// The playhead the writer expected.
        expected: Option<Playhead>,
        /// The stream's actual current playhead.
        current: Option<Playhead>,
    },

    /// The backing storage failed.
    #[error("event log storage failed: {0}")]
    Storage(String),
}

/// Errors raised while reading message headers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// A required header is absent from the message.
    ///
    /// Missing required headers are programming errors (a decorator was not
    /// applied, or the wrong message reached a consumer); they propagate
    /// immediately and are never retried.
    #[error("header '{0}' not found on message")]
    NotFound(&'static str),
}

/// A projector handler failure.
///
/// Caught per subscription: the failing subscription transitions to the
/// `Error` status and stops receiving dispatch; healthy subscriptions keep
/// advancing in the same run.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The event payload could not be decoded into the handler's type.
    #[error("failed to decode '{event}' payload: {message}")]
    Decode {
        /// The event the handler was invoked for.
        event: EventName,
        /// The underlying decode failure.
        message: String,
    },

    /// The projector's read-model storage failed.
    #[error("read model storage failed: {0}")]
    Storage(String),

    /// Any other handler failure.
    #[error("{0}")]
    Other(String),
}

/// Errors raised by the subscription store.
#[derive(Debug, Clone, Error)]
pub enum SubscriptionStoreError {
    /// No subscription row exists for the given projector.
    #[error("no subscription for projector '{0}'")]
    NotFound(ProjectorId),

    /// The backing storage failed.
    #[error("subscription storage failed: {0}")]
    Storage(String),
}

/// Errors raised by the dispatch lock.
///
/// Note that failing to *acquire* the lock is not an error: `try_acquire`
/// returns `Ok(false)` and the engine skips the cycle. `LockError` covers
/// infrastructure failures only.
#[derive(Debug, Clone, Error)]
pub enum LockError {
    /// The lock backend failed.
    #[error("lock backend failed: {0}")]
    Backend(String),
}

/// Errors raised by the cipher key store collaborator.
#[derive(Debug, Clone, Error)]
pub enum CipherKeyError {
    /// No key is stored for the subject, typically because it was removed
    /// by crypto-shredding. Propagates to the caller; never swallowed.
    #[error("no cipher key for subject '{0}'")]
    NotExists(String),

    /// The backing storage failed.
    #[error("cipher key storage failed: {0}")]
    Storage(String),
}

/// Errors surfaced by the engine's run loop and administrative operations.
#[derive(Debug, Error)]
pub enum ProjectionistError {
    /// The event log failed.
    #[error("event log error: {0}")]
    EventLog(#[from] EventLogError),

    /// The subscription store failed.
    #[error("subscription store error: {0}")]
    Store(#[from] SubscriptionStoreError),

    /// The dispatch lock backend failed.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// A handler failed and the error policy converted the notification
    /// into a fatal abort of the whole run.
    #[error("projector '{projector}' failed at offset {offset}, run aborted: {source}")]
    Aborted {
        /// The projector whose handler failed.
        projector: ProjectorId,
        /// The global offset of the message being processed.
        offset: GlobalOffset,
        /// The original handler failure.
        source: HandlerError,
    },

    /// A projector lifecycle hook (setup/teardown) failed during an
    /// administrative operation.
    #[error("projector '{projector}' lifecycle hook failed: {source}")]
    Lifecycle {
        /// The projector whose hook failed.
        projector: ProjectorId,
        /// The original hook failure.
        source: HandlerError,
    },

    /// An administrative operation referenced a projector that is not
    /// registered with this engine.
    #[error("no projector registered with id '{0}'")]
    UnknownProjector(ProjectorId),
}

/// Result type for engine operations.
pub type ProjectionistResult<T> = Result<T, ProjectionistError>;
