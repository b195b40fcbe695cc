//! `Projectionist` is a catch-up projection engine for event-sourced systems.
//!
//! Given an append-only, globally ordered event log, the engine drives
//! registered projectors to consistent read-model states: it tracks each
//! projector's durable position, dispatches messages in log order,
//! isolates per-projector failures, and serializes engine instances
//! fleet-wide with a dispatch lock. Historical catch-up ([`Projectionist::boot`])
//! and live tailing ([`Projectionist::run`]) share the same loop;
//! administrative operations (reset, teardown, remove) make rebuilds safe.
//!
//! The log, the lock, the subscription table, and cipher-key storage are
//! trait contracts; `projectionist-memory` ships in-memory reference
//! implementations for testing and single-process use.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cipher;
pub mod clock;
pub mod engine;
pub mod errors;
pub mod event_log;
pub mod listener;
pub mod lock;
pub mod message;
pub mod projector;
pub mod subscription;
pub mod types;
pub mod upcaster;

pub use cipher::{CipherKey, CipherKeyStore, SubjectId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{
    CipherKeyError, EventLogError, HandlerError, HeaderError, LockError, ProjectionistError,
    ProjectionistResult, SubscriptionStoreError,
};
pub use event_log::{EventLog, ExpectedPlayhead, SequencedMessage};
pub use listener::{
    ErrorPolicy, ProjectorErrorListener, ProjectorErrorNotification, TracingErrorListener,
};
pub use engine::{
    Projectionist, ProjectionistBuilder, ProjectionistConfig, RunOutcome, RunSummary,
};
pub use lock::{DispatchLock, LockKey};
pub use message::{CausationId, CorrelationId, DecoratorChain, Headers, Message, MessageDecorator};
pub use projector::{ProjectorBuilder, ProjectorDescriptor};
pub use subscription::{
    Subscription, SubscriptionErrorInfo, SubscriptionStatus, SubscriptionStore,
};
pub use types::{
    EventName, GlobalOffset, Playhead, ProjectionGroup, ProjectorId, StreamId, Timestamp,
};
pub use upcaster::{Upcaster, UpcasterChain};
