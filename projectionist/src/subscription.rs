//! Subscription rows and the durable store that holds them.
//!
//! A subscription is a projector's durable cursor into the global log:
//! identity, administrative group, lifecycle status, last examined offset,
//! and error bookkeeping. Rows are created when a registered projector is
//! first discovered, exclusively written by the lock-holding engine during
//! a run, and readable by administrative callers at any time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::SubscriptionStoreError;
use crate::types::{GlobalOffset, ProjectionGroup, ProjectorId, Timestamp};

/// Lifecycle status of a subscription.
///
/// `New` rows have never been dispatched to. `Booting` rows are draining
/// the backlog observed at boot start; `Active` rows have caught up and
/// tail live appends; both receive dispatch identically. `Error` rows had
/// a handler failure and receive nothing until an explicit reset.
/// `Finished` rows were explicitly marked complete. `Outdated` rows belong
/// to projectors that are no longer registered. Removal deletes the row
/// rather than storing a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    /// Discovered, never run.
    New,
    /// Draining the backlog observed at boot start.
    Booting,
    /// Caught up; tailing live appends.
    Active,
    /// A handler failed; dispatch is suspended until reset.
    Error,
    /// Explicitly marked complete; no further dispatch expected.
    Finished,
    /// The projector descriptor is no longer registered.
    Outdated,
}

impl SubscriptionStatus {
    /// Whether a subscription in this status receives dispatch.
    pub const fn is_eligible(self) -> bool {
        matches!(self, Self::New | Self::Booting | Self::Active)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::New => "new",
            Self::Booting => "booting",
            Self::Active => "active",
            Self::Error => "error",
            Self::Finished => "finished",
            Self::Outdated => "outdated",
        };
        f.write_str(label)
    }
}

/// Error bookkeeping recorded when a handler fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionErrorInfo {
    /// Rendering of the handler failure.
    pub message: String,
    /// When the failure occurred.
    pub occurred_at: Timestamp,
}

/// A projector's durable cursor and status within the global log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// The projector this row belongs to.
    pub id: ProjectorId,
    /// The projector's administrative group.
    pub group: ProjectionGroup,
    /// Lifecycle status.
    pub status: SubscriptionStatus,
    /// Last offset examined. Tracks "last offset examined", not "last
    /// offset where a handler fired": uninteresting messages advance it
    /// too, so catch-up never re-scans them.
    pub position: GlobalOffset,
    /// Error bookkeeping, present while status is `Error`.
    pub error: Option<SubscriptionErrorInfo>,
    /// When a message was last processed for this subscription.
    pub last_processed_at: Option<Timestamp>,
}

impl Subscription {
    /// Creates a fresh `New` row at position zero.
    pub fn new(id: ProjectorId, group: ProjectionGroup) -> Self {
        Self {
            id,
            group,
            status: SubscriptionStatus::New,
            position: GlobalOffset::start(),
            error: None,
            last_processed_at: None,
        }
    }

    /// Whether this subscription currently receives dispatch.
    pub const fn is_eligible(&self) -> bool {
        self.status.is_eligible()
    }
}

/// Durable table mapping projector identity to cursor state.
///
/// Mutating operations must be observable atomically: a reader never sees
/// a position advance without the corresponding status update, and vice
/// versa. During a run the lock-holding engine is the only writer;
/// concurrent reads are always permitted and reflect the latest committed
/// state.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Fetches one subscription row.
    async fn get(&self, id: &ProjectorId) -> Result<Subscription, SubscriptionStoreError>;

    /// All subscription rows, in stable (group, id) order.
    async fn all(&self) -> Result<Vec<Subscription>, SubscriptionStoreError>;

    /// Creates a `New` row at position zero if none exists. Idempotent:
    /// an existing row is returned unchanged.
    async fn create_if_missing(
        &self,
        id: &ProjectorId,
        group: &ProjectionGroup,
    ) -> Result<Subscription, SubscriptionStoreError>;

    /// Atomically advances the position, sets the status, and stamps
    /// `last_processed_at`.
    async fn update_position(
        &self,
        id: &ProjectorId,
        position: GlobalOffset,
        status: SubscriptionStatus,
        processed_at: Timestamp,
    ) -> Result<(), SubscriptionStoreError>;

    /// Records a handler failure and transitions the row to `Error`,
    /// leaving the position at the last success.
    async fn mark_error(
        &self,
        id: &ProjectorId,
        message: &str,
        occurred_at: Timestamp,
    ) -> Result<(), SubscriptionStoreError>;

    /// Sets the status without touching the position. Used for
    /// lifecycle-only transitions: `Booting`, `Outdated`, `Finished`.
    async fn set_status(
        &self,
        id: &ProjectorId,
        status: SubscriptionStatus,
    ) -> Result<(), SubscriptionStoreError>;

    /// Rewinds the row to `New` at position zero and clears the error.
    /// The next boot or run fully replays the log for this projector.
    async fn reset(&self, id: &ProjectorId) -> Result<(), SubscriptionStoreError>;

    /// Deletes the row.
    async fn remove(&self, id: &ProjectorId) -> Result<(), SubscriptionStoreError>;
}
