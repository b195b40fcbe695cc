//! Cluster-wide mutual exclusion for the dispatch loop.
//!
//! At most one engine instance in a fleet may be actively advancing
//! subscriptions at a time. An instance that loses the acquisition race
//! performs a no-op cycle: it returns immediately, never blocks, never
//! retries within the same call. For single-process deployments the
//! in-memory implementation in `projectionist-memory` suffices; a
//! distributed deployment supplies an advisory-lock or lease-backed
//! implementation of the same trait.

use std::time::Duration;

use async_trait::async_trait;
use nutype::nutype;

use crate::errors::LockError;

/// Names the lock an engine instance contends on.
///
/// Engines sharing a subscription store must share a key; separate
/// deployments use separate keys.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct LockKey(String);

/// Cluster-wide mutual exclusion primitive.
#[async_trait]
pub trait DispatchLock: Send + Sync {
    /// Attempts to acquire the lock.
    ///
    /// Returns `Ok(true)` when this caller now holds the lock, `Ok(false)`
    /// when another holder has it. Holding expires after `ttl` so a
    /// crashed holder cannot wedge the fleet.
    async fn try_acquire(&self, key: &LockKey, ttl: Duration) -> Result<bool, LockError>;

    /// Releases the lock.
    ///
    /// Releasing a lock that is not held is a no-op.
    async fn release(&self, key: &LockKey) -> Result<(), LockError>;
}
