//! In-memory dispatch lock with TTL expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use projectionist::{DispatchLock, LockError, LockKey};

/// In-memory [`DispatchLock`] for single-process deployments and tests.
///
/// Holding expires after the requested TTL, so a holder that never
/// releases (a crashed engine in a real deployment) does not wedge later
/// acquisitions. Clones share state: two engine instances contending on
/// clones of the same lock see each other.
#[derive(Clone, Default)]
pub struct InMemoryDispatchLock {
    holds: Arc<Mutex<HashMap<LockKey, Instant>>>,
}

impl InMemoryDispatchLock {
    /// Creates an unheld lock.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DispatchLock for InMemoryDispatchLock {
    async fn try_acquire(&self, key: &LockKey, ttl: Duration) -> Result<bool, LockError> {
        let mut holds = self.holds.lock().expect("Mutex poisoned");
        let now = Instant::now();

        if let Some(deadline) = holds.get(key) {
            if *deadline > now {
                return Ok(false);
            }
        }
        holds.insert(key.clone(), now + ttl);
        Ok(true)
    }

    async fn release(&self, key: &LockKey) -> Result<(), LockError> {
        let mut holds = self.holds.lock().expect("Mutex poisoned");
        holds.remove(key);
        Ok(())
    }
}
