//! Thread-safe in-memory subscription store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use projectionist::{
    GlobalOffset, ProjectionGroup, ProjectorId, Subscription, SubscriptionErrorInfo,
    SubscriptionStatus, SubscriptionStore, SubscriptionStoreError, Timestamp,
};

/// In-memory [`SubscriptionStore`].
///
/// Every mutation happens under a single write lock, so readers observe
/// position and status changes atomically. Clones share storage.
#[derive(Clone, Default)]
pub struct InMemorySubscriptionStore {
    rows: Arc<RwLock<HashMap<ProjectorId, Subscription>>>,
}

impl InMemorySubscriptionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_row<F>(
        &self,
        id: &ProjectorId,
        mutate: F,
    ) -> Result<(), SubscriptionStoreError>
    where
        F: FnOnce(&mut Subscription),
    {
        let mut rows = self.rows.write().expect("RwLock poisoned");
        let row = rows
            .get_mut(id)
            .ok_or_else(|| SubscriptionStoreError::NotFound(id.clone()))?;
        mutate(row);
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn get(&self, id: &ProjectorId) -> Result<Subscription, SubscriptionStoreError> {
        let rows = self.rows.read().expect("RwLock poisoned");
        rows.get(id)
            .cloned()
            .ok_or_else(|| SubscriptionStoreError::NotFound(id.clone()))
    }

    async fn all(&self) -> Result<Vec<Subscription>, SubscriptionStoreError> {
        let rows = self.rows.read().expect("RwLock poisoned");
        let mut all: Vec<Subscription> = rows.values().cloned().collect();
        all.sort_by(|a, b| (&a.group, &a.id).cmp(&(&b.group, &b.id)));
        Ok(all)
    }

    async fn create_if_missing(
        &self,
        id: &ProjectorId,
        group: &ProjectionGroup,
    ) -> Result<Subscription, SubscriptionStoreError> {
        let mut rows = self.rows.write().expect("RwLock poisoned");
        let row = rows
            .entry(id.clone())
            .or_insert_with(|| Subscription::new(id.clone(), group.clone()));
        Ok(row.clone())
    }

    async fn update_position(
        &self,
        id: &ProjectorId,
        position: GlobalOffset,
        status: SubscriptionStatus,
        processed_at: Timestamp,
    ) -> Result<(), SubscriptionStoreError> {
        self.with_row(id, |row| {
            row.position = position;
            row.status = status;
            row.last_processed_at = Some(processed_at);
        })
    }

    async fn mark_error(
        &self,
        id: &ProjectorId,
        message: &str,
        occurred_at: Timestamp,
    ) -> Result<(), SubscriptionStoreError> {
        self.with_row(id, |row| {
            row.status = SubscriptionStatus::Error;
            row.error = Some(SubscriptionErrorInfo {
                message: message.to_string(),
                occurred_at,
            });
        })
    }

    async fn set_status(
        &self,
        id: &ProjectorId,
        status: SubscriptionStatus,
    ) -> Result<(), SubscriptionStoreError> {
        self.with_row(id, |row| {
            row.status = status;
        })
    }

    async fn reset(&self, id: &ProjectorId) -> Result<(), SubscriptionStoreError> {
        self.with_row(id, |row| {
            row.position = GlobalOffset::start();
            row.status = SubscriptionStatus::New;
            row.error = None;
        })
    }

    async fn remove(&self, id: &ProjectorId) -> Result<(), SubscriptionStoreError> {
        let mut rows = self.rows.write().expect("RwLock poisoned");
        rows.remove(id)
            .map(|_| ())
            .ok_or_else(|| SubscriptionStoreError::NotFound(id.clone()))
    }
}
