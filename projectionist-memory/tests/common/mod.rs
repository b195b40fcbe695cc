//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use projectionist::{
    EventName, HandlerError, Message, ProjectionGroup, Projectionist, ProjectionistBuilder,
    ProjectorDescriptor, ProjectorId, StreamId,
};
use projectionist_memory::{InMemoryDispatchLock, InMemoryEventLog, InMemorySubscriptionStore};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// The in-memory collaborator trio shared by an engine (or several
/// engines, for lock-contention tests).
pub struct Harness {
    pub log: InMemoryEventLog,
    pub store: InMemorySubscriptionStore,
    pub lock: InMemoryDispatchLock,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            log: InMemoryEventLog::new(),
            store: InMemorySubscriptionStore::new(),
            lock: InMemoryDispatchLock::new(),
        }
    }

    /// Starts an engine builder over this harness's collaborators.
    pub fn engine(&self) -> ProjectionistBuilder {
        Projectionist::builder(
            Arc::new(self.log.clone()),
            Arc::new(self.store.clone()),
            Arc::new(self.lock.clone()),
        )
    }
}

pub fn event_name(s: &str) -> EventName {
    EventName::try_new(s).expect("valid event name")
}

pub fn projector_id(s: &str) -> ProjectorId {
    ProjectorId::try_new(s).expect("valid projector id")
}

pub fn group(s: &str) -> ProjectionGroup {
    ProjectionGroup::try_new(s).expect("valid group")
}

pub fn stream(s: &str) -> StreamId {
    StreamId::try_new(s).expect("valid stream id")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCreated {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameChanged {
    pub id: u64,
    pub name: String,
}

pub fn profile_created(id: u64, name: &str) -> Message {
    Message::new(
        event_name("ProfileCreated"),
        json!({"id": id, "name": name}),
    )
}

pub fn name_changed(id: u64, name: &str) -> Message {
    Message::new(event_name("NameChanged"), json!({"id": id, "name": name}))
}

/// A tiny read model: profile id to display name, upsert-by-id (and
/// therefore idempotent under replay).
#[derive(Clone, Default)]
pub struct ProfileRows {
    rows: Arc<RwLock<HashMap<u64, String>>>,
}

impl ProfileRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, id: u64, name: String) {
        self.rows
            .write()
            .expect("RwLock poisoned")
            .insert(id, name);
    }

    pub fn get(&self, id: u64) -> Option<String> {
        self.rows.read().expect("RwLock poisoned").get(&id).cloned()
    }

    pub fn snapshot(&self) -> HashMap<u64, String> {
        self.rows.read().expect("RwLock poisoned").clone()
    }

    pub fn clear(&self) {
        self.rows.write().expect("RwLock poisoned").clear();
    }
}

/// The Profile projector: `ProfileCreated` and `NameChanged` upsert into
/// [`ProfileRows`]. When `fail_name_changed` is set, the `NameChanged`
/// handler fails instead, simulating a broken deployment.
pub fn profiles_projector(
    rows: ProfileRows,
    fail_name_changed: Arc<AtomicBool>,
) -> ProjectorDescriptor {
    let created_rows = rows.clone();
    let changed_rows = rows;

    ProjectorDescriptor::builder(projector_id("profiles"), group("default"))
        .on_event(
            event_name("ProfileCreated"),
            move |event: ProfileCreated, _message| {
                let rows = created_rows.clone();
                async move {
                    rows.upsert(event.id, event.name);
                    Ok(())
                }
            },
        )
        .on_event(
            event_name("NameChanged"),
            move |event: NameChanged, _message| {
                let rows = changed_rows.clone();
                let fail = Arc::clone(&fail_name_changed);
                async move {
                    if fail.load(Ordering::SeqCst) {
                        return Err(HandlerError::Storage(
                            "simulated read model outage".to_string(),
                        ));
                    }
                    rows.upsert(event.id, event.name);
                    Ok(())
                }
            },
        )
        .build()
}

/// A projector counting every message it is interested in.
pub fn counting_projector(
    id: &str,
    events: &[&str],
    counter: Arc<std::sync::atomic::AtomicU64>,
) -> ProjectorDescriptor {
    let mut builder = ProjectorDescriptor::builder(projector_id(id), group("default"));
    for event in events {
        let counter = Arc::clone(&counter);
        builder = builder.on(event_name(event), move |_message| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    }
    builder.build()
}

/// Polls `condition` until it holds or five seconds pass.
pub async fn eventually<F>(condition: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached within timeout");
}
