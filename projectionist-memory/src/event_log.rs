//! Thread-safe in-memory event log.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use projectionist::{
    Clock, EventLog, EventLogError, ExpectedPlayhead, GlobalOffset, Message, Playhead,
    SequencedMessage, StreamId, SystemClock,
};

/// In-memory [`EventLog`] with per-stream optimistic concurrency.
///
/// Messages are assigned global offsets in append order; playheads are
/// assigned per stream. The log stamps the aggregate-id and playhead
/// headers itself and fills in `recorded_at` from its clock when the
/// writer's decorator chain did not. Clones share storage.
#[derive(Clone)]
pub struct InMemoryEventLog {
    inner: Arc<RwLock<Inner>>,
    clock: Arc<dyn Clock>,
}

struct Inner {
    messages: Vec<SequencedMessage>,
    playheads: HashMap<StreamId, Playhead>,
}

impl InMemoryEventLog {
    /// Creates an empty log stamping `recorded_at` from the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Creates an empty log stamping `recorded_at` from the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                messages: Vec::new(),
                playheads: HashMap::new(),
            })),
            clock,
        }
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn head(&self) -> Result<GlobalOffset, EventLogError> {
        let inner = self.inner.read().expect("RwLock poisoned");
        Ok(inner
            .messages
            .last()
            .map_or_else(GlobalOffset::start, |sequenced| sequenced.offset))
    }

    async fn read_from(
        &self,
        after: GlobalOffset,
        limit: usize,
    ) -> Result<Vec<SequencedMessage>, EventLogError> {
        let inner = self.inner.read().expect("RwLock poisoned");
        Ok(inner
            .messages
            .iter()
            .filter(|sequenced| sequenced.offset > after)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn append(
        &self,
        stream: &StreamId,
        expected: ExpectedPlayhead,
        messages: Vec<Message>,
    ) -> Result<Playhead, EventLogError> {
        let mut inner = self.inner.write().expect("RwLock poisoned");

        let current = inner.playheads.get(stream).copied();
        match expected {
            ExpectedPlayhead::New => {
                if current.is_some() {
                    return Err(EventLogError::ConcurrencyConflict {
                        stream: stream.clone(),
                        expected: None,
                        current,
                    });
                }
            }
            ExpectedPlayhead::Exact(playhead) => {
                if current != Some(playhead) {
                    return Err(EventLogError::ConcurrencyConflict {
                        stream: stream.clone(),
                        expected: Some(playhead),
                        current,
                    });
                }
            }
            ExpectedPlayhead::Any => {}
        }

        let mut playhead = current;
        for message in messages {
            let next = playhead.map_or_else(Playhead::first, Playhead::next);
            let offset_value = u64::try_from(inner.messages.len()).expect("log fits in u64") + 1;
            let offset =
                GlobalOffset::try_new(offset_value).expect("offsets are always valid");

            let mut message = message
                .with_aggregate_id(stream.clone())
                .with_playhead(next);
            if message.headers().recorded_at.is_none() {
                message = message.with_recorded_at(self.clock.now());
            }

            inner.messages.push(SequencedMessage::new(offset, message));
            playhead = Some(next);
        }

        let Some(final_playhead) = playhead else {
            return Err(EventLogError::Storage(
                "cannot append zero messages to a new stream".to_string(),
            ));
        };
        inner.playheads.insert(stream.clone(), final_playhead);
        Ok(final_playhead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use projectionist::EventName;
    use serde_json::json;

    fn message(name: &str) -> Message {
        Message::new(EventName::try_new(name).unwrap(), json!({}))
    }

    fn stream(id: &str) -> StreamId {
        StreamId::try_new(id).unwrap()
    }

    #[tokio::test]
    async fn empty_log_has_start_head() {
        let log = InMemoryEventLog::new();
        assert_eq!(log.head().await.unwrap(), GlobalOffset::start());
        assert!(log
            .read_from(GlobalOffset::start(), 100)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn append_assigns_offsets_and_playheads() {
        let log = InMemoryEventLog::new();

        log.append(
            &stream("profile-1"),
            ExpectedPlayhead::New,
            vec![message("ProfileCreated"), message("NameChanged")],
        )
        .await
        .unwrap();
        log.append(
            &stream("profile-2"),
            ExpectedPlayhead::New,
            vec![message("ProfileCreated")],
        )
        .await
        .unwrap();

        let all = log.read_from(GlobalOffset::start(), 100).await.unwrap();
        assert_eq!(all.len(), 3);

        let offsets: Vec<u64> = all.iter().map(|s| s.offset.into_inner()).collect();
        assert_eq!(offsets, vec![1, 2, 3]);

        // Playheads are per stream
        assert_eq!(all[0].message.playhead().unwrap(), Playhead::first());
        assert_eq!(
            all[1].message.playhead().unwrap(),
            Playhead::first().next()
        );
        assert_eq!(all[2].message.playhead().unwrap(), Playhead::first());
        assert_eq!(
            all[2].message.aggregate_id().unwrap(),
            &stream("profile-2")
        );
    }

    #[tokio::test]
    async fn conflicting_appends_are_rejected() {
        let log = InMemoryEventLog::new();
        log.append(
            &stream("profile-1"),
            ExpectedPlayhead::New,
            vec![message("ProfileCreated")],
        )
        .await
        .unwrap();

        // Stream already exists
        let result = log
            .append(
                &stream("profile-1"),
                ExpectedPlayhead::New,
                vec![message("ProfileCreated")],
            )
            .await;
        assert!(matches!(
            result,
            Err(EventLogError::ConcurrencyConflict { .. })
        ));

        // Wrong playhead
        let result = log
            .append(
                &stream("profile-1"),
                ExpectedPlayhead::Exact(Playhead::first().next()),
                vec![message("NameChanged")],
            )
            .await;
        assert!(matches!(
            result,
            Err(EventLogError::ConcurrencyConflict { .. })
        ));

        // Correct playhead succeeds
        let playhead = log
            .append(
                &stream("profile-1"),
                ExpectedPlayhead::Exact(Playhead::first()),
                vec![message("NameChanged")],
            )
            .await
            .unwrap();
        assert_eq!(playhead, Playhead::first().next());
    }

    #[tokio::test]
    async fn read_from_is_exclusive_and_bounded() {
        let log = InMemoryEventLog::new();
        log.append(
            &stream("profile-1"),
            ExpectedPlayhead::New,
            vec![
                message("A"),
                message("B"),
                message("C"),
                message("D"),
            ],
        )
        .await
        .unwrap();

        let from_two = log
            .read_from(GlobalOffset::try_new(2).unwrap(), 100)
            .await
            .unwrap();
        let offsets: Vec<u64> = from_two.iter().map(|s| s.offset.into_inner()).collect();
        assert_eq!(offsets, vec![3, 4]);

        let limited = log.read_from(GlobalOffset::start(), 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let log1 = InMemoryEventLog::new();
        let log2 = log1.clone();

        log1.append(
            &stream("profile-1"),
            ExpectedPlayhead::New,
            vec![message("ProfileCreated")],
        )
        .await
        .unwrap();

        assert_eq!(
            log2.head().await.unwrap(),
            GlobalOffset::try_new(1).unwrap()
        );
    }
}
