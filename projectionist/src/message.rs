//! The immutable message envelope and its header set.
//!
//! A [`Message`] wraps an event payload with the headers the engine and its
//! collaborators rely on: the owning stream, the event's playhead within
//! that stream, when it was recorded, whether it starts a new logical
//! stream segment, trace metadata, and arbitrary custom headers.
//!
//! Messages are never mutated in place. The `with_*` combinators return
//! derived copies, and writers compose them through a [`DecoratorChain`]:
//! an explicit, ordered pipeline of pure `Message -> Message` transforms
//! built once at construction time.

use std::collections::BTreeMap;

use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::HeaderError;
use crate::types::{EventName, Playhead, StreamId, Timestamp};

/// Links messages that belong to the same logical workflow or session.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Creates a new correlation ID with the current timestamp.
    pub fn new() -> Self {
        // This will always succeed as Uuid::now_v7() always returns a valid v7 UUID
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

/// Links a message to the specific message that caused it.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CausationId(Uuid);

impl CausationId {
    /// Creates a new causation ID with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

/// The closed header set carried by every message.
///
/// Required headers are attached by the writer-side decorator chain and the
/// event log; readers fetch them through the failing accessors on
/// [`Message`]. Custom headers live in an ordered map keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Headers {
    /// The stream (aggregate) this message belongs to.
    pub aggregate_id: Option<StreamId>,
    /// The message's sequence number within its stream.
    pub playhead: Option<Playhead>,
    /// When the message was recorded.
    pub recorded_at: Option<Timestamp>,
    /// Whether this message starts a new logical stream segment for the
    /// same aggregate (split stream).
    #[serde(default)]
    pub new_stream_start: bool,
    /// Links messages in the same logical workflow.
    pub correlation_id: Option<CorrelationId>,
    /// Links this message to the message that caused it.
    pub causation_id: Option<CausationId>,
    /// Additional custom headers.
    #[serde(default)]
    pub custom: BTreeMap<String, serde_json::Value>,
}

/// An immutable event envelope: name, JSON payload, headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    name: EventName,
    payload: serde_json::Value,
    headers: Headers,
}

impl Message {
    /// Creates a message with the given event name and payload and no
    /// headers attached yet.
    pub fn new(name: EventName, payload: serde_json::Value) -> Self {
        Self {
            name,
            payload,
            headers: Headers::default(),
        }
    }

    /// The event type tag this message is dispatched on.
    pub const fn name(&self) -> &EventName {
        &self.name
    }

    /// The event payload.
    pub const fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// All headers.
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The stream this message belongs to.
    pub fn aggregate_id(&self) -> Result<&StreamId, HeaderError> {
        self.headers
            .aggregate_id
            .as_ref()
            .ok_or(HeaderError::NotFound("aggregate_id"))
    }

    /// The message's playhead within its stream.
    pub fn playhead(&self) -> Result<Playhead, HeaderError> {
        self.headers
            .playhead
            .ok_or(HeaderError::NotFound("playhead"))
    }

    /// When the message was recorded.
    pub fn recorded_at(&self) -> Result<Timestamp, HeaderError> {
        self.headers
            .recorded_at
            .ok_or(HeaderError::NotFound("recorded_at"))
    }

    /// Whether this message starts a new logical stream segment.
    pub const fn new_stream_start(&self) -> bool {
        self.headers.new_stream_start
    }

    /// The correlation ID, if attached.
    pub const fn correlation_id(&self) -> Option<CorrelationId> {
        self.headers.correlation_id
    }

    /// The causation ID, if attached.
    pub const fn causation_id(&self) -> Option<CausationId> {
        self.headers.causation_id
    }

    /// A custom header by name.
    pub fn custom_header(&self, key: &str) -> Result<&serde_json::Value, HeaderError> {
        self.headers
            .custom
            .get(key)
            .ok_or(HeaderError::NotFound("custom"))
    }

    /// Returns a copy with the aggregate id attached.
    #[must_use]
    pub fn with_aggregate_id(mut self, aggregate_id: StreamId) -> Self {
        self.headers.aggregate_id = Some(aggregate_id);
        self
    }

    /// Returns a copy with the playhead attached.
    #[must_use]
    pub fn with_playhead(mut self, playhead: Playhead) -> Self {
        self.headers.playhead = Some(playhead);
        self
    }

    /// Returns a copy with the recorded-at timestamp attached.
    #[must_use]
    pub fn with_recorded_at(mut self, recorded_at: Timestamp) -> Self {
        self.headers.recorded_at = Some(recorded_at);
        self
    }

    /// Returns a copy flagged as the start of a new stream segment.
    #[must_use]
    pub fn with_new_stream_start(mut self) -> Self {
        self.headers.new_stream_start = true;
        self
    }

    /// Returns a copy with the correlation ID attached.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.headers.correlation_id = Some(correlation_id);
        self
    }

    /// Returns a copy with the causation ID attached.
    #[must_use]
    pub fn with_causation_id(mut self, causation_id: CausationId) -> Self {
        self.headers.causation_id = Some(causation_id);
        self
    }

    /// Returns a copy with a custom header attached.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.headers.custom.insert(key.into(), value);
        self
    }

    /// Returns a copy with the event name and payload replaced.
    ///
    /// Used by upcasters: headers are preserved while the stored shape is
    /// rewritten forward.
    #[must_use]
    pub fn with_event(mut self, name: EventName, payload: serde_json::Value) -> Self {
        self.name = name;
        self.payload = payload;
        self
    }
}

/// A pure `Message -> Message` transform used on the write side to attach
/// headers before append.
pub trait MessageDecorator: Send + Sync {
    /// Returns a derived copy of the message.
    fn decorate(&self, message: Message) -> Message;
}

impl<F> MessageDecorator for F
where
    F: Fn(Message) -> Message + Send + Sync,
{
    fn decorate(&self, message: Message) -> Message {
        self(message)
    }
}

/// An explicit, ordered pipeline of decorators composed at construction
/// time and applied left to right.
#[derive(Default)]
pub struct DecoratorChain {
    decorators: Vec<Box<dyn MessageDecorator>>,
}

impl DecoratorChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a decorator to the end of the pipeline.
    #[must_use]
    pub fn with(mut self, decorator: impl MessageDecorator + 'static) -> Self {
        self.decorators.push(Box::new(decorator));
        self
    }

    /// Runs the message through every decorator in registration order.
    pub fn decorate(&self, message: Message) -> Message {
        self.decorators
            .iter()
            .fold(message, |message, decorator| decorator.decorate(message))
    }
}

impl std::fmt::Debug for DecoratorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoratorChain")
            .field("len", &self.decorators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn message() -> Message {
        Message::new(
            EventName::try_new("ProfileCreated").unwrap(),
            json!({"id": 1, "name": "Alice"}),
        )
    }

    #[test]
    fn required_header_accessors_fail_when_absent() {
        let message = message();
        assert_eq!(
            message.aggregate_id(),
            Err(HeaderError::NotFound("aggregate_id"))
        );
        assert_eq!(message.playhead(), Err(HeaderError::NotFound("playhead")));
        assert_eq!(
            message.recorded_at(),
            Err(HeaderError::NotFound("recorded_at"))
        );
        assert!(!message.new_stream_start());
    }

    #[test]
    fn with_combinators_return_derived_copies() {
        let original = message();
        let stream = StreamId::try_new("profile-1").unwrap();
        let recorded = Timestamp::new(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());

        let decorated = original
            .clone()
            .with_aggregate_id(stream.clone())
            .with_playhead(Playhead::first())
            .with_recorded_at(recorded)
            .with_new_stream_start();

        // The original is untouched
        assert!(original.aggregate_id().is_err());
        assert!(!original.new_stream_start());

        assert_eq!(decorated.aggregate_id().unwrap(), &stream);
        assert_eq!(decorated.playhead().unwrap(), Playhead::first());
        assert_eq!(decorated.recorded_at().unwrap(), recorded);
        assert!(decorated.new_stream_start());
    }

    #[test]
    fn custom_headers_are_looked_up_by_name() {
        let decorated = message().with_header("tenant", json!("acme"));
        assert_eq!(decorated.custom_header("tenant").unwrap(), &json!("acme"));
        assert_eq!(
            decorated.custom_header("missing"),
            Err(HeaderError::NotFound("custom"))
        );
    }

    #[test]
    fn decorator_chain_applies_in_registration_order() {
        let chain = DecoratorChain::new()
            .with(|message: Message| message.with_header("order", json!("first")))
            .with(|message: Message| message.with_header("order", json!("second")));

        let decorated = chain.decorate(message());
        // Later decorators see (and may overwrite) earlier output
        assert_eq!(decorated.custom_header("order").unwrap(), &json!("second"));
    }

    #[test]
    fn with_event_preserves_headers() {
        let stream = StreamId::try_new("profile-1").unwrap();
        let upcast = message().with_aggregate_id(stream.clone()).with_event(
            EventName::try_new("ProfileCreatedV2").unwrap(),
            json!({"id": 1, "display_name": "Alice"}),
        );

        assert_eq!(upcast.name().as_str(), "ProfileCreatedV2");
        assert_eq!(upcast.aggregate_id().unwrap(), &stream);
    }

    #[test]
    fn message_roundtrip_serialization() {
        let decorated = message()
            .with_aggregate_id(StreamId::try_new("profile-1").unwrap())
            .with_playhead(Playhead::first())
            .with_correlation_id(CorrelationId::new())
            .with_header("tenant", json!("acme"));

        let json = serde_json::to_string(&decorated).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(decorated, deserialized);
    }
}
