//! Core types for the `Projectionist` engine.
//!
//! This module defines the fundamental identifiers and positions used
//! throughout the library. All types use smart constructors to ensure
//! validity at construction time, following the "parse, don't validate"
//! principle.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Identifies a registered projector and its subscription row.
///
/// `ProjectorId` values are guaranteed to be non-empty and at most 255
/// characters. Once constructed, a `ProjectorId` is always valid.
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
pub struct ProjectorId(String);

/// A logical batch of projectors, used for ordering and administration.
///
/// Subscriptions are reported and iterated in (group, id) order, so the
/// group is the coarse administrative handle over related read models.
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
pub struct ProjectionGroup(String);

/// The type tag events are dispatched on.
///
/// Projector handler maps are keyed by `EventName`; upcasters rewrite it
/// when an event's stored shape predates its current one.
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
pub struct EventName(String);

/// Identifies the event stream of a single aggregate/entity.
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
pub struct StreamId(String);

/// A position in the total order of the event log.
///
/// Offset 0 means "nothing consumed"; the first appended message occupies
/// offset 1. Subscription positions are `GlobalOffset`s and only move
/// forward, except through an explicit reset.
#[nutype(
    validate(greater_or_equal = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct GlobalOffset(u64);

impl GlobalOffset {
    /// The origin position: no message has been examined yet.
    pub fn start() -> Self {
        Self::try_new(0).expect("0 is always a valid offset")
    }

    /// Returns the next offset after this one.
    #[must_use]
    pub fn next(self) -> Self {
        let current: u64 = self.into();
        Self::try_new(current + 1).expect("next offset should always be valid")
    }
}

/// An event's sequence number within its own stream.
///
/// Playheads start at 1 for the first event of a stream and increment by
/// one with each append.
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct Playhead(u64);

impl Playhead {
    /// The playhead of the first event in a stream.
    pub fn first() -> Self {
        Self::try_new(1).expect("1 is always a valid playhead")
    }

    /// Returns the next playhead after this one.
    #[must_use]
    pub fn next(self) -> Self {
        let current: u64 = self.into();
        Self::try_new(current + 1).expect("next playhead should always be valid")
    }
}

/// A point in time, as recorded on messages and subscription rows.
///
/// This wrapper ensures consistent timestamp handling throughout the
/// system and keeps the door open for custom serialization formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Converts the timestamp into the underlying `DateTime`.
    pub const fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.into_datetime()
    }
}

impl AsRef<DateTime<Utc>> for Timestamp {
    fn as_ref(&self) -> &DateTime<Utc> {
        self.as_datetime()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
