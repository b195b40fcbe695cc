//! Time sources for `recorded_at` stamping and subscription bookkeeping.
//!
//! The engine never reads the wall clock directly; everything that needs a
//! timestamp takes a [`Clock`]. Production code uses [`SystemClock`]; tests
//! use [`ManualClock`] to freeze and advance time deterministically.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::types::Timestamp;

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current moment according to this clock.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a new system clock.
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(Utc::now())
    }
}

/// A clock frozen at an explicit instant, advanced only by hand.
///
/// Cloning shares the underlying instant, so a test can hold one handle
/// while the system under test holds another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Creates a manual clock frozen at the given instant.
    pub fn starting_at(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Arc::new(Mutex::new(instant)),
        }
    }

    /// Moves the clock to a new absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.instant.lock().expect("Mutex poisoned") = instant;
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, by: Duration) {
        let mut instant = self.instant.lock().expect("Mutex poisoned");
        *instant += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(*self.instant.lock().expect("Mutex poisoned"))
    }
}
