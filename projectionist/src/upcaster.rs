//! Event schema upcasting.
//!
//! An upcaster rewrites a stored event name/payload pair forward through
//! version-upgrade steps, so projectors written against the current schema
//! can consume records persisted under older ones. Upcasters are pure
//! transforms; the engine applies the chain exactly once per message,
//! before dispatch.

use crate::types::EventName;

/// A single version-upgrade step.
pub trait Upcaster: Send + Sync {
    /// Rewrites the event name and/or payload one step forward.
    ///
    /// Steps that do not recognize the event must return their input
    /// unchanged.
    fn apply(
        &self,
        name: EventName,
        payload: serde_json::Value,
    ) -> (EventName, serde_json::Value);
}

impl<F> Upcaster for F
where
    F: Fn(EventName, serde_json::Value) -> (EventName, serde_json::Value) + Send + Sync,
{
    fn apply(
        &self,
        name: EventName,
        payload: serde_json::Value,
    ) -> (EventName, serde_json::Value) {
        self(name, payload)
    }
}

/// An ordered chain of upcasters, applied in registration order.
#[derive(Default)]
pub struct UpcasterChain {
    upcasters: Vec<Box<dyn Upcaster>>,
}

impl UpcasterChain {
    /// Creates an empty chain that passes events through unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an upcaster to the end of the chain.
    #[must_use]
    pub fn with(mut self, upcaster: impl Upcaster + 'static) -> Self {
        self.upcasters.push(Box::new(upcaster));
        self
    }

    /// Runs the name/payload pair through every step in registration order.
    pub fn apply(
        &self,
        name: EventName,
        payload: serde_json::Value,
    ) -> (EventName, serde_json::Value) {
        self.upcasters
            .iter()
            .fold((name, payload), |(name, payload), upcaster| {
                upcaster.apply(name, payload)
            })
    }

    /// Whether the chain contains any steps.
    pub fn is_empty(&self) -> bool {
        self.upcasters.is_empty()
    }
}

impl std::fmt::Debug for UpcasterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpcasterChain")
            .field("len", &self.upcasters.len())
            .finish()
    }
}
