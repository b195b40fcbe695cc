//! Projector-error notifications and the listener chain.
//!
//! When a handler fails, the engine always marks the subscription `Error`
//! and always emits a [`ProjectorErrorNotification`] to every registered
//! listener. What happens next is policy, not mechanism: the explicit
//! [`ErrorPolicy`] value decides whether the run keeps advancing healthy
//! subscriptions or aborts wholesale. Listeners observe; the policy
//! decides.

use crate::errors::HandlerError;
use crate::types::{GlobalOffset, ProjectionGroup, ProjectorId};

/// What a run does after a handler failure has been recorded and
/// notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Isolate the failed subscription and keep advancing the others.
    #[default]
    Continue,
    /// Abort the entire run with a fatal error identifying the projector,
    /// subscription, and original cause.
    Abort,
}

/// Value describing one handler failure.
#[derive(Debug, Clone)]
pub struct ProjectorErrorNotification {
    /// The projector whose handler failed.
    pub projector_id: ProjectorId,
    /// The failed projector's administrative group; together with the
    /// projector id this identifies the subscription row.
    pub group: ProjectionGroup,
    /// The offset of the message being processed when the failure
    /// occurred.
    pub offset: GlobalOffset,
    /// The raised error.
    pub error: HandlerError,
}

/// Observer of projector failures.
///
/// Implementations log, emit metrics, or schedule out-of-band retries.
/// They must not assume they can influence the run: consequence is the
/// engine's [`ErrorPolicy`].
pub trait ProjectorErrorListener: Send + Sync {
    /// Called once per handler failure, after the subscription has been
    /// marked `Error`.
    fn on_projector_error(&self, notification: &ProjectorErrorNotification);
}

impl<F> ProjectorErrorListener for F
where
    F: Fn(&ProjectorErrorNotification) + Send + Sync,
{
    fn on_projector_error(&self, notification: &ProjectorErrorNotification) {
        self(notification);
    }
}

/// Reference listener that records failures through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorListener;

impl TracingErrorListener {
    /// Creates the listener.
    pub const fn new() -> Self {
        Self
    }
}

impl ProjectorErrorListener for TracingErrorListener {
    fn on_projector_error(&self, notification: &ProjectorErrorNotification) {
        tracing::error!(
            projector = %notification.projector_id,
            group = %notification.group,
            offset = %notification.offset,
            error = %notification.error,
            "projector handler failed; subscription suspended"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn notification() -> ProjectorErrorNotification {
        ProjectorErrorNotification {
            projector_id: ProjectorId::try_new("profiles").unwrap(),
            group: ProjectionGroup::try_new("default").unwrap(),
            offset: GlobalOffset::try_new(3).unwrap(),
            error: HandlerError::Other("boom".to_string()),
        }
    }

    #[test]
    fn closures_are_listeners() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let listener = move |_notification: &ProjectorErrorNotification| {
            seen.fetch_add(1, Ordering::SeqCst);
        };

        listener.on_projector_error(&notification());
        listener.on_projector_error(&notification());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn default_policy_isolates_rather_than_aborts() {
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::Continue);
    }
}
