//! The projection engine: discovery, catch-up, tailing, administration.
//!
//! A [`Projectionist`] owns a set of registered projector descriptors and
//! drives their subscriptions over the global event log:
//!
//! 1. Acquire the cluster-wide dispatch lock; a lost race is a skipped
//!    cycle, not a fault.
//! 2. Reconcile registered projectors against stored subscription rows.
//! 3. Stream messages in global order from the minimum unconsumed position
//!    and dispatch them, one subscription at a time, in (group, id) order.
//! 4. Isolate handler failures per subscription; notify listeners; consult
//!    the error policy.
//! 5. Release the lock on every exit path.
//!
//! [`Projectionist::boot`] drains the backlog observed at call time and
//! stops; [`Projectionist::run`] keeps tailing with a jittered poll
//! backoff until the stop signal flips.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::errors::{HandlerError, ProjectionistError, ProjectionistResult};
use crate::event_log::EventLog;
use crate::listener::{ErrorPolicy, ProjectorErrorListener, ProjectorErrorNotification};
use crate::lock::{DispatchLock, LockKey};
use crate::message::Message;
use crate::projector::ProjectorDescriptor;
use crate::subscription::{Subscription, SubscriptionStatus, SubscriptionStore};
use crate::types::{GlobalOffset, ProjectorId};
use crate::upcaster::UpcasterChain;

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct ProjectionistConfig {
    /// The lock all engine instances of a deployment contend on.
    pub lock_key: LockKey,
    /// How long lock holding survives a crashed holder.
    pub lock_ttl: Duration,
    /// Maximum messages fetched per log read.
    pub batch_size: usize,
    /// Initial sleep between empty reads while tailing.
    pub poll_interval: Duration,
    /// Ceiling for the exponential poll backoff.
    pub max_poll_interval: Duration,
}

impl Default for ProjectionistConfig {
    fn default() -> Self {
        Self {
            lock_key: LockKey::try_new("projectionist").expect("default lock key is valid"),
            lock_ttl: Duration::from_secs(30),
            batch_size: 1000,
            poll_interval: Duration::from_millis(100),
            max_poll_interval: Duration::from_secs(5),
        }
    }
}

/// How a call to `boot`/`run` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The backlog was drained (boot) or no eligible subscriptions remain.
    Completed,
    /// The external stop signal ended a tailing run.
    Stopped,
    /// Another engine instance holds the dispatch lock; nothing was done.
    LockUnavailable,
}

/// Counters describing one engine cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// How the cycle ended.
    pub outcome: RunOutcome,
    /// Messages examined, across all subscriptions.
    pub messages_read: u64,
    /// Handler invocations that were dispatched.
    pub handlers_invoked: u64,
    /// Handler invocations that failed.
    pub handler_errors: u64,
}

impl RunSummary {
    const fn skipped() -> Self {
        Self {
            outcome: RunOutcome::LockUnavailable,
            messages_read: 0,
            handlers_invoked: 0,
            handler_errors: 0,
        }
    }
}

/// In-run cursor over one subscription; write-through to the store.
struct Cursor {
    descriptor: Arc<ProjectorDescriptor>,
    status: SubscriptionStatus,
    position: GlobalOffset,
}

/// The subscription/catch-up engine.
pub struct Projectionist {
    log: Arc<dyn EventLog>,
    store: Arc<dyn SubscriptionStore>,
    lock: Arc<dyn DispatchLock>,
    clock: Arc<dyn Clock>,
    upcasters: UpcasterChain,
    projectors: BTreeMap<ProjectorId, Arc<ProjectorDescriptor>>,
    listeners: Vec<Arc<dyn ProjectorErrorListener>>,
    policy: ErrorPolicy,
    config: ProjectionistConfig,
}

impl Projectionist {
    /// Starts building an engine over the given collaborators.
    pub fn builder(
        log: Arc<dyn EventLog>,
        store: Arc<dyn SubscriptionStore>,
        lock: Arc<dyn DispatchLock>,
    ) -> ProjectionistBuilder {
        ProjectionistBuilder {
            log,
            store,
            lock,
            clock: Arc::new(SystemClock::new()),
            upcasters: UpcasterChain::new(),
            projectors: BTreeMap::new(),
            listeners: Vec::new(),
            policy: ErrorPolicy::default(),
            config: ProjectionistConfig::default(),
        }
    }

    /// Processes the backlog observed at call time, then stops.
    ///
    /// Subscriptions that drain their backlog transition to `Active`.
    /// Returns immediately with [`RunOutcome::LockUnavailable`] when
    /// another instance holds the dispatch lock.
    #[instrument(skip_all)]
    pub async fn boot(&self) -> ProjectionistResult<RunSummary> {
        self.locked_drive(None).await
    }

    /// Boots, then keeps tailing live appends until `stop` flips to
    /// `true` (dropping the sender counts as a stop). The signal is
    /// observed between message dispatches, never mid-handler; positions
    /// committed before the stop are durable.
    #[instrument(skip_all)]
    pub async fn run(&self, stop: watch::Receiver<bool>) -> ProjectionistResult<RunSummary> {
        self.locked_drive(Some(stop)).await
    }

    /// Invokes the projector's teardown hook, then deletes its
    /// subscription row.
    #[instrument(skip(self))]
    pub async fn teardown(&self, id: &ProjectorId) -> ProjectionistResult<()> {
        let descriptor = self
            .projectors
            .get(id)
            .ok_or_else(|| ProjectionistError::UnknownProjector(id.clone()))?;
        descriptor
            .teardown()
            .await
            .map_err(|source| ProjectionistError::Lifecycle {
                projector: id.clone(),
                source,
            })?;
        self.store.remove(id).await?;
        info!(projector = %id, "projection torn down");
        Ok(())
    }

    /// Rewinds the subscription to `New` at position zero. The next boot
    /// or run fully replays the log for this projector.
    #[instrument(skip(self))]
    pub async fn reset(&self, id: &ProjectorId) -> ProjectionistResult<()> {
        self.store.reset(id).await?;
        info!(projector = %id, "subscription reset");
        Ok(())
    }

    /// Deletes the subscription row without invoking the teardown hook.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &ProjectorId) -> ProjectionistResult<()> {
        self.store.remove(id).await?;
        info!(projector = %id, "subscription removed");
        Ok(())
    }

    /// Marks the subscription complete; it receives no further dispatch.
    #[instrument(skip(self))]
    pub async fn finish(&self, id: &ProjectorId) -> ProjectionistResult<()> {
        self.store
            .set_status(id, SubscriptionStatus::Finished)
            .await?;
        info!(projector = %id, "subscription finished");
        Ok(())
    }

    /// Reports all subscription rows, in stable (group, id) order.
    pub async fn status(&self) -> ProjectionistResult<Vec<Subscription>> {
        Ok(self.store.all().await?)
    }

    async fn locked_drive(
        &self,
        stop: Option<watch::Receiver<bool>>,
    ) -> ProjectionistResult<RunSummary> {
        let acquired = self
            .lock
            .try_acquire(&self.config.lock_key, self.config.lock_ttl)
            .await?;
        if !acquired {
            debug!(key = %self.config.lock_key, "dispatch lock held elsewhere; skipping cycle");
            return Ok(RunSummary::skipped());
        }

        let result = self.drive(stop).await;
        let released = self.lock.release(&self.config.lock_key).await;
        let summary = result?;
        released?;
        Ok(summary)
    }

    /// The dispatch loop. `stop` present means tailing mode.
    async fn drive(
        &self,
        mut stop: Option<watch::Receiver<bool>>,
    ) -> ProjectionistResult<RunSummary> {
        self.reconcile().await?;

        let boot_head = self.log.head().await?;
        let tailing = stop.is_some();
        let mut cursors = self.load_cursors().await?;
        self.start_new_subscriptions(&mut cursors).await?;

        let mut summary = RunSummary {
            outcome: RunOutcome::Completed,
            messages_read: 0,
            handlers_invoked: 0,
            handler_errors: 0,
        };
        let mut backoff = self.config.poll_interval;

        'cycle: loop {
            // Promote subscriptions that were already at the boundary
            for cursor in &mut cursors {
                if cursor.status == SubscriptionStatus::Booting && cursor.position >= boot_head {
                    self.promote(cursor).await?;
                }
            }

            if stop_requested(stop.as_ref()) {
                summary.outcome = RunOutcome::Stopped;
                break;
            }

            let Some(min_position) = cursors
                .iter()
                .filter(|cursor| cursor.status.is_eligible())
                .map(|cursor| cursor.position)
                .min()
            else {
                break;
            };

            if !tailing && min_position >= boot_head {
                break;
            }

            let mut batch = self
                .log
                .read_from(min_position, self.config.batch_size)
                .await?;
            if !tailing {
                // boot never looks past the head observed at call time
                batch.retain(|sequenced| sequenced.offset <= boot_head);
            }

            if batch.is_empty() {
                if !tailing {
                    break;
                }
                backoff = self.sleep_or_stop(backoff, stop.as_mut()).await;
                continue;
            }
            backoff = self.config.poll_interval;

            for sequenced in batch {
                if stop_requested(stop.as_ref()) {
                    summary.outcome = RunOutcome::Stopped;
                    break 'cycle;
                }

                let message = self.upcast(sequenced.message);
                summary.messages_read += 1;

                for cursor in &mut cursors {
                    if !cursor.status.is_eligible() || cursor.position >= sequenced.offset {
                        continue;
                    }

                    if cursor.descriptor.interested_in(message.name()) {
                        summary.handlers_invoked += 1;
                        match cursor.descriptor.handle(message.clone()).await {
                            Ok(()) => {
                                self.commit(cursor, sequenced.offset, boot_head).await?;
                            }
                            Err(error) => {
                                summary.handler_errors += 1;
                                self.suspend(cursor, sequenced.offset, error).await?;
                            }
                        }
                    } else {
                        // Not interested: still advance past the message so
                        // catch-up never re-scans it
                        self.commit(cursor, sequenced.offset, boot_head).await?;
                    }
                }
            }
        }

        info!(
            outcome = ?summary.outcome,
            messages = summary.messages_read,
            handlers = summary.handlers_invoked,
            errors = summary.handler_errors,
            "dispatch cycle finished"
        );
        Ok(summary)
    }

    /// Creates missing rows for registered projectors and marks rows whose
    /// descriptors have vanished as `Outdated`.
    async fn reconcile(&self) -> ProjectionistResult<()> {
        for descriptor in self.projectors.values() {
            self.store
                .create_if_missing(descriptor.id(), descriptor.group())
                .await?;
        }

        for subscription in self.store.all().await? {
            if !self.projectors.contains_key(&subscription.id)
                && subscription.status != SubscriptionStatus::Outdated
            {
                self.store
                    .set_status(&subscription.id, SubscriptionStatus::Outdated)
                    .await?;
                info!(projector = %subscription.id, "projector unregistered; subscription marked outdated");
            }
        }
        Ok(())
    }

    /// Builds in-run cursors for eligible rows with registered
    /// descriptors, preserving the store's (group, id) order.
    async fn load_cursors(&self) -> ProjectionistResult<Vec<Cursor>> {
        let mut cursors = Vec::new();
        for subscription in self.store.all().await? {
            if !subscription.is_eligible() {
                continue;
            }
            if let Some(descriptor) = self.projectors.get(&subscription.id) {
                cursors.push(Cursor {
                    descriptor: Arc::clone(descriptor),
                    status: subscription.status,
                    position: subscription.position,
                });
            }
        }
        Ok(cursors)
    }

    /// Runs setup hooks for `New` subscriptions and moves them to
    /// `Booting`. A failing setup hook follows the handler-failure path.
    async fn start_new_subscriptions(&self, cursors: &mut [Cursor]) -> ProjectionistResult<()> {
        for cursor in cursors.iter_mut() {
            if cursor.status != SubscriptionStatus::New {
                continue;
            }
            match cursor.descriptor.setup().await {
                Ok(()) => {
                    self.store
                        .set_status(cursor.descriptor.id(), SubscriptionStatus::Booting)
                        .await?;
                    cursor.status = SubscriptionStatus::Booting;
                    debug!(projector = %cursor.descriptor.id(), "subscription booting");
                }
                Err(error) => {
                    let offset = cursor.position;
                    self.suspend(cursor, offset, error).await?;
                }
            }
        }
        Ok(())
    }

    /// Advances a cursor, write-through, promoting `Booting` rows that
    /// reach the boot boundary.
    async fn commit(
        &self,
        cursor: &mut Cursor,
        offset: GlobalOffset,
        boot_head: GlobalOffset,
    ) -> ProjectionistResult<()> {
        let status = if cursor.status == SubscriptionStatus::Booting && offset >= boot_head {
            SubscriptionStatus::Active
        } else {
            cursor.status
        };
        self.store
            .update_position(cursor.descriptor.id(), offset, status, self.clock.now())
            .await?;
        cursor.position = offset;
        if status != cursor.status {
            info!(projector = %cursor.descriptor.id(), "subscription caught up");
            cursor.status = status;
        }
        Ok(())
    }

    async fn promote(&self, cursor: &mut Cursor) -> ProjectionistResult<()> {
        self.store
            .set_status(cursor.descriptor.id(), SubscriptionStatus::Active)
            .await?;
        cursor.status = SubscriptionStatus::Active;
        info!(projector = %cursor.descriptor.id(), "subscription caught up");
        Ok(())
    }

    /// Records a handler failure, isolates the subscription, notifies the
    /// listener chain, and applies the error policy.
    async fn suspend(
        &self,
        cursor: &mut Cursor,
        offset: GlobalOffset,
        error: HandlerError,
    ) -> ProjectionistResult<()> {
        self.store
            .mark_error(cursor.descriptor.id(), &error.to_string(), self.clock.now())
            .await?;
        cursor.status = SubscriptionStatus::Error;

        let notification = ProjectorErrorNotification {
            projector_id: cursor.descriptor.id().clone(),
            group: cursor.descriptor.group().clone(),
            offset,
            error: error.clone(),
        };
        for listener in &self.listeners {
            listener.on_projector_error(&notification);
        }
        warn!(
            projector = %notification.projector_id,
            offset = %notification.offset,
            "handler failed; subscription suspended"
        );

        match self.policy {
            ErrorPolicy::Continue => Ok(()),
            ErrorPolicy::Abort => Err(ProjectionistError::Aborted {
                projector: notification.projector_id,
                offset,
                source: error,
            }),
        }
    }

    /// Applies the upcaster chain once, before dispatch.
    fn upcast(&self, message: Message) -> Message {
        if self.upcasters.is_empty() {
            return message;
        }
        let (name, payload) = self
            .upcasters
            .apply(message.name().clone(), message.payload().clone());
        message.with_event(name, payload)
    }

    /// Sleeps one backoff step (with jitter) or wakes early on the stop
    /// signal; returns the next backoff.
    async fn sleep_or_stop(
        &self,
        backoff: Duration,
        stop: Option<&mut watch::Receiver<bool>>,
    ) -> Duration {
        let delay = jittered(backoff);
        match stop {
            Some(receiver) => {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    _ = receiver.changed() => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }
        (backoff * 2).min(self.config.max_poll_interval)
    }
}

impl std::fmt::Debug for Projectionist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projectionist")
            .field("projectors", &self.projectors.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// A dropped sender counts as a stop request: a run that can never be
// signaled again must not tail forever.
fn stop_requested(stop: Option<&watch::Receiver<bool>>) -> bool {
    stop.is_some_and(|receiver| *receiver.borrow() || receiver.has_changed().is_err())
}

/// Adds ±25% jitter so a fleet of tailing engines does not poll in step.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn jittered(delay: Duration) -> Duration {
    use rand::Rng;

    let delay_ms = delay.as_millis() as f64;
    let mut rng = rand::rng();
    let jitter = delay_ms * 0.25 * (rng.random::<f64>() - 0.5) * 2.0;
    Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
}

/// Builder wiring collaborators, projectors, and policy into an engine.
pub struct ProjectionistBuilder {
    log: Arc<dyn EventLog>,
    store: Arc<dyn SubscriptionStore>,
    lock: Arc<dyn DispatchLock>,
    clock: Arc<dyn Clock>,
    upcasters: UpcasterChain,
    projectors: BTreeMap<ProjectorId, Arc<ProjectorDescriptor>>,
    listeners: Vec<Arc<dyn ProjectorErrorListener>>,
    policy: ErrorPolicy,
    config: ProjectionistConfig,
}

impl ProjectionistBuilder {
    /// Registers a projector. Registering the same id twice replaces the
    /// earlier descriptor.
    #[must_use]
    pub fn register(mut self, descriptor: ProjectorDescriptor) -> Self {
        self.projectors
            .insert(descriptor.id().clone(), Arc::new(descriptor));
        self
    }

    /// Replaces the time source (defaults to [`SystemClock`]).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Installs the upcaster chain applied before dispatch.
    #[must_use]
    pub fn with_upcasters(mut self, upcasters: UpcasterChain) -> Self {
        self.upcasters = upcasters;
        self
    }

    /// Adds an error listener to the notification chain.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ProjectorErrorListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Sets the post-notification error policy (defaults to `Continue`).
    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the engine configuration.
    #[must_use]
    pub fn with_config(mut self, config: ProjectionistConfig) -> Self {
        self.config = config;
        self
    }

    /// Finalizes the engine.
    pub fn build(self) -> Projectionist {
        Projectionist {
            log: self.log,
            store: self.store,
            lock: self.lock,
            clock: self.clock,
            upcasters: self.upcasters,
            projectors: self.projectors,
            listeners: self.listeners,
            policy: self.policy,
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = ProjectionistConfig::default();
        assert_eq!(config.lock_key.as_str(), "projectionist");
        assert!(config.poll_interval < config.max_poll_interval);
        assert!(config.batch_size > 0);
    }

    #[test]
    fn skipped_summary_reports_lock_unavailable() {
        let summary = RunSummary::skipped();
        assert_eq!(summary.outcome, RunOutcome::LockUnavailable);
        assert_eq!(summary.messages_read, 0);
    }

    #[test]
    fn jitter_stays_within_a_quarter_of_the_delay() {
        for _ in 0..100 {
            let delay = jittered(Duration::from_millis(100));
            assert!(delay >= Duration::from_millis(75));
            assert!(delay <= Duration::from_millis(125));
        }
    }

    #[test]
    fn stop_is_observed_through_the_watch_channel() {
        let (tx, rx) = watch::channel(false);
        assert!(!stop_requested(Some(&rx)));
        tx.send(true).expect("receiver alive");
        assert!(stop_requested(Some(&rx)));
        assert!(!stop_requested(None));
    }
}
