//! Projector descriptors: the handler table the engine dispatches on.
//!
//! A projector is a set of event handlers deriving read-model state from
//! the log, plus optional hooks to create and drop that read storage. The
//! descriptor carries an explicit, closed mapping from event name to
//! handler, built once at registration time by [`ProjectorBuilder`]. No
//! runtime reflection, no per-message handler discovery.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;

use crate::errors::HandlerError;
use crate::message::Message;
use crate::types::{EventName, ProjectionGroup, ProjectorId};

type Handler = Arc<dyn Fn(Message) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;
type LifecycleHook = Arc<dyn Fn() -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// A registered projector: identity, group, handler table, lifecycle hooks.
#[derive(Clone)]
pub struct ProjectorDescriptor {
    id: ProjectorId,
    group: ProjectionGroup,
    handlers: BTreeMap<EventName, Handler>,
    setup: Option<LifecycleHook>,
    teardown: Option<LifecycleHook>,
}

impl ProjectorDescriptor {
    /// Starts building a descriptor for the given projector identity.
    pub fn builder(id: ProjectorId, group: ProjectionGroup) -> ProjectorBuilder {
        ProjectorBuilder {
            id,
            group,
            handlers: BTreeMap::new(),
            setup: None,
            teardown: None,
        }
    }

    /// The projector's identity.
    pub const fn id(&self) -> &ProjectorId {
        &self.id
    }

    /// The projector's administrative group.
    pub const fn group(&self) -> &ProjectionGroup {
        &self.group
    }

    /// Whether this projector declares a handler for the event.
    pub fn interested_in(&self, name: &EventName) -> bool {
        self.handlers.contains_key(name)
    }

    /// The event names this projector handles, in sorted order.
    pub fn event_names(&self) -> impl Iterator<Item = &EventName> + '_ {
        self.handlers.keys()
    }

    /// Invokes the handler registered for the message's event.
    ///
    /// Messages without a registered handler are a no-op: the engine
    /// advances the subscription past uninteresting events without
    /// dispatching.
    pub async fn handle(&self, message: Message) -> Result<(), HandlerError> {
        match self.handlers.get(message.name()) {
            Some(handler) => handler(message).await,
            None => Ok(()),
        }
    }

    /// Runs the setup hook, creating the projector's read storage.
    pub async fn setup(&self) -> Result<(), HandlerError> {
        match &self.setup {
            Some(hook) => hook().await,
            None => Ok(()),
        }
    }

    /// Runs the teardown hook, dropping the projector's read storage.
    pub async fn teardown(&self) -> Result<(), HandlerError> {
        match &self.teardown {
            Some(hook) => hook().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ProjectorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectorDescriptor")
            .field("id", &self.id)
            .field("group", &self.group)
            .field("events", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder assembling a projector's closed handler table.
pub struct ProjectorBuilder {
    id: ProjectorId,
    group: ProjectionGroup,
    handlers: BTreeMap<EventName, Handler>,
    setup: Option<LifecycleHook>,
    teardown: Option<LifecycleHook>,
}

impl ProjectorBuilder {
    /// Registers a raw handler for an event name.
    ///
    /// Registering the same event name twice replaces the earlier handler.
    #[must_use]
    pub fn on<F, Fut>(mut self, name: EventName, handler: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let handler = move |message: Message| -> BoxFuture<'static, Result<(), HandlerError>> {
            Box::pin(handler(message))
        };
        self.handlers.insert(name, Arc::new(handler));
        self
    }

    /// Registers a typed handler: the message payload is deserialized into
    /// `E` before the handler runs. Decode failures surface as
    /// [`HandlerError::Decode`] and follow the standard handler-failure
    /// path.
    #[must_use]
    pub fn on_event<E, F, Fut>(self, name: EventName, handler: F) -> Self
    where
        E: DeserializeOwned + Send + 'static,
        F: Fn(E, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let event_name = name.clone();
        self.on(name, move |message: Message| {
            let decoded = serde_json::from_value::<E>(message.payload().clone()).map_err(|e| {
                HandlerError::Decode {
                    event: event_name.clone(),
                    message: e.to_string(),
                }
            });
            let handler_future = decoded.map(|event| handler(event, message));
            async move { handler_future?.await }
        })
    }

    /// Registers the hook that creates the projector's read storage.
    #[must_use]
    pub fn with_setup<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let hook = move || -> BoxFuture<'static, Result<(), HandlerError>> { Box::pin(hook()) };
        self.setup = Some(Arc::new(hook));
        self
    }

    /// Registers the hook that drops the projector's read storage.
    #[must_use]
    pub fn with_teardown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let hook = move || -> BoxFuture<'static, Result<(), HandlerError>> { Box::pin(hook()) };
        self.teardown = Some(Arc::new(hook));
        self
    }

    /// Finalizes the descriptor.
    pub fn build(self) -> ProjectorDescriptor {
        ProjectorDescriptor {
            id: self.id,
            group: self.group,
            handlers: self.handlers,
            setup: self.setup,
            teardown: self.teardown,
        }
    }
}
