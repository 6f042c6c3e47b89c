use std::fmt;
use std::sync::Arc;

pub use handlers::{EventHandlers, EventHandlersBuilder, HandlerError};
pub use metadata::{AggregateRootMetadata, ConstructionError, Constructor};
pub use roots::{AggregateRoots, AggregateRootsBuilder, RegistrationError};

use crate::artifacts::{AggregateRootType, AggregateRootVersion, EventSourceId, EventType};
use crate::event::{AppliedEvent, Event};

mod handlers;
mod metadata;
mod roots;

/// Boxed error returned by user code: constructors and actions performed on aggregate roots.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// AggregateRoot trait.
///
/// An aggregate root derives its whole state from the events applied to it. Implementors embed an
/// [`AggregateRootBase`] that keeps the bookkeeping (event source, version, applied events) and
/// declare statically how they are constructed and which events change their state.
///
/// ```ignore
/// struct Person {
///     base: AggregateRootBase<Self>,
///     name: String,
/// }
///
/// impl Person {
///     pub fn rename(&mut self, name: &str) {
///         self.apply(Renamed { name: name.to_string() });
///     }
///
///     fn on_renamed(&mut self, event: &Renamed) {
///         self.name = event.name.clone();
///     }
/// }
///
/// impl AggregateRoot for Person {
///     fn constructor() -> Constructor<Self> {
///         Constructor::WithEventSourceId(|id| Ok(Self { base: AggregateRootBase::new(id), name: String::new() }))
///     }
///
///     fn aggregate_root_type() -> Option<AggregateRootType> {
///         Some(AggregateRootType::new(PERSON_ID).with_alias("Person"))
///     }
///
///     fn handlers(handlers: EventHandlersBuilder<Self>) -> EventHandlersBuilder<Self> {
///         handlers.on(Self::on_renamed)
///     }
///
///     fn base(&self) -> &AggregateRootBase<Self> { &self.base }
///     fn base_mut(&mut self) -> &mut AggregateRootBase<Self> { &mut self.base }
/// }
/// ```
pub trait AggregateRoot: Sized + Send + 'static {
    /// How an instance gets built before its history is replayed.
    fn constructor() -> Constructor<Self>;

    /// The aggregate root type the Runtime knows this implementation by. Instances of an aggregate
    /// root without one cannot be created.
    fn aggregate_root_type() -> Option<AggregateRootType> {
        None
    }

    /// Declares the events that change the state of this aggregate root. An aggregate root that
    /// registers no handler is stateless: its history never has to be fetched.
    fn handlers(handlers: EventHandlersBuilder<Self>) -> EventHandlersBuilder<Self> {
        handlers
    }

    fn base(&self) -> &AggregateRootBase<Self>;

    fn base_mut(&mut self) -> &mut AggregateRootBase<Self>;

    fn event_source_id(&self) -> Option<&EventSourceId> {
        self.base().event_source_id()
    }

    fn version(&self) -> AggregateRootVersion {
        self.base().version()
    }

    fn applied_events(&self) -> &[AppliedEvent] {
        self.base().applied_events()
    }

    /// Applies a private event, handling it right away if a handler is registered for it.
    fn apply<E: Event>(&mut self, event: E) {
        apply_event(self, event, None, false)
    }

    /// Applies a public event.
    fn apply_public<E: Event>(&mut self, event: E) {
        apply_event(self, event, None, true)
    }

    /// Applies a private event with an explicit event type. The event type is checked against the
    /// one associated with `E` when committing.
    fn apply_with_type<E: Event>(&mut self, event: E, event_type: EventType) {
        apply_event(self, event, Some(event_type), false)
    }
}

fn apply_event<A: AggregateRoot, E: Event>(root: &mut A, event: E, event_type: Option<EventType>, is_public: bool) {
    if let Some(handlers) = root.base().handlers.clone() {
        handlers.on_applied(root, &event);
    }

    let base = root.base_mut();
    base.version = base.version.next();
    base.applied_events.push(AppliedEvent::new(event, event_type, is_public));
}

#[derive(thiserror::Error, Debug)]
#[error("event source id is already set to {current}, cannot change it to {attempted}")]
pub struct EventSourceIdAlreadySet {
    pub current: EventSourceId,
    pub attempted: EventSourceId,
}

/// Bookkeeping every [`AggregateRoot`] carries.
pub struct AggregateRootBase<A> {
    event_source_id: Option<EventSourceId>,
    version: AggregateRootVersion,
    applied_events: Vec<AppliedEvent>,
    handlers: Option<Arc<EventHandlers<A>>>,
}

impl<A> AggregateRootBase<A> {
    pub fn new(event_source_id: impl Into<EventSourceId>) -> Self {
        Self {
            event_source_id: Some(event_source_id.into()),
            ..Self::default()
        }
    }

    pub fn event_source_id(&self) -> Option<&EventSourceId> {
        self.event_source_id.as_ref()
    }

    /// Sets the event source id of an aggregate root built without one. Once set it never changes.
    pub fn set_event_source_id(&mut self, event_source_id: EventSourceId) -> Result<(), EventSourceIdAlreadySet> {
        match &self.event_source_id {
            Some(current) => Err(EventSourceIdAlreadySet {
                current: current.clone(),
                attempted: event_source_id,
            }),
            None => {
                self.event_source_id = Some(event_source_id);
                Ok(())
            }
        }
    }

    pub fn version(&self) -> AggregateRootVersion {
        self.version
    }

    pub fn applied_events(&self) -> &[AppliedEvent] {
        &self.applied_events
    }

    pub(crate) fn attach_handlers(&mut self, handlers: Arc<EventHandlers<A>>) {
        self.handlers = Some(handlers);
    }

    /// Counts an event replayed from history. Replayed events are never buffered.
    pub(crate) fn replayed(&mut self) {
        self.version = self.version.next();
    }

    pub(crate) fn set_version(&mut self, version: AggregateRootVersion) {
        self.version = version;
    }

    pub(crate) fn clear_applied_events(&mut self) {
        self.applied_events.clear();
    }
}

impl<A> Default for AggregateRootBase<A> {
    fn default() -> Self {
        Self {
            event_source_id: None,
            version: AggregateRootVersion::INITIAL,
            applied_events: vec![],
            handlers: None,
        }
    }
}

impl<A> fmt::Debug for AggregateRootBase<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRootBase")
            .field("event_source_id", &self.event_source_id)
            .field("version", &self.version)
            .field("applied_events", &self.applied_events)
            .finish()
    }
}
