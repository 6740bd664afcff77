use std::rc::Rc;
use std::time::Duration;

use gravy_common::{EntityId, HandlerId};

use crate::key::KeyMatch;

/// Event class that makes a handler eligible for a dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Runs once per simulation tick while the keys are held.
    Update,
    KeyDown,
    KeyUp,
    /// Runs on both key edges.
    Change,
}

/// The three kinds of dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    KeyDown,
    KeyUp,
    Update,
}

impl Pass {
    pub const ALL: [Pass; 3] = [Pass::KeyDown, Pass::KeyUp, Pass::Update];

    /// Whether a handler with the given triggers takes part in this pass.
    pub fn accepts(self, triggers: &[Trigger]) -> bool {
        triggers.iter().any(|t| match self {
            Pass::KeyDown => matches!(t, Trigger::KeyDown | Trigger::Change),
            Pass::KeyUp => matches!(t, Trigger::KeyUp | Trigger::Change),
            Pass::Update => matches!(t, Trigger::Update),
        })
    }
}

/// Arguments handed to a declarative handler callback.
pub struct HandlerEvent<'a, C> {
    /// The key entry that matched.
    pub keys: &'a KeyMatch,
    pub game: &'a mut C,
    /// Time since the previous simulation tick.
    pub delta_time: Duration,
    /// Whether this handler fired during the previous frame.
    pub active_previous_frame: bool,
    /// The entity owning the input component.
    pub entity: EntityId,
}

/// Arguments handed to a bound handler during dispatch. The owning entity is
/// already captured by the bound callback.
pub struct DispatchEvent<'a, C> {
    pub keys: &'a KeyMatch,
    pub game: &'a mut C,
    pub delta_time: Duration,
    pub active_previous_frame: bool,
}

pub type HandlerFn<C> = Rc<dyn Fn(HandlerEvent<'_, C>)>;
type BoundFn<C> = Rc<dyn Fn(DispatchEvent<'_, C>)>;

/// A declarative handler, as written by application code.
pub struct HandlerSpec<C> {
    pub name: String,
    pub keys: Vec<KeyMatch>,
    pub triggers: Vec<Trigger>,
    pub handler: HandlerFn<C>,
    pub identifier: HandlerId,
    /// Higher runs first.
    pub priority: i32,
    /// Names of handlers to suppress for the rest of the pass when this one fires.
    pub deescalations: Vec<String>,
    pub description: String,
}

impl<C> Clone for HandlerSpec<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            keys: self.keys.clone(),
            triggers: self.triggers.clone(),
            handler: Rc::clone(&self.handler),
            identifier: self.identifier,
            priority: self.priority,
            deescalations: self.deescalations.clone(),
            description: self.description.clone(),
        }
    }
}

impl<C> std::fmt::Debug for HandlerSpec<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSpec")
            .field("name", &self.name)
            .field("keys", &self.keys)
            .field("triggers", &self.triggers)
            .field("identifier", &self.identifier)
            .field("priority", &self.priority)
            .field("deescalations", &self.deescalations)
            .finish_non_exhaustive()
    }
}

/// Build a handler with the defaults: priority 0, `Update` trigger, no
/// deescalations, description equal to the name.
pub fn generate_handler<C, K, F>(name: &str, keys: K, handler: F) -> HandlerSpec<C>
where
    K: IntoIterator,
    K::Item: Into<KeyMatch>,
    F: Fn(HandlerEvent<'_, C>) + 'static,
{
    HandlerSpec {
        name: name.to_string(),
        keys: keys.into_iter().map(Into::into).collect(),
        triggers: vec![Trigger::Update],
        handler: Rc::new(handler),
        identifier: HandlerId::new(),
        priority: 0,
        deescalations: Vec::new(),
        description: name.to_string(),
    }
}

impl<C> HandlerSpec<C> {
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn triggers(mut self, triggers: impl IntoIterator<Item = Trigger>) -> Self {
        self.triggers = triggers.into_iter().collect();
        self
    }

    pub fn deescalates<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.deescalations = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl<C: 'static> HandlerSpec<C> {
    /// Close the callback over its owning entity.
    ///
    /// Every other field is carried over unchanged.
    pub fn bind(&self, entity: EntityId) -> BoundHandler<C> {
        let raw = Rc::clone(&self.handler);
        let callback: BoundFn<C> = Rc::new(move |event: DispatchEvent<'_, C>| {
            raw(HandlerEvent {
                keys: event.keys,
                game: event.game,
                delta_time: event.delta_time,
                active_previous_frame: event.active_previous_frame,
                entity,
            })
        });
        BoundHandler {
            name: self.name.clone(),
            keys: self.keys.clone(),
            triggers: self.triggers.clone(),
            identifier: self.identifier,
            priority: self.priority,
            deescalations: self.deescalations.clone(),
            description: self.description.clone(),
            entity,
            callback,
        }
    }
}

/// A handler bound to its owning entity, ready for dispatch.
pub struct BoundHandler<C> {
    pub name: String,
    pub keys: Vec<KeyMatch>,
    pub triggers: Vec<Trigger>,
    pub identifier: HandlerId,
    pub priority: i32,
    pub deescalations: Vec<String>,
    pub description: String,
    pub entity: EntityId,
    callback: BoundFn<C>,
}

impl<C> BoundHandler<C> {
    /// Index of the first key entry that is fully held, if any.
    pub fn first_match(&self, is_pressed: impl Fn(&crate::Key) -> bool) -> Option<usize> {
        self.keys.iter().position(|entry| entry.is_held(&is_pressed))
    }

    pub fn invoke(&self, event: DispatchEvent<'_, C>) {
        (self.callback)(event)
    }
}

impl<C> std::fmt::Debug for BoundHandler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundHandler")
            .field("name", &self.name)
            .field("identifier", &self.identifier)
            .field("priority", &self.priority)
            .field("entity", &self.entity)
            .finish_non_exhaustive()
    }
}
