use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use gravy_common::{EntityId, HandlerId};

use crate::handler::{BoundHandler, Pass};
use crate::key::KeyMatch;

/// Handlers taking part in one kind of pass, in dispatch order.
///
/// Deescalation names are resolved to table indices once, when the table is
/// compiled, so a pass never compares names.
pub struct DispatchTable<C> {
    entries: Vec<Rc<BoundHandler<C>>>,
    /// For entry `i`: the later entries it suppresses when it fires.
    suppresses: Vec<Vec<usize>>,
}

impl<C> DispatchTable<C> {
    fn empty() -> Self {
        Self {
            entries: Vec::new(),
            suppresses: Vec::new(),
        }
    }

    /// Build the table for `pass` from handlers in registration order.
    fn compile(pass: Pass, handlers: &[Rc<BoundHandler<C>>]) -> Self {
        let mut entries: Vec<Rc<BoundHandler<C>>> = handlers
            .iter()
            .filter(|h| pass.accepts(&h.triggers))
            .cloned()
            .collect();
        // Stable: equal priorities keep registration order.
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, h) in entries.iter().enumerate() {
            by_name.entry(h.name.as_str()).or_default().push(i);
        }

        let suppresses = entries
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let mut targets: Vec<usize> = h
                    .deescalations
                    .iter()
                    .filter_map(|name| by_name.get(name.as_str()))
                    .flatten()
                    .copied()
                    .filter(|&j| j > i)
                    .collect();
                targets.sort_unstable();
                targets.dedup();
                targets
            })
            .collect();

        Self {
            entries,
            suppresses,
        }
    }

    pub fn entries(&self) -> &[Rc<BoundHandler<C>>] {
        &self.entries
    }

    pub fn suppressed_by(&self, index: usize) -> &[usize] {
        &self.suppresses[index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A handler as shown in a controls listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlInfo {
    pub name: String,
    pub keys: Vec<KeyMatch>,
    pub description: String,
}

/// All registered handlers plus one compiled table per pass.
pub struct HandlerRegistry<C> {
    handlers: Vec<Rc<BoundHandler<C>>>,
    key_down: Rc<DispatchTable<C>>,
    key_up: Rc<DispatchTable<C>>,
    update: Rc<DispatchTable<C>>,
}

impl<C> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            key_down: Rc::new(DispatchTable::empty()),
            key_up: Rc::new(DispatchTable::empty()),
            update: Rc::new(DispatchTable::empty()),
        }
    }
}

impl<C> HandlerRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register handlers and recompile the dispatch tables. Accepts owned or
    /// already shared handlers.
    ///
    /// Returns the deescalation names of the added handlers that match no
    /// registered handler. Register handlers that reference each other in one
    /// call so the names resolve together.
    pub fn register<H>(&mut self, handlers: impl IntoIterator<Item = H>) -> BTreeSet<String>
    where
        H: Into<Rc<BoundHandler<C>>>,
    {
        let before = self.handlers.len();
        self.handlers.extend(handlers.into_iter().map(Into::into));
        self.recompile();

        let added = &self.handlers[before..];
        let unresolved = self.unresolved_deescalations();
        let mut dangling = BTreeSet::new();
        for h in added {
            for name in h.deescalations.iter().filter(|n| unresolved.contains(*n)) {
                tracing::warn!(
                    handler = %h.name,
                    deescalation = %name,
                    "deescalation names no registered handler"
                );
                dangling.insert(name.clone());
            }
        }
        tracing::debug!(
            added = added.len(),
            total = self.handlers.len(),
            "registered input handlers"
        );
        dangling
    }

    /// Remove every handler owned by `entity`. Returns how many were removed.
    pub fn remove_entity(&mut self, entity: EntityId) -> usize {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.entity != entity);
        let removed = before - self.handlers.len();
        if removed > 0 {
            self.recompile();
        }
        removed
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The compiled table for `pass`. Cheap to clone out of the registry so
    /// dispatch can hand the owning context to callbacks.
    pub fn table(&self, pass: Pass) -> Rc<DispatchTable<C>> {
        match pass {
            Pass::KeyDown => Rc::clone(&self.key_down),
            Pass::KeyUp => Rc::clone(&self.key_up),
            Pass::Update => Rc::clone(&self.update),
        }
    }

    /// Handlers eligible for `pass`, in dispatch order.
    pub fn handlers_for(&self, pass: Pass) -> Vec<Rc<BoundHandler<C>>> {
        self.table(pass).entries.clone()
    }

    pub fn get(&self, id: HandlerId) -> Option<&BoundHandler<C>> {
        self.handlers
            .iter()
            .find(|h| h.identifier == id)
            .map(|h| h.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Deescalation names that match no registered handler.
    pub fn unresolved_deescalations(&self) -> BTreeSet<String> {
        let names: BTreeSet<&str> = self.handlers.iter().map(|h| h.name.as_str()).collect();
        self.handlers
            .iter()
            .flat_map(|h| h.deescalations.iter())
            .filter(|n| !names.contains(n.as_str()))
            .cloned()
            .collect()
    }

    /// Name, keys and description of every handler, highest priority first.
    pub fn controls(&self) -> Vec<ControlInfo> {
        let mut sorted: Vec<&Rc<BoundHandler<C>>> = self.handlers.iter().collect();
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
        sorted
            .into_iter()
            .map(|h| ControlInfo {
                name: h.name.clone(),
                keys: h.keys.clone(),
                description: h.description.clone(),
            })
            .collect()
    }

    fn recompile(&mut self) {
        self.key_down = Rc::new(DispatchTable::compile(Pass::KeyDown, &self.handlers));
        self.key_up = Rc::new(DispatchTable::compile(Pass::KeyUp, &self.handlers));
        self.update = Rc::new(DispatchTable::compile(Pass::Update, &self.handlers));
    }
}
