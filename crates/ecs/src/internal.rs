use std::fmt;
use std::rc::Rc;

use gravy_common::{ComponentId, EntityId, Transform};
use gravy_input::BoundHandler;
use gravy_render::{PoolKey, SlotRef};

use crate::component::{RenderKind, RunPolicy, ScriptFn};

/// Input component with every handler bound to its entity.
pub struct InternalInput<S> {
    pub component: ComponentId,
    pub handlers: Vec<Rc<BoundHandler<S>>>,
}

/// Script component with its lifecycle thunks bound to the owning entity.
pub struct InternalScript<S> {
    pub component: ComponentId,
    pub entity: EntityId,
    pub run: RunPolicy,
    script: ScriptFn<S>,
}

impl<S> InternalScript<S> {
    pub fn new(component: ComponentId, entity: EntityId, script: ScriptFn<S>, run: RunPolicy) -> Self {
        Self {
            component,
            entity,
            run,
            script,
        }
    }

    pub fn initialize(&self, state: &mut S) {
        if self.run.initialize {
            (self.script)(self.entity, state);
        }
    }

    pub fn update(&self, state: &mut S) {
        if self.run.update {
            (self.script)(self.entity, state);
        }
    }

    pub fn destroy(&self, state: &mut S) {
        if self.run.destroy {
            (self.script)(self.entity, state);
        }
    }
}

impl<S> fmt::Debug for InternalScript<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalScript")
            .field("component", &self.component)
            .field("entity", &self.entity)
            .field("run", &self.run)
            .finish_non_exhaustive()
    }
}

/// Render component registered in the resource pool.
///
/// `slot` is where `transform` is written each simulation tick. It carries
/// the entry epoch it was issued under and is refreshed when that changes.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalRender {
    pub component: ComponentId,
    pub kind: RenderKind,
    pub key: PoolKey,
    pub slot: SlotRef,
    pub transform: Transform,
}

pub enum InternalComponent<S> {
    Input(InternalInput<S>),
    Script(Rc<InternalScript<S>>),
    Render(InternalRender),
}

impl<S> InternalComponent<S> {
    pub fn id(&self) -> ComponentId {
        match self {
            Self::Input(c) => c.component,
            Self::Script(c) => c.component,
            Self::Render(c) => c.component,
        }
    }
}

impl<S> fmt::Debug for InternalComponent<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(c) => f
                .debug_struct("Input")
                .field("component", &c.component)
                .field("handlers", &c.handlers)
                .finish(),
            Self::Script(c) => c.fmt(f),
            Self::Render(c) => c.fmt(f),
        }
    }
}

/// A live entity: every component resolved.
pub struct InternalEntity<S> {
    pub id: EntityId,
    pub name: String,
    pub components: Vec<InternalComponent<S>>,
}

impl<S> InternalEntity<S> {
    pub fn renders(&self) -> impl Iterator<Item = &InternalRender> {
        self.components.iter().filter_map(|c| match c {
            InternalComponent::Render(r) => Some(r),
            _ => None,
        })
    }

    pub fn renders_mut(&mut self) -> impl Iterator<Item = &mut InternalRender> {
        self.components.iter_mut().filter_map(|c| match c {
            InternalComponent::Render(r) => Some(r),
            _ => None,
        })
    }

    /// Transform of the first render component, for scripts that move a
    /// single mesh.
    pub fn transform_mut(&mut self) -> Option<&mut Transform> {
        self.renders_mut().next().map(|r| &mut r.transform)
    }

    pub fn scripts(&self) -> impl Iterator<Item = &Rc<InternalScript<S>>> {
        self.components.iter().filter_map(|c| match c {
            InternalComponent::Script(s) => Some(s),
            _ => None,
        })
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Rc<BoundHandler<S>>> {
        self.components
            .iter()
            .filter_map(|c| match c {
                InternalComponent::Input(i) => Some(i.handlers.iter()),
                _ => None,
            })
            .flatten()
    }
}

impl<S> fmt::Debug for InternalEntity<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalEntity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("components", &self.components)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn thunks_follow_run_policy() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let script: ScriptFn<()> = Rc::new(move |_: EntityId, _: &mut ()| counter.set(counter.get() + 1));
        let s = InternalScript::new(
            ComponentId::new(),
            EntityId::new(),
            script,
            RunPolicy {
                initialize: false,
                update: true,
                destroy: true,
            },
        );
        s.initialize(&mut ());
        assert_eq!(calls.get(), 0);
        s.update(&mut ());
        s.destroy(&mut ());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn script_sees_its_entity() {
        let owner = EntityId::new();
        let seen = Rc::new(Cell::new(None));
        let sink = Rc::clone(&seen);
        let s = InternalScript::new(
            ComponentId::new(),
            owner,
            Rc::new(move |e: EntityId, _: &mut ()| sink.set(Some(e))),
            RunPolicy::default(),
        );
        s.update(&mut ());
        assert_eq!(seen.get(), Some(owner));
    }

    #[test]
    fn transform_mut_targets_first_render() {
        let render = InternalRender {
            component: ComponentId::new(),
            kind: RenderKind::InstancedMesh,
            key: PoolKey::new("geo", "tex"),
            slot: SlotRef { index: 0, epoch: 1 },
            transform: Transform::default(),
        };
        let mut entity: InternalEntity<()> = InternalEntity {
            id: EntityId::new(),
            name: "cube".into(),
            components: vec![InternalComponent::Render(render)],
        };
        entity.transform_mut().unwrap().position.x = 2.0;
        assert_eq!(entity.renders().next().unwrap().transform.position.x, 2.0);
        assert_eq!(entity.scripts().count(), 0);
    }
}
