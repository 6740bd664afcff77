//! Component resolvers: declarative component in, live component out.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use gravy_assets::{AssetError, AssetLoader};
use gravy_common::{EntityId, Transform};
use gravy_ecs::{
    Component, InputComponent, InternalComponent, InternalInput, InternalRender, InternalScript,
    RenderComponent, ScriptComponent,
};
use gravy_render::{LoadedAssets, PoolError};

use crate::state::RuntimeState;

pub type SharedState = Rc<RefCell<RuntimeState>>;

/// Initialization generation a piece of async work was started in.
///
/// The engine bumps its counter on every initialize and stop, so work that
/// outlives its generation is discarded instead of mutating fresh state.
#[derive(Debug, Clone)]
pub struct Generation {
    counter: Rc<Cell<u64>>,
    value: u64,
}

impl Generation {
    pub(crate) fn current(counter: &Rc<Cell<u64>>) -> Self {
        Self {
            counter: Rc::clone(counter),
            value: counter.get(),
        }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn is_current(&self) -> bool {
        self.counter.get() == self.value
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("asset load failed: {0}")]
    Asset(#[from] AssetError),
    #[error("resource pool: {0}")]
    Pool(#[from] PoolError),
    #[error("runtime has no scene to create pool entries in")]
    NoScene,
    /// The engine stopped or reinitialized while this work was in flight.
    #[error("generation {0} is no longer current")]
    Stale(u64),
}

impl ResolveError {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

/// Everything resolution needs: the shared state, a loader and the
/// generation the work belongs to.
#[derive(Clone)]
pub struct ResolveContext {
    pub state: SharedState,
    pub loader: Rc<dyn AssetLoader>,
    pub generation: Generation,
}

impl ResolveContext {
    /// Fail with `Stale` unless this work's generation is current and the
    /// runtime is initialized.
    pub fn check_current(&self) -> Result<(), ResolveError> {
        if self.generation.is_current() && self.state.borrow().is_initialized() {
            Ok(())
        } else {
            Err(ResolveError::Stale(self.generation.value()))
        }
    }
}

pub async fn resolve_component(
    ctx: &ResolveContext,
    entity: EntityId,
    component: &Component<RuntimeState>,
) -> Result<InternalComponent<RuntimeState>, ResolveError> {
    match component {
        Component::Input(input) => resolve_input(ctx, entity, input).map(InternalComponent::Input),
        Component::Script(script) => {
            resolve_script(ctx, entity, script).map(|s| InternalComponent::Script(Rc::new(s)))
        }
        Component::Render(render) => resolve_render(ctx, render)
            .await
            .map(InternalComponent::Render),
    }
}

/// Load the batch assets if the key has no pool entry yet, then register the
/// component. Loads are not coalesced: concurrent first registrations of one
/// key each load, and the pool keeps whichever entry lands first.
pub async fn resolve_render(
    ctx: &ResolveContext,
    render: &RenderComponent,
) -> Result<InternalRender, ResolveError> {
    let key = render.key();
    ctx.check_current()?;

    if !ctx.state.borrow().pool.contains(&key) {
        let (geometry, texture) = futures::try_join!(
            ctx.loader.load_geometry(&render.geometry_path),
            ctx.loader.load_texture(&render.texture_path),
        )?;
        ctx.check_current()?;
        let mut state = ctx.state.borrow_mut();
        let RuntimeState { pool, viewport, .. } = &mut *state;
        let viewport = viewport.as_mut().ok_or(ResolveError::NoScene)?;
        pool.insert_entry(&mut viewport.scene, &key, LoadedAssets { geometry, texture });
    }

    let mut state = ctx.state.borrow_mut();
    let RuntimeState { pool, viewport, .. } = &mut *state;
    let viewport = viewport.as_mut().ok_or(ResolveError::NoScene)?;
    let slot = pool.register(&mut viewport.scene, &key, render.id)?;
    Ok(InternalRender {
        component: render.id,
        kind: render.kind,
        key,
        slot,
        transform: Transform::default(),
    })
}

/// Bind the script to its entity. Runs it once, synchronously, when the run
/// policy asks for `initialize`.
pub fn resolve_script(
    ctx: &ResolveContext,
    entity: EntityId,
    script: &ScriptComponent<RuntimeState>,
) -> Result<InternalScript<RuntimeState>, ResolveError> {
    ctx.check_current()?;
    let internal = InternalScript::new(script.id, entity, Rc::clone(&script.script), script.run);
    internal.initialize(&mut ctx.state.borrow_mut());
    Ok(internal)
}

/// Bind every handler to its entity. Other handler fields are unchanged.
pub fn resolve_input(
    ctx: &ResolveContext,
    entity: EntityId,
    input: &InputComponent<RuntimeState>,
) -> Result<InternalInput<RuntimeState>, ResolveError> {
    ctx.check_current()?;
    Ok(InternalInput {
        component: input.id,
        handlers: input.handlers.iter().map(|h| Rc::new(h.bind(entity))).collect(),
    })
}

/// Undo the side effects of already-resolved components of an entity that
/// will not be admitted.
pub(crate) fn rollback(state: &mut RuntimeState, resolved: &[InternalComponent<RuntimeState>]) {
    let RuntimeState { pool, viewport, .. } = state;
    let Some(viewport) = viewport.as_mut() else {
        return;
    };
    for component in resolved {
        if let InternalComponent::Render(render) = component {
            if let Err(err) = pool.unregister(&mut viewport.scene, &render.key, render.component) {
                tracing::error!(error = %err, key = %render.key, "rollback of pool registration failed");
            }
        }
    }
}
