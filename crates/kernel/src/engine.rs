use std::cell::{Cell, RefCell};
use std::rc::Rc;

use gravy_assets::AssetLoader;
use gravy_common::{EntityId, Size};
use gravy_ecs::Entity;
use gravy_input::{DispatchOutcome, Key};
use gravy_render::{PoolError, Renderer};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{ConfigError, EngineConfig};
use crate::inject::{InjectionReport, inject_entities};
use crate::resolve::{Generation, ResolveContext, SharedState};
use crate::scheduler::{Loops, render_tick, simulation_tick};
use crate::state::{RuntimeState, RuntimeSummary, Viewport};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine is not initialized")]
    NotInitialized,
    #[error("engine is already initialized")]
    AlreadyInitialized,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("resource pool: {0}")]
    Pool(#[from] PoolError),
}

/// Engine control surface. Owns the runtime state and the scheduler loops.
///
/// Async entry points (`initialize`, `inject`, `start_engine`) spawn local
/// tasks and must be called from within a `tokio::task::LocalSet`.
pub struct Engine {
    state: SharedState,
    generation: Rc<Cell<u64>>,
    loader: Rc<dyn AssetLoader>,
    config: EngineConfig,
    loops: Option<Loops>,
}

impl Engine {
    pub fn new(loader: Rc<dyn AssetLoader>, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            state: Rc::new(RefCell::new(RuntimeState::new(config.framerate_window))),
            generation: Rc::new(Cell::new(0)),
            loader,
            config,
            loops: None,
        })
    }

    /// Shared handle to the runtime state.
    pub fn state(&self) -> SharedState {
        Rc::clone(&self.state)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.borrow().is_initialized()
    }

    pub fn is_running(&self) -> bool {
        self.loops.is_some()
    }

    /// Build the viewport and start injecting `entities` in the background.
    pub fn initialize(
        &mut self,
        size: Size,
        entities: Vec<Entity<RuntimeState>>,
        renderer: Box<dyn Renderer>,
    ) -> Result<JoinHandle<InjectionReport>, EngineError> {
        let ctx = self.setup(size, renderer)?;
        Ok(tokio::task::spawn_local(inject_entities(ctx, entities)))
    }

    /// Like [`Engine::initialize`], but waits for injection to finish.
    pub async fn initialize_and_wait(
        &mut self,
        size: Size,
        entities: Vec<Entity<RuntimeState>>,
        renderer: Box<dyn Renderer>,
    ) -> Result<InjectionReport, EngineError> {
        let ctx = self.setup(size, renderer)?;
        Ok(inject_entities(ctx, entities).await)
    }

    /// Inject more entities into the running runtime, in the background.
    pub fn inject(
        &self,
        entities: Vec<Entity<RuntimeState>>,
    ) -> Result<JoinHandle<InjectionReport>, EngineError> {
        let ctx = self.resolve_context()?;
        Ok(tokio::task::spawn_local(inject_entities(ctx, entities)))
    }

    pub async fn inject_and_wait(
        &self,
        entities: Vec<Entity<RuntimeState>>,
    ) -> Result<InjectionReport, EngineError> {
        let ctx = self.resolve_context()?;
        Ok(inject_entities(ctx, entities).await)
    }

    /// Start both scheduler loops. Starting a running engine does nothing.
    pub fn start_engine(&mut self) -> Result<(), EngineError> {
        if !self.is_initialized() {
            return Err(EngineError::NotInitialized);
        }
        if self.loops.is_some() {
            tracing::warn!("engine already running");
            return Ok(());
        }
        self.loops = Some(Loops::spawn(
            self.state(),
            self.config.render_interval,
            self.config.simulation_interval,
        ));
        tracing::info!(
            render_interval = ?self.config.render_interval,
            simulation_interval = ?self.config.simulation_interval,
            "engine started"
        );
        Ok(())
    }

    /// Cancel both loops and reset the runtime. In-flight resolutions belong to
    /// the previous generation and are discarded when they complete.
    pub fn stop_engine(&mut self) {
        if let Some(loops) = self.loops.take() {
            loops.abort();
        }
        self.generation.set(self.generation.get() + 1);
        let mut state = self.state.borrow_mut();
        let summary = state.summary();
        state.reset();
        tracing::info!(%summary, "engine stopped");
    }

    pub fn key_down(&self, key: impl Into<Key>) -> Option<DispatchOutcome> {
        let mut state = self.state.borrow_mut();
        if !state.is_initialized() {
            return None;
        }
        gravy_input::key_down(&mut *state, key)
    }

    pub fn key_up(&self, key: impl Into<Key>) -> Option<DispatchOutcome> {
        let mut state = self.state.borrow_mut();
        if !state.is_initialized() {
            return None;
        }
        gravy_input::key_up(&mut *state, key)
    }

    /// Remove a live entity: release its pool slots, run its destroy scripts
    /// and drop its handlers. Returns false if no such entity is live.
    ///
    /// Every slot is released even if one release fails; the first failure is
    /// returned after the entity is fully removed.
    pub fn remove_entity(&self, id: EntityId) -> Result<bool, EngineError> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if !state.is_initialized() {
            return Err(EngineError::NotInitialized);
        }
        let Some(entity) = state.entities.remove(id) else {
            return Ok(false);
        };

        let mut failure: Option<PoolError> = None;
        if let RuntimeState {
            pool,
            viewport: Some(viewport),
            ..
        } = &mut *state
        {
            for render in entity.renders() {
                match pool.unregister(&mut viewport.scene, &render.key, render.component) {
                    Ok(Some(resize)) => {
                        tracing::debug!(key = %render.key, ?resize, "pool entry resized on removal")
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::error!(entity = %id, key = %render.key, error = %err, "releasing pool slot failed");
                        failure.get_or_insert(err);
                    }
                }
            }
        }

        for script in entity.scripts() {
            script.destroy(state);
        }
        state.handlers_mut().remove_entity(id);
        tracing::debug!(entity = %id, name = %entity.name, "entity removed");

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(true),
        }
    }

    /// Run one render tick now.
    pub fn render_tick(&self) {
        render_tick(&self.state, Instant::now());
    }

    /// Run one simulation tick now.
    pub fn simulation_tick(&self) {
        simulation_tick(&self.state, Instant::now());
    }

    pub fn summary(&self) -> RuntimeSummary {
        self.state.borrow().summary()
    }

    fn setup(&mut self, size: Size, renderer: Box<dyn Renderer>) -> Result<ResolveContext, EngineError> {
        if self.is_initialized() {
            return Err(EngineError::AlreadyInitialized);
        }
        self.generation.set(self.generation.get() + 1);
        let viewport = Viewport::new(size, renderer, &self.config);
        self.state.borrow_mut().initialize(viewport);
        tracing::info!(
            width = size.width,
            height = size.height,
            generation = self.generation.get(),
            "engine initialized"
        );
        self.resolve_context()
    }

    fn resolve_context(&self) -> Result<ResolveContext, EngineError> {
        if !self.is_initialized() {
            return Err(EngineError::NotInitialized);
        }
        Ok(ResolveContext {
            state: self.state(),
            loader: Rc::clone(&self.loader),
            generation: Generation::current(&self.generation),
        })
    }
}
