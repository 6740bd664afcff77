use std::fmt;
use std::time::Duration;

use gravy_common::{EntityId, Size, Transform};
use gravy_ecs::EntityStore;
use gravy_input::{DispatchContext, HandlerRegistry, InputState};
use gravy_render::{
    FrameStats, OrbitControls, PerspectiveCamera, PoolError, Renderer, ResourcePool, SceneGraph,
    SceneObject,
};
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::framerate::FrameRateCounter;

/// Rendering handles, present only while the runtime is initialized.
pub struct Viewport {
    pub size: Size,
    pub camera: PerspectiveCamera,
    pub controls: OrbitControls,
    pub scene: SceneGraph,
    pub renderer: Box<dyn Renderer>,
}

impl Viewport {
    /// Camera and controls from `config`, plus the configured lights.
    pub fn new(size: Size, renderer: Box<dyn Renderer>, config: &EngineConfig) -> Self {
        let camera = PerspectiveCamera::new(&config.camera, size.aspect());
        let controls = OrbitControls::new(&camera);
        let mut scene = SceneGraph::new();
        for light in config.lighting.lights() {
            scene.add(SceneObject::Light(light));
        }
        let mut renderer = renderer;
        renderer.set_size(size);
        Self {
            size,
            camera,
            controls,
            scene,
            renderer,
        }
    }
}

/// Per-frame timing.
#[derive(Debug, Clone, Default)]
pub struct Meta {
    /// Time between the last two simulation ticks.
    pub delta_time: Duration,
    pub previous_tick: Option<Instant>,
    pub ticks: u64,
    pub frames: u64,
    pub last_frame: FrameStats,
}

/// The runtime state every subsystem reads and mutates.
///
/// Uninitialized (no viewport, everything empty) until the engine initializes
/// it, and back to uninitialized when the engine stops.
pub struct RuntimeState {
    initialized: bool,
    pub viewport: Option<Viewport>,
    pub meta: Meta,
    pub framerate: FrameRateCounter,
    pub entities: EntityStore<RuntimeState>,
    pub pool: ResourcePool,
    input: InputState,
    handlers: HandlerRegistry<RuntimeState>,
}

impl RuntimeState {
    pub fn new(framerate_window: Duration) -> Self {
        Self {
            initialized: false,
            viewport: None,
            meta: Meta::default(),
            framerate: FrameRateCounter::new(framerate_window),
            entities: EntityStore::new(),
            pool: ResourcePool::new(),
            input: InputState::new(),
            handlers: HandlerRegistry::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn initialize(&mut self, viewport: Viewport) {
        self.reset();
        self.viewport = Some(viewport);
        self.initialized = true;
    }

    /// Full reset: clear the scene, dispose the renderer, empty every pool,
    /// registry and entity list.
    pub(crate) fn reset(&mut self) {
        if let Some(mut viewport) = self.viewport.take() {
            viewport.scene.clear();
            viewport.renderer.dispose();
        }
        self.initialized = false;
        self.meta = Meta::default();
        self.framerate.reset();
        self.entities.clear();
        self.pool.clear();
        self.input.clear();
        self.handlers.clear();
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry<RuntimeState> {
        &mut self.handlers
    }

    /// Transform of an entity's first render component.
    pub fn transform_mut(&mut self, entity: EntityId) -> Option<&mut Transform> {
        self.entities.get_mut(entity)?.transform_mut()
    }

    /// Write every live render transform into its pool slot and flag the
    /// batches dirty. Stale slots are re-resolved on the way.
    pub fn write_transforms(&mut self) -> Result<(), PoolError> {
        let Self {
            entities,
            pool,
            viewport,
            ..
        } = self;
        let Some(viewport) = viewport.as_mut() else {
            return Ok(());
        };
        for render in entities.renders_mut() {
            pool.write_transform(
                &mut viewport.scene,
                &render.key,
                render.component,
                &mut render.slot,
                render.transform.matrix(),
            )?;
        }
        Ok(())
    }

    pub fn summary(&self) -> RuntimeSummary {
        RuntimeSummary {
            initialized: self.initialized,
            entities: self.entities.len(),
            pool_entries: self.pool.len(),
            instances: self.pool.total_registered(),
            handlers: self.handlers.len(),
            scripts: self.entities.scripts().len(),
            frames: self.meta.frames,
            ticks: self.meta.ticks,
            fps: self.framerate.fps(),
        }
    }
}

impl DispatchContext for RuntimeState {
    fn input(&self) -> &InputState {
        &self.input
    }

    fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    fn handlers(&self) -> &HandlerRegistry<Self> {
        &self.handlers
    }

    fn delta_time(&self) -> Duration {
        self.meta.delta_time
    }
}

/// Snapshot of the runtime for logs and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSummary {
    pub initialized: bool,
    pub entities: usize,
    pub pool_entries: usize,
    pub instances: usize,
    pub handlers: usize,
    pub scripts: usize,
    pub frames: u64,
    pub ticks: u64,
    pub fps: u32,
}

impl fmt::Display for RuntimeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Runtime: initialized={} entities={} pools={} instances={} handlers={} scripts={} frames={} ticks={} fps={}",
            self.initialized,
            self.entities,
            self.pool_entries,
            self.instances,
            self.handlers,
            self.scripts,
            self.frames,
            self.ticks,
            self.fps
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gravy_render::HeadlessRenderer;

    fn viewport() -> Viewport {
        Viewport::new(
            Size::new(800, 600),
            Box::new(HeadlessRenderer::default()),
            &EngineConfig::default(),
        )
    }

    #[test]
    fn starts_uninitialized() {
        let state = RuntimeState::new(Duration::from_secs(1));
        assert!(!state.is_initialized());
        assert!(state.viewport.is_none());
        assert_eq!(state.summary().entities, 0);
    }

    #[test]
    fn viewport_adds_lights_and_aspect() {
        let vp = viewport();
        assert_eq!(vp.scene.lights().count(), 2);
        assert!((vp.camera.aspect - 800.0 / 600.0).abs() < 1e-6);
    }

    #[test]
    fn reset_returns_to_uninitialized() {
        let mut state = RuntimeState::new(Duration::from_secs(1));
        state.initialize(viewport());
        state.meta.ticks = 5;
        assert!(state.is_initialized());
        state.reset();
        assert!(!state.is_initialized());
        assert!(state.viewport.is_none());
        assert_eq!(state.meta.ticks, 0);
    }

    #[test]
    fn summary_display() {
        let state = RuntimeState::new(Duration::from_secs(1));
        let text = state.summary().to_string();
        assert!(text.contains("initialized=false"));
        assert!(text.contains("entities=0"));
    }
}
