//! Rendering Adapter: scene graph, GPU-instanced draw batches, the resource
//! pool that deduplicates them, and a renderer-agnostic interface.
//!
//! # Invariants
//! - At most one live instanced batch per (geometry, texture) key.
//! - A pool entry's registered count never exceeds its capacity.
//! - Replaced batches are removed from the scene before the new one is added.
//!
//! # Workaround
//! Ships a headless renderer in place of a GPU backend. The `Renderer` trait is
//! stable; a GPU implementation can replace it without changing consumers.

mod camera;
mod pool;
mod renderer;
mod scene;

pub use camera::{CameraConfig, OrbitControls, PerspectiveCamera};
pub use pool::{
    Delta, LoadedAssets, PoolEntry, PoolError, PoolKey, Resize, ResourcePool, SlotRef,
    grown_capacity, shrunk_capacity,
};
pub use renderer::{FrameStats, HeadlessRenderer, RenderError, Renderer};
pub use scene::{InstancedMesh, Light, LightingConfig, Material, ObjectId, SceneGraph, SceneObject};

pub fn crate_info() -> &'static str {
    "gravy-render v0.1.0"
}
