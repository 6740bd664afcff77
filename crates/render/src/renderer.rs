use std::collections::BTreeMap;
use std::fmt::Write as _;

use gravy_common::Size;

use crate::camera::PerspectiveCamera;
use crate::scene::{ObjectId, SceneGraph};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("renderer used after dispose")]
    Disposed,
    #[error("instance slot {index} out of range (capacity {capacity})")]
    SlotOutOfRange { index: usize, capacity: usize },
}

/// What one `render` call drew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub batches: usize,
    pub instances: usize,
    /// Batches whose instance data was uploaded this frame.
    pub uploads: usize,
}

/// Renderer-agnostic interface.
///
/// Renderers read the scene; they never mutate it. Instance uploads are
/// driven by each batch's version counter.
pub trait Renderer {
    fn set_size(&mut self, size: Size);

    fn render(
        &mut self,
        scene: &SceneGraph,
        camera: &PerspectiveCamera,
    ) -> Result<FrameStats, RenderError>;

    /// Release backend resources. Rendering after this fails.
    fn dispose(&mut self);
}

/// Renderer with no GPU behind it. Tracks what a GPU backend would draw and
/// upload, for the CLI and tests.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    size: Size,
    frames: u64,
    uploaded: BTreeMap<ObjectId, u64>,
    last: FrameStats,
    disposed: bool,
}

impl HeadlessRenderer {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_frame(&self) -> FrameStats {
        self.last
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Last uploaded version of a batch, if it was ever drawn.
    pub fn uploaded_version(&self, id: ObjectId) -> Option<u64> {
        self.uploaded.get(&id).copied()
    }

    /// Human-readable dump of what a frame of `scene` contains.
    pub fn describe(scene: &SceneGraph, camera: &PerspectiveCamera) -> String {
        let mut out = String::new();
        let p = camera.position;
        let _ = writeln!(
            out,
            "camera: pos=({:.2}, {:.2}, {:.2}) fov={:.0}",
            p.x,
            p.y,
            p.z,
            camera.fov.to_degrees()
        );
        let _ = writeln!(out, "lights: {}", scene.lights().count());
        for (id, mesh) in scene.meshes() {
            let _ = writeln!(
                out,
                "  [{id}] {} + {} draw={}/{} v{}",
                mesh.geometry.path,
                mesh.material.map.path,
                mesh.draw_count(),
                mesh.capacity(),
                mesh.version()
            );
        }
        out
    }
}

impl Renderer for HeadlessRenderer {
    fn set_size(&mut self, size: Size) {
        self.size = size;
    }

    fn render(
        &mut self,
        scene: &SceneGraph,
        _camera: &PerspectiveCamera,
    ) -> Result<FrameStats, RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        let mut stats = FrameStats::default();
        for (id, mesh) in scene.meshes() {
            stats.batches += 1;
            stats.instances += mesh.draw_count();
            let version = mesh.version();
            if self.uploaded.insert(id, version) != Some(version) {
                stats.uploads += 1;
            }
        }
        // Batches removed from the scene no longer hold buffers.
        self.uploaded.retain(|id, _| scene.contains(*id));
        self.frames += 1;
        self.last = stats;
        tracing::trace!(frame = self.frames, ?stats, "frame rendered");
        Ok(stats)
    }

    fn dispose(&mut self) {
        self.uploaded.clear();
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{InstancedMesh, Material, SceneObject};
    use gravy_assets::{Geometry, Texture};

    fn scene_with_batch(draw: usize) -> (SceneGraph, ObjectId) {
        let mut scene = SceneGraph::new();
        let mut mesh = InstancedMesh::new(
            Geometry::unit_cube("cube.obj"),
            Material::phong(Texture::new("ian.jpg", vec![])),
            4,
        );
        mesh.set_draw_count(draw);
        let id = scene.add(SceneObject::Instanced(mesh));
        (scene, id)
    }

    #[test]
    fn uploads_only_on_new_version() {
        let (mut scene, id) = scene_with_batch(3);
        let camera = PerspectiveCamera::default();
        let mut renderer = HeadlessRenderer::new(Size::new(800, 600));

        let first = renderer.render(&scene, &camera).unwrap();
        assert_eq!(first, FrameStats { batches: 1, instances: 3, uploads: 1 });
        let second = renderer.render(&scene, &camera).unwrap();
        assert_eq!(second.uploads, 0);

        scene.instanced_mut(id).unwrap().mark_needs_update();
        let third = renderer.render(&scene, &camera).unwrap();
        assert_eq!(third.uploads, 1);
        assert_eq!(renderer.uploaded_version(id), Some(1));
        assert_eq!(renderer.frames(), 3);
    }

    #[test]
    fn removed_batches_are_forgotten() {
        let (mut scene, id) = scene_with_batch(1);
        let camera = PerspectiveCamera::default();
        let mut renderer = HeadlessRenderer::default();
        renderer.render(&scene, &camera).unwrap();
        scene.remove(id);
        renderer.render(&scene, &camera).unwrap();
        assert_eq!(renderer.uploaded_version(id), None);
    }

    #[test]
    fn render_after_dispose_fails() {
        let (scene, _) = scene_with_batch(1);
        let mut renderer = HeadlessRenderer::default();
        renderer.dispose();
        let err = renderer
            .render(&scene, &PerspectiveCamera::default())
            .unwrap_err();
        assert_eq!(err, RenderError::Disposed);
    }

    #[test]
    fn describe_lists_batches() {
        let (scene, _) = scene_with_batch(2);
        let text = HeadlessRenderer::describe(&scene, &PerspectiveCamera::default());
        assert!(text.contains("cube.obj + ian.jpg draw=2/4"));
        assert!(text.contains("fov=75"));
    }
}
