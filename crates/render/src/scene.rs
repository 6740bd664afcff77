use std::collections::BTreeMap;
use std::fmt;

use glam::{Mat4, Vec3};
use gravy_assets::{Geometry, Texture};
use serde::{Deserialize, Serialize};

use crate::renderer::RenderError;

/// Handle to an object in a [`SceneGraph`]. Never reused within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Phong-style surface: a base color modulated by a texture map.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub color: Vec3,
    pub map: Texture,
}

impl Material {
    pub fn phong(map: Texture) -> Self {
        Self {
            color: Vec3::ONE,
            map,
        }
    }
}

/// GPU-instanced draw batch: one geometry and material drawn `draw_count`
/// times, each with its own transform.
///
/// `version` increments whenever the instance data is flagged dirty; a
/// renderer uploads the buffer when it sees a version it has not uploaded.
#[derive(Debug, Clone)]
pub struct InstancedMesh {
    pub geometry: Geometry,
    pub material: Material,
    transforms: Vec<Mat4>,
    draw_count: usize,
    version: u64,
}

impl InstancedMesh {
    pub fn new(geometry: Geometry, material: Material, capacity: usize) -> Self {
        Self {
            geometry,
            material,
            transforms: vec![Mat4::IDENTITY; capacity],
            draw_count: 0,
            version: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.transforms.len()
    }

    pub fn draw_count(&self) -> usize {
        self.draw_count
    }

    /// Number of instances drawn. Clamped to capacity.
    pub fn set_draw_count(&mut self, count: usize) {
        self.draw_count = count.min(self.capacity());
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn transform_at(&self, index: usize) -> Option<Mat4> {
        self.transforms.get(index).copied()
    }

    pub fn set_transform_at(&mut self, index: usize, transform: Mat4) -> Result<(), RenderError> {
        let capacity = self.capacity();
        let slot = self
            .transforms
            .get_mut(index)
            .ok_or(RenderError::SlotOutOfRange { index, capacity })?;
        *slot = transform;
        Ok(())
    }

    pub fn mark_needs_update(&mut self) {
        self.version += 1;
    }

    /// A copy with a different capacity. Geometry, material and existing
    /// transforms carry over; new slots start at identity.
    pub fn resized(&self, capacity: usize) -> Self {
        let mut transforms = vec![Mat4::IDENTITY; capacity];
        let kept = capacity.min(self.transforms.len());
        transforms[..kept].copy_from_slice(&self.transforms[..kept]);
        Self {
            geometry: self.geometry.clone(),
            material: self.material.clone(),
            transforms,
            draw_count: self.draw_count.min(capacity),
            version: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Ambient { color: Vec3, intensity: f32 },
    Directional { color: Vec3, intensity: f32, position: Vec3 },
}

/// Scene lights added at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub ambient_color: Vec3,
    pub directional_color: Vec3,
    pub directional_intensity: f32,
    pub directional_position: Vec3,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            // 0x404040
            ambient_color: Vec3::splat(64.0 / 255.0),
            directional_color: Vec3::ONE,
            directional_intensity: 0.5,
            directional_position: Vec3::ONE,
        }
    }
}

impl LightingConfig {
    pub fn lights(&self) -> [Light; 2] {
        [
            Light::Ambient {
                color: self.ambient_color,
                intensity: 1.0,
            },
            Light::Directional {
                color: self.directional_color,
                intensity: self.directional_intensity,
                position: self.directional_position,
            },
        ]
    }
}

#[derive(Debug, Clone)]
pub enum SceneObject {
    Instanced(InstancedMesh),
    Light(Light),
}

/// Flat scene graph. Objects are drawn in id (insertion) order.
#[derive(Debug, Default)]
pub struct SceneGraph {
    objects: BTreeMap<ObjectId, SceneObject>,
    next_id: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: SceneObject) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.insert(id, object);
        id
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        self.objects.remove(&id)
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn instanced(&self, id: ObjectId) -> Option<&InstancedMesh> {
        match self.objects.get(&id) {
            Some(SceneObject::Instanced(mesh)) => Some(mesh),
            _ => None,
        }
    }

    pub fn instanced_mut(&mut self, id: ObjectId) -> Option<&mut InstancedMesh> {
        match self.objects.get_mut(&id) {
            Some(SceneObject::Instanced(mesh)) => Some(mesh),
            _ => None,
        }
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &SceneObject)> {
        self.objects.iter().map(|(id, obj)| (*id, obj))
    }

    pub fn meshes(&self) -> impl Iterator<Item = (ObjectId, &InstancedMesh)> {
        self.objects().filter_map(|(id, obj)| match obj {
            SceneObject::Instanced(mesh) => Some((id, mesh)),
            SceneObject::Light(_) => None,
        })
    }

    pub fn lights(&self) -> impl Iterator<Item = &Light> {
        self.objects.values().filter_map(|obj| match obj {
            SceneObject::Light(light) => Some(light),
            SceneObject::Instanced(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh(capacity: usize) -> InstancedMesh {
        InstancedMesh::new(
            Geometry::unit_cube("cube.obj"),
            Material::phong(Texture::new("tex.png", vec![0; 4])),
            capacity,
        )
    }

    #[test]
    fn set_transform_in_and_out_of_range() {
        let mut m = mesh(2);
        let t = Mat4::from_translation(Vec3::X);
        m.set_transform_at(1, t).unwrap();
        assert_eq!(m.transform_at(1), Some(t));
        let err = m.set_transform_at(2, t).unwrap_err();
        assert!(matches!(err, RenderError::SlotOutOfRange { index: 2, capacity: 2 }));
    }

    #[test]
    fn resize_keeps_prefix() {
        let mut m = mesh(3);
        m.set_transform_at(0, Mat4::from_translation(Vec3::Y)).unwrap();
        m.set_draw_count(3);
        let grown = m.resized(4);
        assert_eq!(grown.capacity(), 4);
        assert_eq!(grown.transform_at(0), m.transform_at(0));
        assert_eq!(grown.transform_at(3), Some(Mat4::IDENTITY));
        let shrunk = m.resized(2);
        assert_eq!(shrunk.draw_count(), 2);
    }

    #[test]
    fn dirty_flag_bumps_version() {
        let mut m = mesh(1);
        assert_eq!(m.version(), 0);
        m.mark_needs_update();
        m.mark_needs_update();
        assert_eq!(m.version(), 2);
    }

    #[test]
    fn scene_ids_not_reused() {
        let mut scene = SceneGraph::new();
        let a = scene.add(SceneObject::Instanced(mesh(1)));
        scene.remove(a);
        let b = scene.add(SceneObject::Instanced(mesh(1)));
        assert_ne!(a, b);
        assert!(scene.instanced(a).is_none());
        assert!(scene.instanced_mut(b).is_some());
    }

    #[test]
    fn default_lighting() {
        let mut scene = SceneGraph::new();
        for light in LightingConfig::default().lights() {
            scene.add(SceneObject::Light(light));
        }
        assert_eq!(scene.lights().count(), 2);
        assert_eq!(scene.meshes().count(), 0);
    }
}
