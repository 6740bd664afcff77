//! Resource pool: one instanced batch per (geometry, texture) key.
//!
//! Capacity grows to `ceil(c * 1.2)` when a registration arrives at a full
//! entry and shrinks to `ceil(c * 0.8)` once slack exceeds 20% of the
//! registered count. Every resize replaces the batch in the scene.

use std::collections::BTreeMap;
use std::fmt;

use glam::Mat4;
use gravy_assets::{Geometry, Texture};
use gravy_common::ComponentId;

use crate::renderer::RenderError;
use crate::scene::{InstancedMesh, Material, ObjectId, SceneGraph, SceneObject};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    pub geometry_path: String,
    pub texture_path: String,
}

impl PoolKey {
    pub fn new(geometry_path: impl Into<String>, texture_path: impl Into<String>) -> Self {
        Self {
            geometry_path: geometry_path.into(),
            texture_path: texture_path.into(),
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.geometry_path, self.texture_path)
    }
}

/// Assets needed to create a pool entry.
#[derive(Debug, Clone)]
pub struct LoadedAssets {
    pub geometry: Geometry,
    pub texture: Texture,
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no matching pool entry for {0}")]
    NoMatchingEntry(PoolKey),
    #[error("component {component} is not registered in pool entry {key}")]
    NotRegistered { key: PoolKey, component: ComponentId },
    #[error("pool batch {0} is missing from the scene")]
    MissingBatch(ObjectId),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// A registration change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resize {
    Grew { from: usize, to: usize },
    Shrunk { from: usize, to: usize },
}

/// Slot of a component inside its entry's instance buffer.
///
/// Valid while `epoch` matches the entry's epoch. Replacing or compacting an
/// entry bumps the epoch; stale refs are re-resolved by component id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    pub index: usize,
    pub epoch: u64,
}

pub fn grown_capacity(capacity: usize) -> usize {
    (capacity * 6).div_ceil(5)
}

pub fn shrunk_capacity(capacity: usize) -> usize {
    (capacity * 4).div_ceil(5)
}

#[derive(Debug, Clone)]
pub struct PoolEntry {
    key: PoolKey,
    object: ObjectId,
    capacity: usize,
    occupants: Vec<ComponentId>,
    epoch: u64,
}

impl PoolEntry {
    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    /// The live batch in the scene.
    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn registered(&self) -> usize {
        self.occupants.len()
    }

    /// Registered components in slot order.
    pub fn occupants(&self) -> &[ComponentId] {
        &self.occupants
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn slot_of(&self, component: ComponentId) -> Option<SlotRef> {
        self.occupants
            .iter()
            .position(|c| *c == component)
            .map(|index| SlotRef {
                index,
                epoch: self.epoch,
            })
    }

    fn has_slack(&self) -> bool {
        self.capacity * 5 > self.registered() * 6
    }
}

#[derive(Debug, Default)]
pub struct ResourcePool {
    entries: BTreeMap<PoolKey, PoolEntry>,
    next_epoch: u64,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the entry for `key` from freshly loaded assets, with capacity 1
    /// and nothing registered. Returns false and drops `assets` when the
    /// entry already exists, so concurrent loads of one key stay harmless.
    pub fn insert_entry(&mut self, scene: &mut SceneGraph, key: &PoolKey, assets: LoadedAssets) -> bool {
        if self.entries.contains_key(key) {
            tracing::trace!(%key, "pool entry already present, dropping duplicate load");
            return false;
        }
        let material = Material::phong(assets.texture);
        let mesh = InstancedMesh::new(assets.geometry, material, 1);
        let object = scene.add(SceneObject::Instanced(mesh));
        let epoch = self.bump_epoch();
        self.entries.insert(
            key.clone(),
            PoolEntry {
                key: key.clone(),
                object,
                capacity: 1,
                occupants: Vec::new(),
                epoch,
            },
        );
        tracing::debug!(%key, %object, "pool entry created");
        true
    }

    /// Register `component` in `key`'s entry and return its slot, growing a
    /// full entry first. Registering a component twice returns its existing
    /// slot.
    pub fn register(
        &mut self,
        scene: &mut SceneGraph,
        key: &PoolKey,
        component: ComponentId,
    ) -> Result<SlotRef, PoolError> {
        if let Some(slot) = self.entry_mut(key)?.slot_of(component) {
            return Ok(slot);
        }
        self.ensure_capacity(scene, key, Delta::Increment)?;

        let entry = self.entry_mut(key)?;
        entry.occupants.push(component);
        let slot = SlotRef {
            index: entry.occupants.len() - 1,
            epoch: entry.epoch,
        };
        let (object, registered) = (entry.object, entry.registered());
        let mesh = scene
            .instanced_mut(object)
            .ok_or(PoolError::MissingBatch(object))?;
        mesh.set_draw_count(registered);
        mesh.mark_needs_update();
        Ok(slot)
    }

    /// Remove `component` from `key`'s entry, compacting slots and shrinking
    /// the batch if it has too much slack.
    pub fn unregister(
        &mut self,
        scene: &mut SceneGraph,
        key: &PoolKey,
        component: ComponentId,
    ) -> Result<Option<Resize>, PoolError> {
        let entry = self.entry_mut(key)?;
        let index = entry
            .occupants
            .iter()
            .position(|c| *c == component)
            .ok_or_else(|| PoolError::NotRegistered {
                key: key.clone(),
                component,
            })?;
        let last = entry.occupants.len() - 1;
        entry.occupants.swap_remove(index);
        let (object, registered) = (entry.object, entry.registered());
        let mesh = scene
            .instanced_mut(object)
            .ok_or(PoolError::MissingBatch(object))?;
        if index != last {
            // The last occupant moved into the freed slot.
            let moved = mesh.transform_at(last).unwrap_or(Mat4::IDENTITY);
            mesh.set_transform_at(index, moved)?;
        }
        mesh.set_draw_count(registered);
        mesh.mark_needs_update();
        if index != last {
            let epoch = self.bump_epoch();
            self.entry_mut(key)?.epoch = epoch;
        }

        self.ensure_capacity(scene, key, Delta::Decrement)
    }

    /// Resize `key`'s entry for a registration change.
    ///
    /// `Increment` makes room for one more registration, growing a full entry.
    /// `Decrement` is applied after a registration left and shrinks an entry
    /// with more than 20% slack. The new capacity never drops below the
    /// registered count or 1.
    pub fn ensure_capacity(
        &mut self,
        scene: &mut SceneGraph,
        key: &PoolKey,
        delta: Delta,
    ) -> Result<Option<Resize>, PoolError> {
        let entry = self.entry(key).ok_or_else(|| PoolError::NoMatchingEntry(key.clone()))?;
        let from = entry.capacity;
        let registered = entry.registered();
        let to = match delta {
            Delta::Increment if registered >= from => grown_capacity(from).max(registered + 1),
            Delta::Decrement if entry.has_slack() => {
                shrunk_capacity(from).max(registered).max(1)
            }
            _ => return Ok(None),
        };
        if to == from {
            return Ok(None);
        }

        self.replace(scene, key, to)?;
        let resize = if to > from {
            Resize::Grew { from, to }
        } else {
            Resize::Shrunk { from, to }
        };
        tracing::debug!(%key, from, to, registered, "pool entry resized");
        Ok(Some(resize))
    }

    /// Current slot of `component`, re-resolving `slot` if its epoch is stale.
    pub fn resolve_slot(
        &self,
        key: &PoolKey,
        component: ComponentId,
        slot: SlotRef,
    ) -> Result<SlotRef, PoolError> {
        let entry = self.entry(key).ok_or_else(|| PoolError::NoMatchingEntry(key.clone()))?;
        if entry.epoch == slot.epoch {
            return Ok(slot);
        }
        entry.slot_of(component).ok_or_else(|| PoolError::NotRegistered {
            key: key.clone(),
            component,
        })
    }

    /// Write `transform` into the component's slot and flag the batch dirty.
    /// `slot` is refreshed in place when it was stale.
    pub fn write_transform(
        &self,
        scene: &mut SceneGraph,
        key: &PoolKey,
        component: ComponentId,
        slot: &mut SlotRef,
        transform: Mat4,
    ) -> Result<(), PoolError> {
        *slot = self.resolve_slot(key, component, *slot)?;
        let object = self
            .entry(key)
            .ok_or_else(|| PoolError::NoMatchingEntry(key.clone()))?
            .object;
        let mesh = scene
            .instanced_mut(object)
            .ok_or(PoolError::MissingBatch(object))?;
        mesh.set_transform_at(slot.index, transform)?;
        mesh.mark_needs_update();
        Ok(())
    }

    pub fn entry(&self, key: &PoolKey) -> Option<&PoolEntry> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PoolEntry> {
        self.entries.values()
    }

    pub fn contains(&self, key: &PoolKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_registered(&self) -> usize {
        self.entries.values().map(PoolEntry::registered).sum()
    }

    /// Forget every entry. The caller clears the scene.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn entry_mut(&mut self, key: &PoolKey) -> Result<&mut PoolEntry, PoolError> {
        self.entries
            .get_mut(key)
            .ok_or_else(|| PoolError::NoMatchingEntry(key.clone()))
    }

    fn bump_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    /// Swap the entry's batch for one of `capacity`. The old batch leaves the
    /// scene before the new one is added.
    fn replace(
        &mut self,
        scene: &mut SceneGraph,
        key: &PoolKey,
        capacity: usize,
    ) -> Result<(), PoolError> {
        let epoch = self.bump_epoch();
        let entry = self.entry_mut(key)?;
        let old = entry.object;
        let mut mesh = match scene.remove(old) {
            Some(SceneObject::Instanced(mesh)) => mesh.resized(capacity),
            _ => return Err(PoolError::MissingBatch(old)),
        };
        mesh.set_draw_count(entry.registered());
        mesh.mark_needs_update();
        entry.object = scene.add(SceneObject::Instanced(mesh));
        entry.capacity = capacity;
        entry.epoch = epoch;
        Ok(())
    }
}
