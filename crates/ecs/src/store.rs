use std::rc::Rc;

use gravy_common::EntityId;

use crate::internal::{InternalEntity, InternalRender, InternalScript};

/// Live entities in admission order, plus the script update list.
///
/// Scripts are kept in a separate list so a tick can clone the handles out
/// and run them against the state that owns this store.
pub struct EntityStore<S> {
    entities: Vec<InternalEntity<S>>,
    scripts: Vec<Rc<InternalScript<S>>>,
}

impl<S> Default for EntityStore<S> {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            scripts: Vec::new(),
        }
    }
}

impl<S> EntityStore<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolved entity and its scripts.
    pub fn admit(&mut self, entity: InternalEntity<S>) {
        self.scripts.extend(entity.scripts().cloned());
        tracing::debug!(entity = %entity.id, name = %entity.name, "entity admitted");
        self.entities.push(entity);
    }

    /// Remove an entity and its scripts, preserving the order of the rest.
    pub fn remove(&mut self, id: EntityId) -> Option<InternalEntity<S>> {
        let index = self.entities.iter().position(|e| e.id == id)?;
        self.scripts.retain(|s| s.entity != id);
        Some(self.entities.remove(index))
    }

    pub fn get(&self, id: EntityId) -> Option<&InternalEntity<S>> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut InternalEntity<S>> {
        self.entities.iter_mut().find(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InternalEntity<S>> {
        self.entities.iter()
    }

    /// Every live render component, in admission order.
    pub fn renders_mut(&mut self) -> impl Iterator<Item = &mut InternalRender> {
        self.entities.iter_mut().flat_map(|e| e.renders_mut())
    }

    pub fn scripts(&self) -> &[Rc<InternalScript<S>>] {
        &self.scripts
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.scripts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::RunPolicy;
    use crate::internal::InternalComponent;
    use gravy_common::ComponentId;

    fn entity_with_script(name: &str) -> InternalEntity<u32> {
        let id = EntityId::new();
        let script: InternalScript<u32> = InternalScript::new(
            ComponentId::new(),
            id,
            Rc::new(|_: EntityId, n: &mut u32| *n += 1),
            RunPolicy::default(),
        );
        InternalEntity {
            id,
            name: name.into(),
            components: vec![InternalComponent::Script(Rc::new(script))],
        }
    }

    #[test]
    fn admit_registers_scripts() {
        let mut store = EntityStore::new();
        store.admit(entity_with_script("a"));
        store.admit(entity_with_script("b"));
        assert_eq!(store.len(), 2);

        let mut ticks = 0u32;
        for s in store.scripts().to_vec() {
            s.update(&mut ticks);
        }
        assert_eq!(ticks, 2);
    }

    #[test]
    fn remove_drops_scripts_and_keeps_order() {
        let mut store = EntityStore::new();
        let a = entity_with_script("a");
        let b = entity_with_script("b");
        let c = entity_with_script("c");
        let b_id = b.id;
        store.admit(a);
        store.admit(b);
        store.admit(c);

        let removed = store.remove(b_id).unwrap();
        assert_eq!(removed.name, "b");
        assert_eq!(store.scripts().len(), 2);
        let names: Vec<_> = store.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
        assert!(store.remove(b_id).is_none());
    }

    #[test]
    fn clear_empties_everything() {
        let mut store = EntityStore::new();
        store.admit(entity_with_script("a"));
        store.clear();
        assert!(store.is_empty());
        assert!(store.scripts().is_empty());
    }
}
