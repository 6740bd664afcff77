//! Entity/component model.
//!
//! Entities exist in two forms. Declarative entities ([`Entity`]) are built
//! by application code through the `generate_*` factories and hold only paths
//! and callbacks. Internal entities ([`InternalEntity`]) are produced by the
//! injection pipeline and hold live handles: pool slots, bound handlers and
//! bound script thunks.
//!
//! Both forms are generic over the runtime state `S` their callbacks mutate.
//!
//! # Invariants
//! - Component kinds form a closed set; every match over them is exhaustive.
//! - An internal entity is only built when all of its components resolved.
//! - The script update list holds exactly the scripts of live entities.

mod component;
mod internal;
mod store;

pub use component::{
    Component, Entity, EntityDescriptor, InputComponent, RenderComponent, RenderDescriptor,
    RenderKind, RunPolicy, ScriptComponent, ScriptFn, generate_entity, generate_input,
    generate_render, generate_script,
};
pub use internal::{InternalComponent, InternalEntity, InternalInput, InternalRender, InternalScript};
pub use store::EntityStore;

#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("unknown render kind: {0}")]
    UnknownRenderKind(String),
}

pub fn crate_info() -> &'static str {
    "gravy-ecs v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("ecs"));
    }
}
