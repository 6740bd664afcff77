use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use gravy_common::{ComponentId, EntityId};
use gravy_input::HandlerSpec;
use gravy_render::PoolKey;
use serde::{Deserialize, Serialize};

use crate::ComponentError;

/// Script callback: receives the owning entity and the runtime state.
pub type ScriptFn<S> = Rc<dyn Fn(EntityId, &mut S)>;

/// Lifecycle phases in which a script runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunPolicy {
    /// Run once while the component is resolved.
    pub initialize: bool,
    /// Run every simulation tick.
    pub update: bool,
    /// Run when the entity is removed.
    pub destroy: bool,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            initialize: false,
            update: true,
            destroy: false,
        }
    }
}

impl RunPolicy {
    pub fn all() -> Self {
        Self {
            initialize: true,
            update: true,
            destroy: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderKind {
    #[serde(rename = "instancedMesh")]
    InstancedMesh,
}

impl FromStr for RenderKind {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instancedMesh" => Ok(Self::InstancedMesh),
            other => Err(ComponentError::UnknownRenderKind(other.to_string())),
        }
    }
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstancedMesh => f.write_str("instancedMesh"),
        }
    }
}

pub struct InputComponent<S> {
    pub id: ComponentId,
    pub handlers: Vec<HandlerSpec<S>>,
}

pub struct ScriptComponent<S> {
    pub id: ComponentId,
    pub script: ScriptFn<S>,
    pub run: RunPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderComponent {
    pub id: ComponentId,
    pub kind: RenderKind,
    pub geometry_path: String,
    pub texture_path: String,
}

impl RenderComponent {
    /// Pool key shared by every render component drawing the same assets.
    pub fn key(&self) -> PoolKey {
        PoolKey::new(&self.geometry_path, &self.texture_path)
    }
}

/// A declarative component. Holds paths and callbacks, never live resources.
pub enum Component<S> {
    Input(InputComponent<S>),
    Script(ScriptComponent<S>),
    Render(RenderComponent),
}

impl<S> Component<S> {
    pub fn id(&self) -> ComponentId {
        match self {
            Self::Input(c) => c.id,
            Self::Script(c) => c.id,
            Self::Render(c) => c.id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Input(_) => "input",
            Self::Script(_) => "script",
            Self::Render(_) => "render",
        }
    }
}

impl<S> Clone for Component<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Input(c) => Self::Input(InputComponent {
                id: c.id,
                handlers: c.handlers.clone(),
            }),
            Self::Script(c) => Self::Script(ScriptComponent {
                id: c.id,
                script: Rc::clone(&c.script),
                run: c.run,
            }),
            Self::Render(c) => Self::Render(c.clone()),
        }
    }
}

impl<S> fmt::Debug for Component<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(c) => f
                .debug_struct("Input")
                .field("id", &c.id)
                .field("handlers", &c.handlers)
                .finish(),
            Self::Script(c) => f
                .debug_struct("Script")
                .field("id", &c.id)
                .field("run", &c.run)
                .finish_non_exhaustive(),
            Self::Render(c) => c.fmt(f),
        }
    }
}

/// An entity as authored, before injection.
pub struct Entity<S> {
    pub id: EntityId,
    pub name: String,
    pub components: Vec<Component<S>>,
}

impl<S> Clone for Entity<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            components: self.components.clone(),
        }
    }
}

impl<S> fmt::Debug for Entity<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("components", &self.components)
            .finish()
    }
}

pub fn generate_entity<S>(name: &str, components: impl IntoIterator<Item = Component<S>>) -> Entity<S> {
    Entity {
        id: EntityId::new(),
        name: name.to_string(),
        components: components.into_iter().collect(),
    }
}

pub fn generate_input<S>(handlers: impl IntoIterator<Item = HandlerSpec<S>>) -> Component<S> {
    Component::Input(InputComponent {
        id: ComponentId::new(),
        handlers: handlers.into_iter().collect(),
    })
}

pub fn generate_render<S>(kind: RenderKind, geometry_path: &str, texture_path: &str) -> Component<S> {
    Component::Render(RenderComponent {
        id: ComponentId::new(),
        kind,
        geometry_path: geometry_path.to_string(),
        texture_path: texture_path.to_string(),
    })
}

pub fn generate_script<S, F>(script: F, run: RunPolicy) -> Component<S>
where
    F: Fn(EntityId, &mut S) + 'static,
{
    Component::Script(ScriptComponent {
        id: ComponentId::new(),
        script: Rc::new(script),
        run,
    })
}

/// Render component as written in a scene file. `kind` stays a string so an
/// unknown kind is reported as a configuration error, not a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderDescriptor {
    pub kind: String,
    pub geometry: String,
    pub texture: String,
}

impl RenderDescriptor {
    pub fn to_component<S>(&self) -> Result<Component<S>, ComponentError> {
        let kind: RenderKind = self.kind.parse()?;
        Ok(generate_render(kind, &self.geometry, &self.texture))
    }
}

/// Render-only entity as written in a scene file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    #[serde(default)]
    pub render: Vec<RenderDescriptor>,
}

impl EntityDescriptor {
    pub fn to_entity<S>(&self) -> Result<Entity<S>, ComponentError> {
        let components = self
            .render
            .iter()
            .map(RenderDescriptor::to_component)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(generate_entity(&self.name, components))
    }
}
