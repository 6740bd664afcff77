//! Runtime kernel: runtime state, component resolution, entity injection and
//! the dual-rate frame scheduler, behind the [`Engine`] control surface.
//!
//! # Invariants
//! - All runtime state lives in one [`RuntimeState`] owned by its engine and
//!   mutated only on the engine's thread.
//! - An entity enters the live set only when every component resolved; a
//!   failed entity leaves no pool registrations behind.
//! - A batch is admitted in declaration order after all of it has settled, so
//!   equal-priority handlers dispatch in declaration order.
//! - Work started in one initialization generation never mutates state of a
//!   later one.
//! - Both scheduler loops are no-ops while the runtime is uninitialized.

mod config;
mod engine;
mod framerate;
mod inject;
mod resolve;
mod scheduler;
mod state;

pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineError};
pub use framerate::FrameRateCounter;
pub use inject::{DroppedEntity, InjectionReport, inject_entities, inject_entity};
pub use resolve::{
    Generation, ResolveContext, ResolveError, SharedState, resolve_component, resolve_input,
    resolve_render, resolve_script,
};
pub use scheduler::{Loops, render_tick, simulation_tick};
pub use state::{Meta, RuntimeState, RuntimeSummary, Viewport};

/// Declarative entity over the kernel's runtime state.
pub type GameEntity = gravy_ecs::Entity<RuntimeState>;
/// Declarative component over the kernel's runtime state.
pub type GameComponent = gravy_ecs::Component<RuntimeState>;
/// Declarative input handler over the kernel's runtime state.
pub type GameHandler = gravy_input::HandlerSpec<RuntimeState>;

pub fn crate_info() -> &'static str {
    "gravy-kernel v0.1.0"
}
