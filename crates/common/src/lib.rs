//! Shared types used by every gravy crate.

mod types;

pub use types::{ComponentId, EntityId, HandlerId, Size, Transform};

pub fn crate_info() -> &'static str {
    "gravy-common v0.1.0"
}
