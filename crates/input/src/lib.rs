//! Input Dispatch: pressed-key tracking and priority-ordered handler dispatch.
//!
//! # Invariants
//! - Handlers run in descending priority; ties keep registration order.
//! - A matched handler suppresses the handlers its deescalations name, but only
//!   those visited later in the same pass.
//! - Frame history (`previous_handler_ids`) only advances at `advance_frame`.
//!
//! The dispatch functions are generic over the owning context `C`, so callbacks
//! receive the full runtime state without this crate depending on it.

mod dispatch;
mod handler;
mod key;
mod registry;

pub use dispatch::{
    DispatchContext, DispatchOutcome, InputState, dispatch, key_down, key_up, run_pass,
};
pub use handler::{
    BoundHandler, DispatchEvent, HandlerEvent, HandlerFn, HandlerSpec, Pass, Trigger,
    generate_handler,
};
pub use key::{Key, KeyMatch, keys};
pub use registry::{ControlInfo, DispatchTable, HandlerRegistry};

pub fn crate_info() -> &'static str {
    "gravy-input v0.1.0"
}
