//! Dual-rate frame scheduler.
//!
//! The render loop runs on the paint cadence and the simulation loop on a
//! fixed wall-clock interval. Both are local tasks on the runtime's thread, so
//! ticks interleave but never preempt each other. Each tick borrows the state
//! for its whole duration and is a no-op while the runtime is uninitialized.

use std::cell::RefCell;
use std::time::Duration;

use gravy_input::{DispatchContext, Pass, run_pass};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::resolve::SharedState;
use crate::state::RuntimeState;

/// Handles of the two running loops. Aborted on stop or drop.
#[derive(Debug)]
pub struct Loops {
    render: JoinHandle<()>,
    simulation: JoinHandle<()>,
}

impl Loops {
    /// Spawn both loops on the current `LocalSet`.
    pub fn spawn(state: SharedState, render_interval: Duration, simulation_interval: Duration) -> Self {
        let render = tokio::task::spawn_local(run_loop(
            SharedState::clone(&state),
            render_interval,
            render_tick,
        ));
        let simulation = tokio::task::spawn_local(run_loop(state, simulation_interval, simulation_tick));
        Self { render, simulation }
    }

    pub fn abort(&self) {
        self.render.abort();
        self.simulation.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.render.is_finished() && self.simulation.is_finished()
    }
}

impl Drop for Loops {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn run_loop(state: SharedState, period: Duration, tick: fn(&RefCell<RuntimeState>, Instant)) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        let now = interval.tick().await;
        tick(&state, now);
    }
}

/// One render-loop tick: framerate, render, then the input frame boundary.
pub fn render_tick(state: &RefCell<RuntimeState>, now: Instant) {
    let mut guard = state.borrow_mut();
    let state = &mut *guard;
    if !state.is_initialized() {
        return;
    }
    let _span = tracing::info_span!("render_tick", frame = state.meta.frames).entered();

    if let Some(fps) = state.framerate.record(now) {
        tracing::trace!(fps, "framerate changed");
    }
    if let Some(viewport) = state.viewport.as_mut() {
        match viewport.renderer.render(&viewport.scene, &viewport.camera) {
            Ok(stats) => state.meta.last_frame = stats,
            Err(err) => tracing::error!(error = %err, "render failed"),
        }
    }
    state.meta.frames += 1;
    state.input_mut().advance_frame();
}

/// One simulation-loop tick: delta time, the update dispatch pass, instance
/// transforms, script updates and camera controls.
pub fn simulation_tick(state: &RefCell<RuntimeState>, now: Instant) {
    let mut guard = state.borrow_mut();
    let state = &mut *guard;
    if !state.is_initialized() {
        return;
    }
    let _span = tracing::info_span!("simulation_tick", tick = state.meta.ticks).entered();

    state.meta.delta_time = state
        .meta
        .previous_tick
        .map(|previous| now.saturating_duration_since(previous))
        .unwrap_or_default();
    state.meta.previous_tick = Some(now);
    state.meta.ticks += 1;

    run_pass(state, Pass::Update);

    if let Err(err) = state.write_transforms() {
        tracing::error!(error = %err, "writing instance transforms failed");
    }

    let scripts = state.entities.scripts().to_vec();
    for script in scripts {
        script.update(state);
    }

    if let Some(viewport) = state.viewport.as_mut() {
        viewport.controls.update(&mut viewport.camera);
    }
}
