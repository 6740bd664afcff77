use std::collections::BTreeSet;
use std::time::Duration;

use gravy_common::HandlerId;

use crate::handler::{DispatchEvent, Pass};
use crate::key::Key;
use crate::registry::{DispatchTable, HandlerRegistry};

/// Pressed keys plus one frame of handler history.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    current_keys: BTreeSet<Key>,
    current_handler_ids: Vec<HandlerId>,
    previous_handler_ids: Vec<HandlerId>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as held. Returns false if it already was.
    pub fn press(&mut self, key: Key) -> bool {
        self.current_keys.insert(key)
    }

    /// Mark `key` as released. Returns false if it was not held.
    pub fn release(&mut self, key: &Key) -> bool {
        self.current_keys.remove(key)
    }

    pub fn is_pressed(&self, key: &Key) -> bool {
        self.current_keys.contains(key)
    }

    pub fn pressed_keys(&self) -> impl Iterator<Item = &Key> {
        self.current_keys.iter()
    }

    pub fn current_handler_ids(&self) -> &[HandlerId] {
        &self.current_handler_ids
    }

    pub fn previous_handler_ids(&self) -> &[HandlerId] {
        &self.previous_handler_ids
    }

    pub fn was_active_previous_frame(&self, id: HandlerId) -> bool {
        self.previous_handler_ids.contains(&id)
    }

    fn record(&mut self, id: HandlerId) {
        if !self.current_handler_ids.contains(&id) {
            self.current_handler_ids.push(id);
        }
    }

    /// Frame boundary: this frame's handlers become the previous frame's.
    pub fn advance_frame(&mut self) {
        self.previous_handler_ids = std::mem::take(&mut self.current_handler_ids);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// State a dispatch pass reads and hands to callbacks.
pub trait DispatchContext: Sized {
    fn input(&self) -> &InputState;
    fn input_mut(&mut self) -> &mut InputState;
    fn handlers(&self) -> &HandlerRegistry<Self>;
    /// Time since the previous simulation tick.
    fn delta_time(&self) -> Duration;
}

/// Result of one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers whose callbacks ran, in call order.
    pub fired: Vec<HandlerId>,
    /// Handlers skipped because an earlier handler deescalated them.
    pub suppressed: Vec<HandlerId>,
}

/// Run one dispatch pass over `table`.
///
/// Handlers are visited in table order. A suppressed handler is skipped
/// entirely; otherwise the first fully-held key entry wins, the callback runs,
/// the handler is recorded for this frame and its deescalation targets are
/// suppressed for the remainder of the pass.
pub fn dispatch<C: DispatchContext>(table: &DispatchTable<C>, ctx: &mut C) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();
    let mut suppressed = vec![false; table.len()];
    let delta_time = ctx.delta_time();

    for (i, handler) in table.entries().iter().enumerate() {
        if suppressed[i] {
            outcome.suppressed.push(handler.identifier);
            continue;
        }

        let input = ctx.input();
        let Some(matched) = handler.first_match(|k| input.is_pressed(k)) else {
            continue;
        };
        let active_previous_frame = input.was_active_previous_frame(handler.identifier);

        ctx.input_mut().record(handler.identifier);
        tracing::trace!(handler = %handler.name, keys = %handler.keys[matched], "handler matched");
        handler.invoke(DispatchEvent {
            keys: &handler.keys[matched],
            game: &mut *ctx,
            delta_time,
            active_previous_frame,
        });

        for &j in table.suppressed_by(i) {
            suppressed[j] = true;
        }
        outcome.fired.push(handler.identifier);
    }

    outcome
}

/// Run the pass of kind `pass` against the context's registered handlers.
pub fn run_pass<C: DispatchContext>(ctx: &mut C, pass: Pass) -> DispatchOutcome {
    let table = ctx.handlers().table(pass);
    dispatch(&table, ctx)
}

/// Key press edge. Runs a key-down pass if the key was not already held.
pub fn key_down<C: DispatchContext>(ctx: &mut C, key: impl Into<Key>) -> Option<DispatchOutcome> {
    if !ctx.input_mut().press(key.into()) {
        return None;
    }
    Some(run_pass(ctx, Pass::KeyDown))
}

/// Key release edge. Runs a key-up pass if the key was held.
pub fn key_up<C: DispatchContext>(ctx: &mut C, key: impl Into<Key>) -> Option<DispatchOutcome> {
    if !ctx.input_mut().release(&key.into()) {
        return None;
    }
    Some(run_pass(ctx, Pass::KeyUp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerEvent, HandlerSpec, Trigger, generate_handler};
    use crate::keys;
    use gravy_common::EntityId;

    #[derive(Default)]
    struct TestContext {
        input: InputState,
        handlers: HandlerRegistry<TestContext>,
        log: Vec<String>,
    }

    impl DispatchContext for TestContext {
        fn input(&self) -> &InputState {
            &self.input
        }

        fn input_mut(&mut self) -> &mut InputState {
            &mut self.input
        }

        fn handlers(&self) -> &HandlerRegistry<Self> {
            &self.handlers
        }

        fn delta_time(&self) -> Duration {
            Duration::from_millis(8)
        }
    }

    fn logging(name: &str) -> impl Fn(HandlerEvent<'_, TestContext>) + 'static {
        let name = name.to_string();
        move |ev: HandlerEvent<'_, TestContext>| {
            ev.game.log.push(format!("{name}:{}", ev.keys));
        }
    }

    fn walk_and_run() -> Vec<HandlerSpec<TestContext>> {
        vec![
            generate_handler("walkUp", [keys::W, keys::ARROW_UP], logging("walkUp")),
            generate_handler(
                "runUp",
                [[keys::SHIFT, keys::W], [keys::SHIFT, keys::ARROW_UP]],
                logging("runUp"),
            )
            .priority(1)
            .deescalates(["walkUp"]),
        ]
    }

    fn context_with(specs: &[HandlerSpec<TestContext>]) -> TestContext {
        let entity = EntityId::new();
        let mut ctx = TestContext::default();
        ctx.handlers.register(specs.iter().map(|s| s.bind(entity)));
        ctx
    }

    #[test]
    fn higher_priority_deescalates_lower() {
        let specs = walk_and_run();
        let mut ctx = context_with(&specs);
        ctx.input.press(Key::new(keys::SHIFT));
        ctx.input.press(Key::new(keys::W));

        let outcome = run_pass(&mut ctx, Pass::Update);
        assert_eq!(outcome.fired, vec![specs[1].identifier]);
        assert_eq!(outcome.suppressed, vec![specs[0].identifier]);
        assert_eq!(ctx.log, ["runUp:shift + w"]);
    }

    #[test]
    fn reversed_priorities_let_lower_fire_first() {
        let specs = vec![
            generate_handler("walkUp", [keys::W], logging("walkUp")).priority(5),
            generate_handler("runUp", [[keys::SHIFT, keys::W]], logging("runUp"))
                .priority(1)
                .deescalates(["walkUp"]),
        ];
        let mut ctx = context_with(&specs);
        ctx.input.press(Key::new(keys::SHIFT));
        ctx.input.press(Key::new(keys::W));

        let outcome = run_pass(&mut ctx, Pass::Update);
        assert_eq!(outcome.fired.len(), 2);
        assert!(outcome.suppressed.is_empty());
        assert_eq!(ctx.log, ["walkUp:w", "runUp:shift + w"]);
    }

    #[test]
    fn first_matching_entry_wins() {
        let specs = vec![generate_handler(
            "up",
            [keys::W, keys::ARROW_UP],
            logging("up"),
        )];
        let mut ctx = context_with(&specs);
        ctx.input.press(Key::new(keys::ARROW_UP));
        ctx.input.press(Key::new(keys::W));

        run_pass(&mut ctx, Pass::Update);
        assert_eq!(ctx.log, ["up:w"]);
    }

    #[test]
    fn unmatched_handler_does_not_suppress() {
        let specs = walk_and_run();
        let mut ctx = context_with(&specs);
        ctx.input.press(Key::new(keys::W));

        let outcome = run_pass(&mut ctx, Pass::Update);
        assert_eq!(outcome.fired, vec![specs[0].identifier]);
        assert_eq!(ctx.log, ["walkUp:w"]);
    }

    #[test]
    fn dispatch_is_deterministic() {
        let specs = walk_and_run();
        let mut ctx = context_with(&specs);
        ctx.input.press(Key::new(keys::SHIFT));
        ctx.input.press(Key::new(keys::ARROW_UP));

        let first = run_pass(&mut ctx, Pass::Update);
        let second = run_pass(&mut ctx, Pass::Update);
        assert_eq!(first, second);
    }

    #[test]
    fn key_edges_run_only_on_state_change() {
        let specs = vec![
            generate_handler("edge", [keys::SPACE], logging("edge")).triggers([Trigger::Change]),
        ];
        let mut ctx = context_with(&specs);

        assert!(key_down(&mut ctx, keys::SPACE).is_some());
        assert!(key_down(&mut ctx, keys::SPACE).is_none());
        // Released key no longer matches, so the key-up pass fires nothing.
        let up = key_up(&mut ctx, keys::SPACE).unwrap_or_default();
        assert!(up.fired.is_empty());
        assert!(key_up(&mut ctx, keys::SPACE).is_none());
        assert_eq!(ctx.log, ["edge: "]);
    }

    #[test]
    fn key_up_pass_sees_remaining_keys() {
        let specs = vec![
            generate_handler("shiftOnly", [keys::SHIFT], logging("shiftOnly"))
                .triggers([Trigger::KeyUp]),
        ];
        let mut ctx = context_with(&specs);
        key_down(&mut ctx, "Shift");
        key_down(&mut ctx, "w");
        let outcome = key_up(&mut ctx, "W").unwrap_or_default();
        assert_eq!(outcome.fired, vec![specs[0].identifier]);
    }

    #[test]
    fn frame_history_round_trip() {
        let specs = walk_and_run();
        let mut ctx = context_with(&specs);
        ctx.input.press(Key::new(keys::W));

        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = std::rc::Rc::clone(&seen);
        let observer = generate_handler("observer", [keys::W], move |ev: HandlerEvent<'_, TestContext>| {
            sink.borrow_mut().push(ev.active_previous_frame);
        });
        ctx.handlers.register([observer.bind(EntityId::new())]);

        run_pass(&mut ctx, Pass::Update);
        assert_eq!(ctx.input.current_handler_ids().len(), 2);

        ctx.input.advance_frame();
        assert!(ctx.input.current_handler_ids().is_empty());
        assert!(ctx.input.was_active_previous_frame(specs[0].identifier));
        assert!(ctx.input.was_active_previous_frame(observer.identifier));

        run_pass(&mut ctx, Pass::Update);
        assert_eq!(*seen.borrow(), [false, true]);
    }

    #[test]
    fn repeated_fire_is_recorded_once() {
        let specs = walk_and_run();
        let mut ctx = context_with(&specs);
        ctx.input.press(Key::new(keys::W));
        run_pass(&mut ctx, Pass::Update);
        run_pass(&mut ctx, Pass::Update);
        assert_eq!(ctx.input.current_handler_ids(), &[specs[0].identifier]);
    }
}
