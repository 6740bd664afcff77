use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use gravy_assets::MemoryLoader;
use gravy_common::{EntityId, Size};
use gravy_ecs::{RenderKind, RunPolicy, generate_entity, generate_input, generate_render, generate_script};
use gravy_input::{DispatchContext, KeyMatch, Trigger, generate_handler, keys};
use gravy_kernel::{Engine, EngineConfig, EngineError, GameEntity, RuntimeState};
use gravy_render::{HeadlessRenderer, PoolError, PoolKey, Renderer};
use tokio::task::LocalSet;

const CUBE: &str = "/cube.obj";
const IAN: &str = "/ian.jpg";

fn loader() -> MemoryLoader {
    MemoryLoader::new()
        .with_geometry(CUBE)
        .with_texture(IAN)
        .with_texture("/broken.jpg")
        .failing("/broken.jpg")
}

fn engine(loader: MemoryLoader) -> Engine {
    Engine::new(Rc::new(loader), EngineConfig::default()).unwrap()
}

fn renderer() -> Box<dyn Renderer> {
    Box::new(HeadlessRenderer::new(Size::new(800, 600)))
}

fn cube(name: &str) -> GameEntity {
    generate_entity(name, [generate_render(RenderKind::InstancedMesh, CUBE, IAN)])
}

fn cube_key() -> PoolKey {
    PoolKey::new(CUBE, IAN)
}

fn capacity_and_registered(engine: &Engine, key: &PoolKey) -> (usize, usize) {
    let state = engine.state();
    let state = state.borrow();
    let entry = state.pool.entry(key).expect("pool entry");
    (entry.capacity(), entry.registered())
}

#[tokio::test]
async fn second_registration_grows_pool_entry() {
    let mut engine = engine(loader());
    let report = engine
        .initialize_and_wait(Size::new(800, 600), vec![cube("first")], renderer())
        .await
        .unwrap();
    assert_eq!(report.admitted.len(), 1);
    assert_eq!(capacity_and_registered(&engine, &cube_key()), (1, 1));

    engine.inject_and_wait(vec![cube("second")]).await.unwrap();
    assert_eq!(capacity_and_registered(&engine, &cube_key()), (2, 2));
    assert_eq!(engine.summary().entities, 2);
}

#[tokio::test]
async fn one_failing_entity_leaves_no_orphans() {
    let mut engine = engine(loader());
    let broken = generate_entity(
        "broken",
        [
            generate_render(RenderKind::InstancedMesh, CUBE, IAN),
            generate_render(RenderKind::InstancedMesh, CUBE, "/broken.jpg"),
        ],
    );
    let broken_id = broken.id;
    let entities = vec![cube("a"), broken, cube("b"), cube("c")];

    let report = engine
        .initialize_and_wait(Size::new(800, 600), entities, renderer())
        .await
        .unwrap();
    assert_eq!(report.admitted.len(), 3);
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].entity, broken_id);

    let state = engine.state();
    let state = state.borrow();
    assert_eq!(state.entities.len(), 3);
    assert_eq!(state.pool.total_registered(), 3);
    assert!(state.entities.get(broken_id).is_none());
    assert!(!state.pool.contains(&PoolKey::new(CUBE, "/broken.jpg")));
}

#[tokio::test]
async fn deescalation_suppresses_lower_priority_handler() {
    let mut engine = engine(loader());
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let run_log = Rc::clone(&log);
    let walk_log = Rc::clone(&log);

    let run_up = generate_handler(
        "RUN_UP",
        [KeyMatch::chord([keys::SHIFT, keys::W])],
        move |_| run_log.borrow_mut().push("RUN_UP".into()),
    )
    .priority(1)
    .triggers([Trigger::KeyDown])
    .deescalates(["WALK_UP"]);
    let walk_up = generate_handler("WALK_UP", [keys::W], move |_| {
        walk_log.borrow_mut().push("WALK_UP".into())
    })
    .triggers([Trigger::KeyDown]);
    let player = generate_entity("player", [generate_input([walk_up, run_up])]);

    engine
        .initialize_and_wait(Size::new(800, 600), vec![player], renderer())
        .await
        .unwrap();

    engine.key_down(keys::SHIFT);
    let outcome = engine.key_down("W").unwrap();
    assert_eq!(outcome.fired.len(), 1);
    assert_eq!(outcome.suppressed.len(), 1);
    assert_eq!(*log.borrow(), ["RUN_UP"]);

    // Repeated key-down of a held key runs no pass.
    assert!(engine.key_down(keys::W).is_none());
}

#[tokio::test]
async fn frame_history_round_trip() {
    let mut engine = engine(loader());
    let seen = Rc::new(RefCell::new(Vec::<bool>::new()));
    let sink = Rc::clone(&seen);
    let hold = generate_handler("HOLD", [keys::SPACE], move |ev| {
        sink.borrow_mut().push(ev.active_previous_frame)
    });
    let id = hold.identifier;
    engine
        .initialize_and_wait(
            Size::new(800, 600),
            vec![generate_entity("jumper", [generate_input([hold])])],
            renderer(),
        )
        .await
        .unwrap();

    engine.key_down(keys::SPACE);
    engine.simulation_tick();
    engine.render_tick();
    {
        let state = engine.state();
        let state = state.borrow();
        use gravy_input::DispatchContext;
        assert!(state.input().current_handler_ids().is_empty());
        assert_eq!(state.input().previous_handler_ids(), [id]);
    }
    engine.simulation_tick();
    assert_eq!(*seen.borrow(), [false, true]);
}

#[tokio::test]
async fn scripts_move_instances() {
    let mut engine = engine(loader());
    let spinner = generate_entity(
        "spinner",
        [
            generate_render(RenderKind::InstancedMesh, CUBE, IAN),
            generate_script(
                |entity: EntityId, state: &mut RuntimeState| {
                    if let Some(t) = state.transform_mut(entity) {
                        t.position.x += 1.0;
                    }
                },
                RunPolicy::default(),
            ),
        ],
    );
    engine
        .initialize_and_wait(Size::new(800, 600), vec![spinner], renderer())
        .await
        .unwrap();

    engine.simulation_tick();
    engine.simulation_tick();
    // Transforms are written before scripts run, so the buffer lags one tick.
    let state = engine.state();
    let state = state.borrow();
    let entry = state.pool.entry(&cube_key()).unwrap();
    let viewport = state.viewport.as_ref().unwrap();
    let mesh = viewport.scene.instanced(entry.object()).unwrap();
    let written = mesh.transform_at(0).unwrap();
    assert_eq!(written.w_axis.x, 1.0);
    assert_eq!(state.meta.ticks, 2);
}

#[tokio::test]
async fn remove_entity_runs_destroy_and_releases_slots() {
    let mut engine = engine(loader());
    let destroyed = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&destroyed);
    let doomed = generate_entity(
        "doomed",
        [
            generate_render(RenderKind::InstancedMesh, CUBE, IAN),
            generate_script(
                move |_, _: &mut RuntimeState| *counter.borrow_mut() += 1,
                RunPolicy {
                    update: false,
                    destroy: true,
                    ..RunPolicy::default()
                },
            ),
        ],
    );
    let doomed_id = doomed.id;
    engine
        .initialize_and_wait(Size::new(800, 600), vec![doomed, cube("keeper")], renderer())
        .await
        .unwrap();
    assert_eq!(capacity_and_registered(&engine, &cube_key()), (2, 2));

    assert!(engine.remove_entity(doomed_id).unwrap());
    assert_eq!(*destroyed.borrow(), 1);
    assert_eq!(capacity_and_registered(&engine, &cube_key()), (2, 1));
    assert_eq!(engine.summary().scripts, 0);
    assert!(!engine.remove_entity(doomed_id).unwrap());
}

#[tokio::test]
async fn failed_slot_release_still_releases_the_rest() {
    let mut engine = engine(loader().with_texture("/other.jpg"));
    let other_key = PoolKey::new(CUBE, "/other.jpg");
    let twin = generate_entity(
        "twin",
        [
            generate_render(RenderKind::InstancedMesh, CUBE, IAN),
            generate_render(RenderKind::InstancedMesh, CUBE, "/other.jpg"),
        ],
    );
    let twin_id = twin.id;
    engine
        .initialize_and_wait(Size::new(800, 600), vec![twin], renderer())
        .await
        .unwrap();

    // Release the first slot behind the engine's back so its release fails.
    {
        let state = engine.state();
        let mut state = state.borrow_mut();
        let first = state.entities.get(twin_id).unwrap().renders().next().unwrap().component;
        let RuntimeState { pool, viewport, .. } = &mut *state;
        let scene = &mut viewport.as_mut().unwrap().scene;
        pool.unregister(scene, &cube_key(), first).unwrap();
    }

    let err = engine.remove_entity(twin_id).unwrap_err();
    assert!(matches!(err, EngineError::Pool(PoolError::NotRegistered { .. })));
    assert_eq!(capacity_and_registered(&engine, &other_key).1, 0);
    assert_eq!(engine.summary().entities, 0);
}

#[tokio::test]
async fn lifecycle_errors() {
    let mut engine = engine(loader());
    assert!(matches!(engine.start_engine(), Err(EngineError::NotInitialized)));
    assert!(matches!(
        engine.inject_and_wait(vec![cube("early")]).await,
        Err(EngineError::NotInitialized)
    ));
    engine
        .initialize_and_wait(Size::new(800, 600), Vec::new(), renderer())
        .await
        .unwrap();
    let again = engine
        .initialize_and_wait(Size::new(800, 600), Vec::new(), renderer())
        .await;
    assert!(matches!(again, Err(EngineError::AlreadyInitialized)));
}

#[tokio::test(start_paused = true)]
async fn loops_tick_at_their_own_rates() {
    LocalSet::new()
        .run_until(async {
            let mut engine = engine(loader());
            engine
                .initialize_and_wait(Size::new(800, 600), vec![cube("a")], renderer())
                .await
                .unwrap();
            engine.start_engine().unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;

            let summary = engine.summary();
            assert!((55..=65).contains(&summary.ticks), "ticks {}", summary.ticks);
            assert!((28..=33).contains(&summary.frames), "frames {}", summary.frames);
            {
                let state = engine.state();
                let state = state.borrow();
                assert_eq!(state.meta.delta_time, engine.config().simulation_interval);
                assert_eq!(state.meta.last_frame.instances, 1);
            }

            engine.stop_engine();
            assert!(!engine.is_running());
            tokio::time::sleep(Duration::from_millis(100)).await;
            let summary = engine.summary();
            assert!(!summary.initialized);
            assert_eq!((summary.ticks, summary.frames, summary.entities), (0, 0, 0));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn stop_discards_in_flight_loads() {
    LocalSet::new()
        .run_until(async {
            let mut engine = engine(loader().with_latency(Duration::from_millis(100)));
            let pending = engine
                .initialize(Size::new(800, 600), vec![cube("slow")], renderer())
                .unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            engine.stop_engine();

            // Reinitialize before the old load completes.
            engine
                .initialize_and_wait(Size::new(800, 600), Vec::new(), renderer())
                .await
                .unwrap();
            let report = pending.await.unwrap();
            assert_eq!(report.discarded.len(), 1);
            assert!(report.admitted.is_empty());

            let summary = engine.summary();
            assert!(summary.initialized);
            assert_eq!((summary.entities, summary.pool_entries), (0, 0));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn render_loop_draws_every_instance() {
    LocalSet::new()
        .run_until(async {
            let mut engine = engine(loader());
            let entities: Vec<_> = (0..5).map(|i| cube(&format!("cube{i}"))).collect();
            engine
                .initialize_and_wait(Size::new(800, 600), entities, renderer())
                .await
                .unwrap();
            engine.start_engine().unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            {
                let state = engine.state();
                let state = state.borrow();
                let frame = state.meta.last_frame;
                assert_eq!((frame.batches, frame.instances), (1, 5));
                assert_eq!(state.pool.entry(&cube_key()).unwrap().capacity(), 5);
            }
            engine.stop_engine();
            assert_eq!(engine.summary().entities, 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn equal_priority_handlers_keep_declaration_order() {
    let mut engine = engine(loader().with_latency(Duration::from_millis(50)));
    let log = Rc::new(RefCell::new(Vec::<&str>::new()));
    let log_a = Rc::clone(&log);
    let log_b = Rc::clone(&log);

    let slow = generate_entity(
        "first",
        [
            generate_render(RenderKind::InstancedMesh, CUBE, IAN),
            generate_input([generate_handler("a", [keys::W], move |_| log_a.borrow_mut().push("a"))
                .triggers([Trigger::KeyDown])]),
        ],
    );
    let fast = generate_entity(
        "second",
        [generate_input([generate_handler("b", [keys::W], move |_| log_b.borrow_mut().push("b"))
            .triggers([Trigger::KeyDown])
            .deescalates(["a"])])],
    );

    let report = engine
        .initialize_and_wait(Size::new(800, 600), vec![slow, fast], renderer())
        .await
        .unwrap();
    assert_eq!(report.admitted.len(), 2);

    {
        let state = engine.state();
        let state = state.borrow();
        let names: Vec<&str> = state.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
        assert!(state.handlers().unresolved_deescalations().is_empty());
    }

    // "b" deescalates "a", which is visited first, so nothing is suppressed.
    let outcome = engine.key_down(keys::W).unwrap();
    assert!(outcome.suppressed.is_empty());
    assert_eq!(*log.borrow(), ["a", "b"]);
}
