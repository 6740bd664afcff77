use clap::ValueEnum;
use glam::Vec3;
use gravy_ecs::{RenderKind, RunPolicy, generate_entity, generate_input, generate_render, generate_script};
use gravy_input::{HandlerEvent, KeyMatch, generate_handler, keys};
use gravy_kernel::{GameEntity, GameHandler, RuntimeState};

pub const CUBE_GEOMETRY: &str = "/cube.obj";
pub const CUBE_TEXTURE: &str = "/ian.jpg";

/// Movement speeds in units per second.
pub mod speed {
    pub const CRAWL: f32 = 0.1;
    pub const WALK: f32 = 0.2;
    pub const RUN: f32 = 0.5;
    pub const SPRINT: f32 = 1.0;
}

const WALK_UP: &str = "walkUp";
const RUN_UP: &str = "runUp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// A player cube steered with WASD / arrow keys.
    Walk,
    /// A grid of spinning cubes sharing one instanced batch.
    Cubes,
    /// Both of the above.
    Mixed,
    /// No built-in entities; use with --scene.
    Empty,
}

impl Demo {
    pub fn entities(self, cubes: usize) -> Vec<GameEntity> {
        match self {
            Demo::Walk => vec![player()],
            Demo::Cubes => spinning_cubes(cubes),
            Demo::Mixed => {
                let mut entities = vec![player()];
                entities.extend(spinning_cubes(cubes));
                entities
            }
            Demo::Empty => Vec::new(),
        }
    }
}

fn mover(direction: Vec3, speed: f32) -> impl Fn(HandlerEvent<'_, RuntimeState>) + 'static {
    move |ev: HandlerEvent<'_, RuntimeState>| {
        let step = direction * speed * ev.delta_time.as_secs_f32();
        if let Some(transform) = ev.game.transform_mut(ev.entity) {
            transform.position += step;
        }
        if !ev.active_previous_frame {
            tracing::debug!(keys = %ev.keys, speed, "movement started");
        }
    }
}

pub fn player_handlers() -> Vec<GameHandler> {
    vec![
        generate_handler(WALK_UP, [keys::W, keys::ARROW_UP], mover(Vec3::Y, speed::WALK))
            .description("Walk up"),
        generate_handler(
            RUN_UP,
            [
                KeyMatch::from([keys::SHIFT, keys::W]),
                KeyMatch::from([keys::SHIFT, keys::ARROW_UP]),
            ],
            mover(Vec3::Y, speed::SPRINT),
        )
        .priority(1)
        .deescalates([WALK_UP])
        .description("Run up"),
        generate_handler("left", [keys::A, keys::ARROW_LEFT], mover(Vec3::NEG_X, speed::WALK))
            .description("Walk left"),
        generate_handler("down", [keys::S, keys::ARROW_DOWN], mover(Vec3::NEG_Y, speed::WALK))
            .description("Walk down"),
        generate_handler("right", [keys::D, keys::ARROW_RIGHT], mover(Vec3::X, speed::WALK))
            .description("Walk right"),
        generate_handler("sneak", [[keys::CONTROL, keys::W]], mover(Vec3::Y, speed::CRAWL))
            .priority(2)
            .deescalates([WALK_UP, RUN_UP])
            .description("Sneak up"),
        generate_handler("dash", [[keys::ALT, keys::D]], mover(Vec3::X, speed::RUN))
            .priority(1)
            .deescalates(["right"])
            .description("Dash right"),
    ]
}

pub fn player() -> GameEntity {
    generate_entity(
        "player",
        [
            generate_render(RenderKind::InstancedMesh, CUBE_GEOMETRY, CUBE_TEXTURE),
            generate_input(player_handlers()),
        ],
    )
}

/// `count` cubes laid out on a square grid, each spinning at its own rate.
pub fn spinning_cubes(count: usize) -> Vec<GameEntity> {
    let side = (count as f32).sqrt().ceil().max(1.0) as usize;
    (0..count)
        .map(|i| {
            let position = Vec3::new(
                (i % side) as f32 * 1.5 - side as f32 * 0.75,
                (i / side) as f32 * 1.5 - side as f32 * 0.75,
                -2.0,
            );
            let rate = 0.5 + (i % 5) as f32 * 0.25;
            generate_entity(
                &format!("cube{i}"),
                [
                    generate_render(RenderKind::InstancedMesh, CUBE_GEOMETRY, CUBE_TEXTURE),
                    generate_script(
                        move |entity, state: &mut RuntimeState| {
                            let angle = rate * state.meta.delta_time.as_secs_f32();
                            if let Some(t) = state.transform_mut(entity) {
                                t.position = position;
                                t.rotate_xy(angle, angle);
                            }
                        },
                        RunPolicy::default(),
                    ),
                ],
            )
        })
        .collect()
}

/// Parse `shift+w` style chords into key names.
pub fn parse_chord(chord: &str) -> Vec<&str> {
    chord
        .split('+')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| if k.eq_ignore_ascii_case("space") { keys::SPACE } else { k })
        .collect()
}
