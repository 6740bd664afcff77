mod demo;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gravy_assets::{AssetLoader, FsLoader, MemoryLoader};
use gravy_common::{EntityId, Size};
use gravy_ecs::{Component, EntityDescriptor};
use gravy_input::HandlerRegistry;
use gravy_kernel::{Engine, EngineConfig, GameEntity, InjectionReport, RuntimeState};
use gravy_render::HeadlessRenderer;
use tracing_subscriber::EnvFilter;

use crate::demo::Demo;

#[derive(Parser)]
#[command(name = "gravy-cli", about = "Headless driver for the gravy runtime")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version and crate info
    Info,
    /// List the key bindings of the demo player
    Controls,
    /// Run a scene headlessly for a fixed wall-clock duration
    Run {
        /// Built-in entities to inject
        #[arg(long, value_enum, default_value = "mixed")]
        demo: Demo,
        /// Extra render-only entities from a JSON scene file
        #[arg(long)]
        scene: Option<PathBuf>,
        /// Load assets from this directory instead of synthesizing them
        #[arg(long)]
        assets: Option<PathBuf>,
        /// Engine config (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Seconds to run before stopping
        #[arg(short, long, default_value = "2.0")]
        duration: f64,
        /// Override the render rate in Hz
        #[arg(long)]
        render_hz: Option<f64>,
        /// Override the simulation rate in Hz
        #[arg(long)]
        sim_hz: Option<f64>,
        /// Keys held for the whole run, e.g. `shift+w` (repeatable)
        #[arg(short, long)]
        press: Vec<String>,
        /// Number of spinning cubes in the `cubes` and `mixed` demos
        #[arg(long, default_value = "8")]
        cubes: usize,
        /// Print the final scene graph
        #[arg(long)]
        describe: bool,
    },
}

struct RunOptions {
    demo: Demo,
    scene: Option<PathBuf>,
    assets: Option<PathBuf>,
    config: Option<PathBuf>,
    duration: f64,
    render_hz: Option<f64>,
    sim_hz: Option<f64>,
    press: Vec<String>,
    cubes: usize,
    describe: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Info => {
            println!("gravy-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", gravy_common::crate_info());
            println!("input: {}", gravy_input::crate_info());
            println!("assets: {}", gravy_assets::crate_info());
            println!("render: {}", gravy_render::crate_info());
            println!("ecs: {}", gravy_ecs::crate_info());
            println!("kernel: {}", gravy_kernel::crate_info());
        }
        Commands::Controls => {
            let mut registry = HandlerRegistry::<RuntimeState>::new();
            let player = EntityId::new();
            registry.register(demo::player_handlers().iter().map(|h| h.bind(player)));
            println!("Controls:");
            for control in registry.controls() {
                let keys: Vec<String> = control.keys.iter().map(|k| format!("[{k}]")).collect();
                println!("  {:<10} {:<32} {}", control.name, keys.join(" "), control.description);
            }
        }
        Commands::Run {
            demo,
            scene,
            assets,
            config,
            duration,
            render_hz,
            sim_hz,
            press,
            cubes,
            describe,
        } => run(RunOptions {
            demo,
            scene,
            assets,
            config,
            duration,
            render_hz,
            sim_hz,
            press,
            cubes,
            describe,
        })?,
    }

    Ok(())
}

fn run(opts: RunOptions) -> anyhow::Result<()> {
    let mut config = match &opts.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(hz) = opts.render_hz {
        config.render_interval = interval_from_hz(hz).context("invalid --render-hz")?;
    }
    if let Some(hz) = opts.sim_hz {
        config.simulation_interval = interval_from_hz(hz).context("invalid --sim-hz")?;
    }
    let run_for = Duration::try_from_secs_f64(opts.duration).context("invalid --duration")?;

    let mut entities = opts.demo.entities(opts.cubes);
    if let Some(path) = &opts.scene {
        entities.extend(load_scene(path)?);
    }

    let loader: Rc<dyn AssetLoader> = match &opts.assets {
        Some(root) => Rc::new(FsLoader::new(root)),
        None => Rc::new(synthesized_loader(&entities)),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, async move {
        let mut engine = Engine::new(loader, config)?;
        let size = Size::new(1280, 720);
        let report = engine
            .initialize_and_wait(size, entities, Box::new(HeadlessRenderer::new(size)))
            .await?;
        print_report(&report);

        engine.start_engine()?;
        for chord in &opts.press {
            for key in demo::parse_chord(chord) {
                engine.key_down(key);
            }
        }

        tokio::time::sleep(run_for).await;

        println!("{}", engine.summary());
        if opts.describe {
            let state = engine.state();
            let state = state.borrow();
            if let Some(viewport) = &state.viewport {
                print!("{}", HeadlessRenderer::describe(&viewport.scene, &viewport.camera));
            }
        }
        engine.stop_engine();
        Ok::<(), anyhow::Error>(())
    })
}

fn interval_from_hz(hz: f64) -> anyhow::Result<Duration> {
    anyhow::ensure!(hz.is_finite() && hz > 0.0, "rate must be positive, got {hz}");
    Ok(Duration::try_from_secs_f64(1.0 / hz)?)
}

fn load_scene(path: &Path) -> anyhow::Result<Vec<GameEntity>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading scene {}", path.display()))?;
    let descriptors: Vec<EntityDescriptor> = serde_json::from_str(&text)
        .with_context(|| format!("parsing scene {}", path.display()))?;
    descriptors
        .iter()
        .map(|d| {
            d.to_entity()
                .with_context(|| format!("entity '{}' in {}", d.name, path.display()))
        })
        .collect()
}

/// A memory loader that knows every path the entities reference.
fn synthesized_loader(entities: &[GameEntity]) -> MemoryLoader {
    let mut geometry = BTreeSet::new();
    let mut textures = BTreeSet::new();
    for component in entities.iter().flat_map(|e| &e.components) {
        if let Component::Render(render) = component {
            geometry.insert(render.geometry_path.as_str());
            textures.insert(render.texture_path.as_str());
        }
    }
    let loader = geometry.into_iter().fold(MemoryLoader::new(), MemoryLoader::with_geometry);
    textures.into_iter().fold(loader, MemoryLoader::with_texture)
}

fn print_report(report: &InjectionReport) {
    println!(
        "Injected: admitted={} dropped={} discarded={}",
        report.admitted.len(),
        report.dropped.len(),
        report.discarded.len()
    );
    for dropped in &report.dropped {
        println!("  dropped {} ({}): {}", dropped.name, dropped.entity, dropped.error);
    }
}
