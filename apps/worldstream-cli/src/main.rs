use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::{Vec2, Vec3};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use worldstream_assets::{AssetSource, FsAssetSource};
use worldstream_common::{StreamConfig, Transform};
use worldstream_stream::{
    GameObjectSpawner, HeadlessGpu, HeadlessPhysics, SpawnRequest, WorldStreamer,
};
use worldstream_terrain::{TerrainRasterizer, TerrainSettings};

#[derive(Parser)]
#[command(name = "worldstream-cli", about = "Drive the world streaming pipeline headless")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Move a viewpoint in a straight line and stream blocks around it
    Walk {
        /// Asset root (overrides the config's asset_root)
        #[arg(short, long)]
        assets: Option<PathBuf>,
        /// Stream config file (json or yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Start position as X,Z
        #[arg(long, value_parser = parse_vec2, default_value = "0,0")]
        from: Vec2,
        /// End position as X,Z
        #[arg(long, value_parser = parse_vec2)]
        to: Vec2,
        /// Number of steps along the line
        #[arg(short, long, default_value = "10")]
        steps: u32,
        /// Time to keep ticking in place after each step
        #[arg(long, default_value = "100")]
        settle_ms: u64,
    },
    /// Rasterize a heightmap and print mesh statistics
    Rasterize {
        /// Height-encoding image
        heightmap: PathBuf,
        /// Stream config file (json or yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Spawn one game object through the background spawner
    Spawn {
        /// Asset root (overrides the config's asset_root)
        #[arg(short, long)]
        assets: Option<PathBuf>,
        /// Stream config file (json or yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Game object config, relative to the asset root
        object: PathBuf,
        /// Spawn position as X,Y,Z
        #[arg(long, value_parser = parse_vec3, default_value = "0,0,0")]
        at: Vec3,
        /// Give up after this long
        #[arg(long, default_value = "5000")]
        timeout_ms: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Info => {
            println!("worldstream-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", worldstream_common::crate_info());
            println!("assets: {}", worldstream_assets::crate_info());
            println!("terrain: {}", worldstream_terrain::crate_info());
            println!("stream: {}", worldstream_stream::crate_info());
        }
        Commands::Walk {
            assets,
            config,
            from,
            to,
            steps,
            settle_ms,
        } => {
            let config = load_config(config.as_deref(), assets)?;
            walk(&config, from, to, steps, Duration::from_millis(settle_ms))?;
        }
        Commands::Rasterize { heightmap, config } => {
            let config = load_config(config.as_deref(), None)?;
            rasterize(&config, &heightmap)?;
        }
        Commands::Spawn {
            assets,
            config,
            object,
            at,
            timeout_ms,
        } => {
            let config = load_config(config.as_deref(), assets)?;
            spawn(&config, object, at, Duration::from_millis(timeout_ms))?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>, assets: Option<PathBuf>) -> anyhow::Result<StreamConfig> {
    let mut config = match path {
        Some(path) => StreamConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StreamConfig::default(),
    };
    if let Some(assets) = assets {
        config.asset_root = assets;
    }
    config.validate()?;
    Ok(config)
}

fn walk(
    config: &StreamConfig,
    from: Vec2,
    to: Vec2,
    steps: u32,
    settle: Duration,
) -> anyhow::Result<()> {
    let source: Arc<dyn AssetSource> = Arc::new(FsAssetSource::new(&config.asset_root));
    let mut streamer = WorldStreamer::new(config, source)?;
    streamer.start()?;
    let mut gpu = HeadlessGpu::new();
    let mut physics = HeadlessPhysics::new();

    println!(
        "Walking {from} -> {to} in {steps} steps (block size {}, radius {})",
        config.block_size, config.max_adjacent_blocks
    );
    for step in 0..=steps {
        let t = if steps == 0 { 1.0 } else { step as f32 / steps as f32 };
        let p = from.lerp(to, t);
        let viewpoint = Vec3::new(p.x, 0.0, p.y);

        let report = streamer.tick(viewpoint, &mut gpu, &mut physics);
        let mut accepted = usize::from(report.accepted.is_some());
        let deadline = Instant::now() + settle;
        while streamer.pending_count() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
            let settle_report = streamer.tick(viewpoint, &mut gpu, &mut physics);
            accepted += usize::from(settle_report.accepted.is_some());
        }

        println!(
            "step {step:>3}: block {} enqueued {} accepted {} evicted {} resident {} pending {}",
            report.current_block,
            report.enqueued.len(),
            accepted,
            report.evicted.len(),
            streamer.resident_count(),
            streamer.pending_count()
        );
        if streamer.is_faulted() {
            anyhow::bail!("block loader terminated");
        }
    }

    let stats = streamer.stats();
    let timer = streamer.tick_timer();
    println!(
        "Totals: ticks={} enqueued={} accepted={} rejected={} dropped={} evicted={}",
        stats.ticks,
        stats.total_enqueued,
        stats.total_accepted,
        stats.total_rejected,
        stats.total_dropped,
        stats.total_evicted
    );
    println!(
        "GPU: blocks={} meshes={} materials={} terrain_bytes={} mesh_bytes={}",
        gpu.block_count(),
        gpu.mesh_count(),
        gpu.material_count(),
        gpu.terrain_bytes(),
        gpu.mesh_bytes()
    );
    println!(
        "Tick time: avg={:?} min={:?} max={:?}",
        timer.average(),
        timer.min(),
        timer.max()
    );
    streamer.stop();
    Ok(())
}

fn rasterize(config: &StreamConfig, heightmap: &Path) -> anyhow::Result<()> {
    let source = FsAssetSource::new(".");
    let pixels = source
        .decode_image(heightmap)
        .with_context(|| format!("decoding {}", heightmap.display()))?;
    let rasterizer = TerrainRasterizer::new(TerrainSettings::from(config));

    let started = Instant::now();
    let mesh = rasterizer.build_mesh(&pixels, Vec3::ZERO);
    let elapsed = started.elapsed();
    let (lo, hi) = mesh.height_bounds();
    println!(
        "Heightmap {}x{} -> {}x{} cells: vertices={} triangles={} height=[{lo}, {hi}] in {elapsed:?}",
        pixels.width(),
        pixels.height(),
        mesh.resolution(),
        mesh.resolution(),
        mesh.vertices.len(),
        mesh.triangle_count()
    );
    Ok(())
}

fn spawn(config: &StreamConfig, object: PathBuf, at: Vec3, timeout: Duration) -> anyhow::Result<()> {
    let source: Arc<dyn AssetSource> = Arc::new(FsAssetSource::new(&config.asset_root));
    let mut spawner = GameObjectSpawner::new(source);
    spawner.start()?;
    let mut gpu = HeadlessGpu::new();
    let mut physics = HeadlessPhysics::new();

    spawner.spawn(SpawnRequest::new(object.clone(), Transform::from_position(at)))?;
    let deadline = Instant::now() + timeout;
    let handle = loop {
        if let Some(handle) = spawner.tick(&mut gpu, &mut physics) {
            break handle;
        }
        if spawner.failed_count() > 0 {
            anyhow::bail!("failed to load {}", object.display());
        }
        if spawner.is_faulted() || Instant::now() >= deadline {
            anyhow::bail!("no game object produced for {}", object.display());
        }
        std::thread::sleep(Duration::from_millis(1));
    };

    let Some(spawned) = spawner.get(handle) else {
        anyhow::bail!("spawned object {handle:?} not registered");
    };
    println!(
        "Spawned '{}' at {at}: entities={} meshes={} materials={}",
        spawned.name,
        spawned.entities.len(),
        gpu.mesh_count(),
        gpu.material_count()
    );
    if let Some(body) = physics.body(handle) {
        println!(
            "Body: kind={:?} mass={} collision_meshes={} vehicle_wheels={}",
            body.body.kind,
            body.body.mass,
            body.collision.len(),
            body.vehicle.as_ref().map_or(0, |v| v.wheels.len())
        );
    }
    spawner.stop();
    Ok(())
}

fn parse_components<const N: usize>(s: &str) -> Result<[f32; N], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {N} comma-separated numbers, got `{s}`"));
    }
    let mut out = [0.0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("`{part}` is not a number"))?;
    }
    Ok(out)
}

fn parse_vec2(s: &str) -> Result<Vec2, String> {
    parse_components::<2>(s).map(Vec2::from)
}

fn parse_vec3(s: &str) -> Result<Vec3, String> {
    parse_components::<3>(s).map(Vec3::from)
}
