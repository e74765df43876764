use glam::Vec3;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use worldstream_assets::AssetSource;
use worldstream_common::{BlockId, BlockPosition, ConfigError, StreamConfig};
use worldstream_terrain::{TerrainRasterizer, TerrainSettings};

use crate::block_job::{BlockLoadJob, ResidentBlocks};
use crate::bundle::BlockBundle;
use crate::collab::{GpuBuffers, PhysicsWorld};
use crate::grid::BlockGrid;
use crate::loader::{DropReason, LoaderError, StreamingLoader, TerminationHook};
use crate::stats::{StreamStats, TickTimer};

const TICK_HISTORY: usize = 120;

/// A block in the resident working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub position: BlockPosition,
}

/// What one [`WorldStreamer::tick`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub current_block: BlockPosition,
    pub keep_set_changed: bool,
    /// Requests sent to the loader, nearest first.
    pub enqueued: Vec<BlockPosition>,
    /// Requests the loader finished without a bundle.
    pub dropped: Vec<BlockPosition>,
    pub accepted: Option<BlockPosition>,
    /// Bundle drained but discarded (already resident or out of range).
    pub rejected: Option<BlockPosition>,
    pub evicted: Vec<BlockPosition>,
}

enum Acceptance {
    Accepted,
    AlreadyResident,
    OutOfRange,
}

/// Keeps the blocks around a moving viewpoint resident.
///
/// Owns the resident set and drives the block loader. Everything here runs
/// on the consumer thread; the GPU and physics collaborators are only
/// touched from [`tick`](Self::tick).
pub struct WorldStreamer {
    grid: BlockGrid,
    radius: u32,
    loader: StreamingLoader<BlockLoadJob>,
    loaded: HashMap<BlockPosition, Block>,
    resident: ResidentBlocks,
    pending: HashSet<BlockPosition>,
    keep_set: HashSet<BlockPosition>,
    current: Option<BlockPosition>,
    stats: StreamStats,
    timer: TickTimer,
}

impl WorldStreamer {
    pub fn new(config: &StreamConfig, source: Arc<dyn AssetSource>) -> Result<Self, ConfigError> {
        config.validate()?;
        let grid = BlockGrid::new(config.block_size);
        let resident = ResidentBlocks::default();
        let job = BlockLoadJob::new(
            source,
            TerrainRasterizer::new(TerrainSettings::from(config)),
            grid,
            Arc::clone(&resident),
        );
        Ok(Self {
            grid,
            radius: config.max_adjacent_blocks,
            loader: StreamingLoader::new("blocks", job),
            loaded: HashMap::new(),
            resident,
            pending: HashSet::new(),
            keep_set: HashSet::new(),
            current: None,
            stats: StreamStats::default(),
            timer: TickTimer::new(TICK_HISTORY),
        })
    }

    /// Hook run on the loader thread if the loader dies. Set before `start`.
    pub fn with_termination_hook(mut self, hook: TerminationHook) -> Self {
        self.loader = self.loader.with_termination_hook(hook);
        self
    }

    pub fn start(&mut self) -> Result<(), LoaderError> {
        self.loader.start()
    }

    /// Stop the loader and wait for it. Resident blocks stay registered.
    pub fn stop(&mut self) {
        self.loader.stop();
    }

    /// Advance streaming by one step for a viewpoint at `viewpoint`.
    ///
    /// # Panics
    /// If called before [`start`](Self::start).
    pub fn tick(
        &mut self,
        viewpoint: Vec3,
        gpu: &mut impl GpuBuffers,
        physics: &mut impl PhysicsWorld,
    ) -> TickReport {
        let _span = tracing::info_span!("stream_tick").entered();
        let started = Instant::now();

        let current = self.grid.block_at(viewpoint);
        let mut report = TickReport {
            current_block: current,
            ..TickReport::default()
        };

        if self.current != Some(current) {
            tracing::debug!(from = ?self.current, to = %current, "current block changed");
            self.current = Some(current);
            self.keep_set = self.grid.neighborhood(current, self.radius);
            report.keep_set_changed = true;
            report.enqueued = self.request_missing(current);
        }

        for dropped in self.loader.drain_dropped() {
            self.pending.remove(&dropped.request);
            if dropped.reason == DropReason::Failed {
                tracing::debug!(block = %dropped.request, "block failed to load");
            }
            report.dropped.push(dropped.request);
        }

        if let Some(bundle) = self.loader.poll_ready() {
            let pos = bundle.position;
            match self.accept(bundle, gpu, physics) {
                Acceptance::Accepted => report.accepted = Some(pos),
                Acceptance::AlreadyResident | Acceptance::OutOfRange => {
                    report.rejected = Some(pos)
                }
            }
        }

        report.evicted = self.evict(gpu, physics);

        self.record(&report, started);
        tracing::trace!(
            enqueued = report.enqueued.len(),
            accepted = report.accepted.is_some(),
            evicted = report.evicted.len(),
            resident = self.loaded.len(),
            pending = self.pending.len(),
            "stream tick complete"
        );
        report
    }

    /// Enqueue keep-set positions that are neither resident nor pending.
    fn request_missing(&mut self, center: BlockPosition) -> Vec<BlockPosition> {
        let mut missing: Vec<BlockPosition> = self
            .keep_set
            .iter()
            .filter(|p| !self.loaded.contains_key(p) && !self.pending.contains(p))
            .copied()
            .collect();
        missing.sort_by_key(|p| (p.chebyshev(center), p.y, p.x));

        let mut enqueued = Vec::with_capacity(missing.len());
        for pos in missing {
            if let Err(err) = self.loader.enqueue(pos) {
                tracing::error!(block = %pos, error = %err, "cannot request block");
                break;
            }
            tracing::debug!(block = %pos, "block requested");
            self.pending.insert(pos);
            enqueued.push(pos);
        }
        enqueued
    }

    fn accept(
        &mut self,
        bundle: BlockBundle,
        gpu: &mut impl GpuBuffers,
        physics: &mut impl PhysicsWorld,
    ) -> Acceptance {
        let pos = bundle.position;
        self.pending.remove(&pos);

        if self.loaded.contains_key(&pos) {
            tracing::debug!(block = %pos, "bundle for resident block discarded");
            return Acceptance::AlreadyResident;
        }
        if !self.keep_set.contains(&pos) {
            tracing::debug!(block = %pos, "bundle outside keep-set discarded");
            return Acceptance::OutOfRange;
        }

        let block = Block {
            id: bundle.block_id,
            position: pos,
        };
        self.loaded.insert(pos, block);
        self.resident.write().insert(pos);
        gpu.upload_block(&bundle);
        physics.add_static_surface(block.id, &bundle.collision_meshes());
        tracing::debug!(block = %pos, id = ?block.id, entities = bundle.entities.len(), "block accepted");
        Acceptance::Accepted
    }

    fn evict(
        &mut self,
        gpu: &mut impl GpuBuffers,
        physics: &mut impl PhysicsWorld,
    ) -> Vec<BlockPosition> {
        let mut evict: Vec<BlockPosition> = self
            .loaded
            .keys()
            .filter(|p| !self.keep_set.contains(p))
            .copied()
            .collect();
        evict.sort();

        for pos in &evict {
            let Some(block) = self.loaded.remove(pos) else {
                continue;
            };
            self.resident.write().remove(pos);
            gpu.release_block(block.id);
            physics.remove_surface(block.id);
            tracing::debug!(block = %pos, "block evicted");
        }
        evict
    }

    fn record(&mut self, report: &TickReport, started: Instant) {
        let elapsed = started.elapsed();
        let stats = &mut self.stats;
        stats.ticks += 1;
        stats.keep_set_changes += u64::from(report.keep_set_changed);
        stats.total_enqueued += report.enqueued.len() as u64;
        stats.total_dropped += report.dropped.len() as u64;
        stats.total_accepted += u64::from(report.accepted.is_some());
        stats.total_rejected += u64::from(report.rejected.is_some());
        stats.total_evicted += report.evicted.len() as u64;
        stats.resident_blocks = self.loaded.len();
        stats.pending_blocks = self.pending.len();
        stats.last_tick_time = elapsed;
        self.timer.record(elapsed);
    }

    /// The resident working set.
    pub fn loaded_blocks(&self) -> impl Iterator<Item = &Block> {
        self.loaded.values()
    }

    pub fn block(&self, pos: BlockPosition) -> Option<&Block> {
        self.loaded.get(&pos)
    }

    pub fn is_resident(&self, pos: BlockPosition) -> bool {
        self.loaded.contains_key(&pos)
    }

    pub fn resident_count(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_pending(&self, pos: BlockPosition) -> bool {
        self.pending.contains(&pos)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn keep_set(&self) -> &HashSet<BlockPosition> {
        &self.keep_set
    }

    pub fn current_block(&self) -> Option<BlockPosition> {
        self.current
    }

    pub fn grid(&self) -> &BlockGrid {
        &self.grid
    }

    pub fn is_faulted(&self) -> bool {
        self.loader.is_faulted()
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn tick_timer(&self) -> &TickTimer {
        &self.timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{add_block, small_config, wait_until, world_source};
    use crate::headless::{HeadlessGpu, HeadlessPhysics};
    use crate::loader::LoadJob;
    use std::path::Path;
    use worldstream_assets::{FsAssetSource, MemoryAssetSource};
    use worldstream_common::{path_key, position_key};

    struct Harness {
        streamer: WorldStreamer,
        gpu: HeadlessGpu,
        physics: HeadlessPhysics,
    }

    impl Harness {
        fn new(source: MemoryAssetSource) -> Self {
            let mut streamer = WorldStreamer::new(&small_config(), Arc::new(source)).unwrap();
            streamer.start().unwrap();
            Self {
                streamer,
                gpu: HeadlessGpu::new(),
                physics: HeadlessPhysics::new(),
            }
        }

        fn tick(&mut self, x: f32, z: f32) -> TickReport {
            self.streamer
                .tick(Vec3::new(x, 0.0, z), &mut self.gpu, &mut self.physics)
        }

        /// Tick in place until nothing is pending.
        fn settle(&mut self, x: f32, z: f32) -> Vec<TickReport> {
            let mut reports = Vec::new();
            assert!(wait_until(|| {
                reports.push(self.tick(x, z));
                self.streamer.pending_count() == 0
            }));
            reports
        }
    }

    fn square(
        xs: std::ops::RangeInclusive<i32>,
        ys: std::ops::RangeInclusive<i32>,
    ) -> Vec<BlockPosition> {
        let mut out = Vec::new();
        for y in ys {
            for x in xs.clone() {
                out.push(BlockPosition::new(x, y));
            }
        }
        out.sort();
        out
    }

    #[test]
    fn crossing_a_block_boundary_loads_and_evicts_a_column() {
        let mut h = Harness::new(world_source(1, &square(2..=2, -1..=1)));

        let first = h.tick(50.0, 50.0);
        assert_eq!(first.current_block, BlockPosition::new(0, 0));
        assert!(first.keep_set_changed);
        let mut enqueued = first.enqueued.clone();
        assert_eq!(enqueued[0], BlockPosition::new(0, 0));
        enqueued.sort();
        assert_eq!(enqueued, square(-1..=1, -1..=1));

        h.settle(50.0, 50.0);
        assert_eq!(h.streamer.resident_count(), 9);

        let moved = h.tick(1050.0, 50.0);
        assert_eq!(moved.current_block, BlockPosition::new(1, 0));
        let mut enqueued = moved.enqueued.clone();
        enqueued.sort();
        assert_eq!(enqueued, square(2..=2, -1..=1));
        assert_eq!(moved.evicted, square(-1..=-1, -1..=1));
        for pos in &moved.evicted {
            assert!(!h.streamer.is_resident(*pos));
            assert!(!h.gpu.is_resident(position_key(*pos)));
            assert!(!h.physics.has_surface(position_key(*pos)));
        }

        h.settle(1050.0, 50.0);
        let mut resident: Vec<_> = h.streamer.loaded_blocks().map(|b| b.position).collect();
        resident.sort();
        assert_eq!(resident, square(0..=2, -1..=1));
        assert_eq!(h.streamer.stats().total_accepted, 12);
        assert_eq!(h.streamer.stats().total_evicted, 3);
    }

    #[test]
    fn at_most_one_bundle_is_accepted_per_tick() {
        let mut h = Harness::new(world_source(1, &[]));
        let reports = h.settle(0.0, 0.0);
        let accepted = reports.iter().filter(|r| r.accepted.is_some()).count();
        assert_eq!(accepted, 9);
        assert!(reports.len() >= 9);
    }

    #[test]
    fn resident_blocks_are_never_requested_again() {
        let mut h = Harness::new(world_source(2, &[]));
        h.tick(500.0, 500.0);
        h.settle(500.0, 500.0);

        // same block, different position: no recompute
        let report = h.tick(900.0, 100.0);
        assert!(!report.keep_set_changed);
        assert!(report.enqueued.is_empty());

        // neighbour block: only the new column is requested
        let report = h.tick(1500.0, 500.0);
        assert!(report.keep_set_changed);
        assert!(report.enqueued.iter().all(|p| p.x == 2));
        h.settle(1500.0, 500.0);

        // back again: the returning column is requested, nothing resident is
        let resident_before: HashSet<BlockPosition> =
            h.streamer.loaded_blocks().map(|b| b.position).collect();
        let report = h.tick(500.0, 500.0);
        assert_eq!(report.enqueued.len(), 3);
        assert!(report.enqueued.iter().all(|p| p.x == -1));
        assert!(report.enqueued.iter().all(|p| !resident_before.contains(p)));

        // ticking in place requests nothing further
        let again = h.tick(500.0, 500.0);
        assert!(!again.keep_set_changed);
        assert!(again.enqueued.is_empty());

        h.settle(500.0, 500.0);
        assert_eq!(h.streamer.resident_count(), 9);
        assert_eq!(h.streamer.stats().total_rejected, 0);
    }

    #[test]
    fn failed_block_is_requested_again_after_block_change() {
        let mut source = world_source(0, &[]);
        for pos in square(-1..=1, -1..=1) {
            if pos != BlockPosition::new(1, 1) && pos != BlockPosition::new(0, 0) {
                add_block(&mut source, pos, 1);
            }
        }
        let mut h = Harness::new(source);

        h.tick(0.0, 0.0);
        let reports = h.settle(0.0, 0.0);
        let missing = BlockPosition::new(1, 1);
        assert!(reports.iter().any(|r| r.dropped.contains(&missing)));
        assert_eq!(h.streamer.resident_count(), 8);
        assert!(!h.streamer.is_pending(missing));
        assert!(!h.streamer.is_faulted());

        let report = h.tick(1000.0, 0.0);
        assert!(report.enqueued.contains(&missing));
    }

    #[test]
    fn zero_size_heightmap_on_disk_costs_only_its_block() {
        let dir = tempfile::tempdir().unwrap();
        let broken = BlockPosition::new(0, 0);
        for pos in square(-1..=1, -1..=1) {
            let block = dir.path().join(format!("blocks/{pos}"));
            std::fs::create_dir_all(&block).unwrap();
            image::RgbaImage::from_pixel(2, 2, image::Rgba([30, 120, 30, 255]))
                .save(block.join("texture.png"))
                .unwrap();
            if pos == broken {
                // farbfeld header for a 0x0 image
                let mut empty = b"farbfeld".to_vec();
                empty.extend_from_slice(&[0; 8]);
                std::fs::write(block.join("heightmap.ff"), &empty).unwrap();
                std::fs::write(block.join("block.json"), r#"{ "heightmap": "heightmap.ff" }"#)
                    .unwrap();
            } else {
                image::RgbaImage::from_pixel(8, 8, image::Rgba([0x80, 0, 0, 255]))
                    .save(block.join("heightmap.png"))
                    .unwrap();
                std::fs::write(block.join("block.json"), "{}").unwrap();
            }
        }

        let source = Arc::new(FsAssetSource::new(dir.path()));
        let mut streamer = WorldStreamer::new(&small_config(), source).unwrap();
        streamer.start().unwrap();
        let (mut gpu, mut physics) = (HeadlessGpu::new(), HeadlessPhysics::new());
        let mut dropped = Vec::new();
        assert!(wait_until(|| {
            let report = streamer.tick(Vec3::new(500.0, 0.0, 500.0), &mut gpu, &mut physics);
            dropped.extend(report.dropped);
            streamer.pending_count() == 0
        }));

        assert!(!streamer.is_faulted());
        assert_eq!(dropped, vec![broken]);
        assert_eq!(streamer.resident_count(), 8);
        assert!(!streamer.is_resident(broken));
        assert_eq!(gpu.block_count(), 8);
    }

    #[test]
    fn identical_assets_are_shared_on_the_gpu() {
        let mut h = Harness::new(world_source(1, &[]));
        h.tick(0.0, 0.0);
        h.settle(0.0, 0.0);

        let rock = path_key(Path::new("meshes/rock.obj"));
        let stone = path_key(Path::new("textures/stone.png"));
        assert_eq!(h.gpu.block_count(), 9);
        assert_eq!(h.gpu.mesh_count(), 1);
        assert_eq!(h.gpu.mesh_refcount(rock), 9);
        assert_eq!(h.gpu.material_refcount(stone), 9);
        assert_eq!(h.physics.surface_count(), 9);

        h.tick(5000.0, 5000.0);
        assert_eq!(h.gpu.block_count(), 0);
        assert_eq!(h.gpu.mesh_count(), 0);
        assert_eq!(h.physics.surface_count(), 0);
    }

    #[test]
    fn bundles_for_abandoned_blocks_are_discarded() {
        let mut h = Harness::new(world_source(1, &[]));
        h.tick(0.0, 0.0);
        h.settle(10_000.0, 10_000.0);

        let stats = h.streamer.stats().clone();
        assert_eq!(h.streamer.resident_count(), 0);
        assert_eq!(stats.total_accepted, stats.total_evicted);
        assert_eq!(stats.total_accepted + stats.total_rejected, 9);
        // nothing exists around (10, 10)
        assert_eq!(stats.total_dropped, 9);
        assert_eq!(h.gpu.block_count(), 0);
    }

    #[test]
    fn accept_rejects_duplicates_and_strays() {
        let mut h = Harness::new(world_source(1, &[BlockPosition::new(4, 4)]));
        h.tick(0.0, 0.0);
        h.settle(0.0, 0.0);

        let config = small_config();
        let mut job = BlockLoadJob::new(
            Arc::new(world_source(1, &[BlockPosition::new(4, 4)])),
            TerrainRasterizer::new(TerrainSettings::from(&config)),
            BlockGrid::new(config.block_size),
            ResidentBlocks::default(),
        );

        let duplicate = job.load(&BlockPosition::new(0, 0)).unwrap();
        assert!(matches!(
            h.streamer.accept(duplicate, &mut h.gpu, &mut h.physics),
            Acceptance::AlreadyResident
        ));
        let stray = job.load(&BlockPosition::new(4, 4)).unwrap();
        assert!(matches!(
            h.streamer.accept(stray, &mut h.gpu, &mut h.physics),
            Acceptance::OutOfRange
        ));
        assert_eq!(h.gpu.block_count(), 9);
        assert!(!h.streamer.is_resident(BlockPosition::new(4, 4)));
    }

    #[test]
    fn resident_mirror_tracks_the_working_set() {
        let mut h = Harness::new(world_source(1, &[]));
        h.tick(0.0, 0.0);
        h.settle(0.0, 0.0);
        let mirror = h.streamer.resident.read().clone();
        let resident: HashSet<_> = h.streamer.loaded_blocks().map(|b| b.position).collect();
        assert_eq!(mirror, resident);
    }

    #[test]
    fn stats_count_ticks() {
        let mut h = Harness::new(world_source(0, &[]));
        h.tick(0.0, 0.0);
        h.tick(1.0, 1.0);
        let stats = h.streamer.stats();
        assert!(stats.ticks >= 2);
        assert_eq!(stats.keep_set_changes, 1);
        assert!(h.streamer.tick_timer().count() >= 2);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = StreamConfig {
            grid_spacing: 7,
            ..small_config()
        };
        assert!(WorldStreamer::new(&config, Arc::new(MemoryAssetSource::new())).is_err());
    }

    #[test]
    #[should_panic(expected = "before start")]
    fn tick_before_start_panics() {
        let mut streamer =
            WorldStreamer::new(&small_config(), Arc::new(MemoryAssetSource::new())).unwrap();
        streamer.tick(Vec3::ZERO, &mut HeadlessGpu::new(), &mut HeadlessPhysics::new());
    }
}
