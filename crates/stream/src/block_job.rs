use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use worldstream_assets::{AssetSource, BlockManifest, ResourceDeduplicator, read_config};
use worldstream_common::{BlockPosition, IdentifierCache, Transform};
use worldstream_terrain::TerrainRasterizer;

use crate::bundle::{BlockBundle, Entity};
use crate::grid::BlockGrid;
use crate::loader::{LoadError, LoadJob};

/// Positions of resident blocks, mirrored for the worker's dequeue check.
///
/// Written only by the consumer. The worker takes short read locks.
pub type ResidentBlocks = Arc<RwLock<HashSet<BlockPosition>>>;

/// Turns a block position into a [`BlockBundle`]: manifest, terrain and
/// deduplicated static entities.
pub struct BlockLoadJob {
    source: Arc<dyn AssetSource>,
    rasterizer: TerrainRasterizer,
    grid: BlockGrid,
    ids: IdentifierCache,
    resident: ResidentBlocks,
    next_entity_id: u32,
}

impl BlockLoadJob {
    pub fn new(
        source: Arc<dyn AssetSource>,
        rasterizer: TerrainRasterizer,
        grid: BlockGrid,
        resident: ResidentBlocks,
    ) -> Self {
        Self {
            source,
            rasterizer,
            grid,
            ids: IdentifierCache::new(),
            resident,
            next_entity_id: 0,
        }
    }

    fn next_entity_id(&mut self) -> u32 {
        self.next_entity_id += 1;
        self.next_entity_id
    }
}

impl LoadJob for BlockLoadJob {
    type Request = BlockPosition;
    type Bundle = BlockBundle;

    fn already_resident(&self, pos: &BlockPosition) -> bool {
        self.resident.read().contains(pos)
    }

    fn load(&mut self, pos: &BlockPosition) -> Result<BlockBundle, LoadError> {
        let _span = tracing::info_span!("load_block", block = %pos).entered();
        let source = Arc::clone(&self.source);
        let source = source.as_ref();
        let manifest: BlockManifest = read_config(source, &BlockManifest::path_for(*pos))?;

        let dir = BlockManifest::block_dir(*pos);
        let origin = self.grid.block_origin(*pos);
        let terrain = self.rasterizer.rasterize(
            source,
            &dir.join(&manifest.heightmap),
            &dir.join(&manifest.texture),
            origin,
        )?;

        let block_frame = Transform::from_position(origin);
        let mut dedup = ResourceDeduplicator::new();
        let mut entities = Vec::with_capacity(manifest.entities.len());
        for placed in &manifest.entities {
            let resolved = dedup.resolve_object(source, &mut self.ids, &placed.object)?;
            let id = self.next_entity_id();
            entities.push(Entity {
                id,
                mesh: resolved.mesh,
                material: resolved.material,
                transform: block_frame.compose(&placed.transform()),
                collidable: resolved.collidable,
            });
        }

        let (meshes, materials) = dedup.decode_counts();
        tracing::debug!(
            entities = entities.len(),
            meshes,
            materials,
            "block loaded"
        );
        Ok(BlockBundle {
            block_id: self.ids.block_id(*pos),
            position: *pos,
            terrain,
            entities,
            resources: dedup.finish(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{add_block, object_source, small_config};
    use glam::Vec3;
    use std::path::Path;
    use worldstream_assets::{FsAssetSource, MemoryAssetSource, PixelBuffer};
    use worldstream_common::position_key;
    use worldstream_terrain::{TerrainError, TerrainSettings};

    fn job(source: impl AssetSource + 'static) -> BlockLoadJob {
        let config = small_config();
        BlockLoadJob::new(
            Arc::new(source),
            TerrainRasterizer::new(TerrainSettings::from(&config)),
            BlockGrid::new(config.block_size),
            ResidentBlocks::default(),
        )
    }

    #[test]
    fn loads_terrain_and_entities_in_world_space() {
        let pos = BlockPosition::new(-1, 2);
        let mut source = object_source();
        add_block(&mut source, pos, 2);
        let mut job = job(source);

        let bundle = job.load(&pos).unwrap();
        assert_eq!(bundle.position, pos);
        assert_eq!(bundle.block_id, position_key(pos));
        assert_eq!(bundle.terrain.mesh.origin(), Vec3::new(-1000.0, 0.0, 2000.0));
        assert_eq!(bundle.terrain.mesh.resolution(), 4);
        assert_eq!(bundle.entities.len(), 2);
        assert_eq!(
            bundle.entities[1].transform.position,
            Vec3::new(-980.0, 0.0, 2010.0)
        );
        assert!(bundle.entities.iter().all(|e| e.collidable));
        // terrain plus two rocks
        assert_eq!(bundle.collision_meshes().len(), 3);
    }

    #[test]
    fn repeated_object_decodes_once() {
        let pos = BlockPosition::new(0, 0);
        let mut source = object_source();
        add_block(&mut source, pos, 5);
        let source = Arc::new(source);
        let mut job = job(Arc::clone(&source));

        let bundle = job.load(&pos).unwrap();
        assert_eq!(bundle.entities.len(), 5);
        assert_eq!(bundle.resources.meshes.len(), 1);
        assert_eq!(bundle.resources.materials.len(), 1);

        let first = &bundle.entities[0];
        let ids: HashSet<u32> = bundle.entities.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 5);
        for entity in &bundle.entities {
            assert_eq!(entity.mesh, first.mesh);
            assert_eq!(entity.material, first.material);
        }
        assert_eq!(source.read_count("meshes/rock.obj"), 1);
        assert_eq!(source.read_count("textures/stone.png"), 1);
    }

    #[test]
    fn entity_ids_keep_increasing_across_blocks() {
        let mut source = object_source();
        add_block(&mut source, BlockPosition::new(0, 0), 2);
        add_block(&mut source, BlockPosition::new(1, 0), 2);
        let mut job = job(source);

        let a = job.load(&BlockPosition::new(0, 0)).unwrap();
        let b = job.load(&BlockPosition::new(1, 0)).unwrap();
        let max_a = a.entities.iter().map(|e| e.id).max().unwrap();
        assert!(b.entities.iter().all(|e| e.id > max_a));
    }

    #[test]
    fn missing_manifest_is_an_asset_error() {
        let mut job = job(object_source());
        let err = job.load(&BlockPosition::new(5, 5)).unwrap_err();
        assert!(matches!(err, LoadError::Asset(_)));
    }

    #[test]
    fn undecodable_heightmap_fails_the_block() {
        let source = object_source().with_text("blocks/0_0/block.json", "{}").with_image(
            "blocks/0_0/texture.png",
            PixelBuffer::solid(1, 1, [0, 0, 0, 255]),
        );
        let mut job = job(source);
        let err = job.load(&BlockPosition::new(0, 0)).unwrap_err();
        assert!(matches!(err, LoadError::Terrain(TerrainError::Heightmap(_))));
    }

    #[test]
    fn resident_check_reads_the_shared_set() {
        let job = job(MemoryAssetSource::new());
        let pos = BlockPosition::new(3, -3);
        assert!(!job.already_resident(&pos));
        job.resident.write().insert(pos);
        assert!(job.already_resident(&pos));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let block = root.join("blocks/0_-1");
        std::fs::create_dir_all(&block).unwrap();
        std::fs::create_dir_all(root.join("objects")).unwrap();
        std::fs::create_dir_all(root.join("meshes")).unwrap();
        std::fs::create_dir_all(root.join("textures")).unwrap();

        std::fs::write(
            block.join("block.json"),
            r#"{ "heightmap": "height.png", "entities": [
                { "object": "objects/crate.json", "translation": [5, 1, 5] },
                { "object": "objects/./crate.json", "scale": [2, 2, 2] }
            ] }"#,
        )
        .unwrap();
        image::RgbaImage::from_pixel(16, 16, image::Rgba([0x80, 0x00, 0x00, 255]))
            .save(block.join("height.png"))
            .unwrap();
        image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 200, 10, 255]))
            .save(block.join("texture.png"))
            .unwrap();
        std::fs::write(
            root.join("objects/crate.json"),
            r#"{ "mesh": "meshes/crate.obj", "texture": "textures/wood.png" }"#,
        )
        .unwrap();
        std::fs::write(root.join("meshes/crate.obj"), crate::fixtures::TRI).unwrap();
        image::RgbaImage::from_pixel(2, 2, image::Rgba([120, 80, 40, 255]))
            .save(root.join("textures/wood.png"))
            .unwrap();

        let mut job = job(FsAssetSource::new(root));
        let bundle = job.load(&BlockPosition::new(0, -1)).unwrap();
        assert_eq!(bundle.entities.len(), 2);
        assert_eq!(bundle.entities[0].mesh, bundle.entities[1].mesh);
        assert_eq!(bundle.resources.meshes.len(), 1);
        assert_eq!(bundle.terrain.texture.pixel(0, 0), [10, 200, 10, 255]);
        assert_eq!(bundle.terrain.mesh.height_bounds(), (0.0, 0.0));
        let wood = bundle.resources.material(bundle.entities[0].material).unwrap();
        assert!(wood.texture_path.ends_with(Path::new("textures/wood.png")));
    }
}
