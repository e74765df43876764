//! Contracts of the GPU and physics collaborators.
//!
//! Both are driven only from the consumer thread, after drain and evict
//! decisions. The loader worker never sees them.

use std::sync::Arc;
use worldstream_assets::{CollisionMesh, Material, MeshData};
use worldstream_common::{BlockId, ResourceKey};

use crate::bundle::{BlockBundle, Entity, GameObjectConstruction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GameObjectHandle(pub u64);

/// One entity together with the decoded resources it points at.
#[derive(Debug, Clone, Copy)]
pub struct EntityUpload<'a> {
    pub entity: &'a Entity,
    pub mesh: (ResourceKey, &'a Arc<MeshData>),
    pub material: (ResourceKey, &'a Arc<Material>),
}

/// GPU-resident buffer manager.
///
/// Implementations reference-count meshes and materials by key, so identical
/// assets uploaded by different blocks share one buffer.
pub trait GpuBuffers {
    fn upload_block(&mut self, bundle: &BlockBundle);
    fn release_block(&mut self, block: BlockId);
    fn upload_entity(&mut self, upload: EntityUpload<'_>) -> EntityHandle;
    fn release_entity(&mut self, handle: EntityHandle);
}

pub trait PhysicsWorld {
    fn add_static_surface(&mut self, block: BlockId, meshes: &[CollisionMesh]);
    fn remove_surface(&mut self, block: BlockId);
    fn construct_game_object(&mut self, info: &GameObjectConstruction) -> GameObjectHandle;
    fn destroy_game_object(&mut self, handle: GameObjectHandle);
}
