use std::path::PathBuf;
use worldstream_assets::{BodyConfig, CollisionMesh, DecodedResources, VehicleConfig};
use worldstream_common::{BlockId, BlockPosition, ResourceKey, Transform};
use worldstream_terrain::TerrainTile;

/// A placed instance of a shared mesh and material.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: u32,
    pub mesh: ResourceKey,
    pub material: ResourceKey,
    pub transform: Transform,
    pub collidable: bool,
}

/// Everything the consumer needs to make one world block resident.
///
/// Produced once by the block loader and moved to the consumer on drain.
#[derive(Debug, Clone)]
pub struct BlockBundle {
    pub block_id: BlockId,
    pub position: BlockPosition,
    pub terrain: TerrainTile,
    /// Static entities, with world-space transforms.
    pub entities: Vec<Entity>,
    pub resources: DecodedResources,
}

impl BlockBundle {
    /// Static collision geometry: the terrain plus every collidable entity.
    pub fn collision_meshes(&self) -> Vec<CollisionMesh> {
        let mut meshes = Vec::with_capacity(1 + self.entities.len());
        meshes.push(self.terrain.mesh.collision_mesh());
        for entity in self.entities.iter().filter(|e| e.collidable) {
            if let Some(mesh) = self.resources.mesh(entity.mesh) {
                meshes.push(CollisionMesh::from_mesh(mesh, &entity.transform));
            }
        }
        meshes
    }
}

/// Request to construct a dynamic game object.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    /// Game object config, relative to the asset root.
    pub config: PathBuf,
    pub spawn: Transform,
}

impl SpawnRequest {
    pub fn new(config: impl Into<PathBuf>, spawn: Transform) -> Self {
        Self {
            config: config.into(),
            spawn,
        }
    }
}

/// Data the physics collaborator needs to build a body (and optionally a
/// vehicle) for a game object.
#[derive(Debug, Clone, PartialEq)]
pub struct GameObjectConstruction {
    pub name: String,
    pub spawn: Transform,
    pub body: BodyConfig,
    pub vehicle: Option<VehicleConfig>,
    /// Collidable part geometry in object space.
    pub collision: Vec<CollisionMesh>,
}

#[derive(Debug, Clone)]
pub struct GameObjectBundle {
    pub request: SpawnRequest,
    /// Render entities, with world-space transforms at the spawn point.
    pub entities: Vec<Entity>,
    pub resources: DecodedResources,
    pub construction: GameObjectConstruction,
}
