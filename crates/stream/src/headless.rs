//! Bookkeeping-only collaborators for driving the pipeline without a GPU or
//! a physics engine. Used by the CLI and the tests.

use std::collections::HashMap;
use std::sync::Arc;
use worldstream_assets::{CollisionMesh, Material, MeshData, MeshVertex};
use worldstream_common::{BlockId, ResourceKey};
use worldstream_terrain::TerrainVertex;

use crate::arena::ResourceArena;
use crate::bundle::{BlockBundle, GameObjectConstruction};
use crate::collab::{EntityHandle, EntityUpload, GameObjectHandle, GpuBuffers, PhysicsWorld};

struct ResidentBlock {
    resources: Vec<(ResourceKey, ResourceKey)>,
    terrain_bytes: usize,
}

/// Tracks what a GPU backend would hold: shared mesh and material buffers
/// by key, plus per-block terrain buffers.
#[derive(Default)]
pub struct HeadlessGpu {
    meshes: ResourceArena<MeshData>,
    materials: ResourceArena<Material>,
    blocks: HashMap<BlockId, ResidentBlock>,
    entities: HashMap<EntityHandle, (ResourceKey, ResourceKey)>,
    next_entity: u64,
    uploads: usize,
}

impl HeadlessGpu {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(
        &mut self,
        mesh: (ResourceKey, &Arc<MeshData>),
        material: (ResourceKey, &Arc<Material>),
    ) {
        if self.meshes.acquire(mesh.0, || Arc::clone(mesh.1)) {
            self.uploads += 1;
        }
        if self.materials.acquire(material.0, || Arc::clone(material.1)) {
            self.uploads += 1;
        }
    }

    fn release(&mut self, mesh: ResourceKey, material: ResourceKey) {
        self.meshes.release(mesh);
        self.materials.release(material);
    }

    pub fn is_resident(&self, block: BlockId) -> bool {
        self.blocks.contains_key(&block)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Distinct meshes currently held.
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn mesh_refcount(&self, key: ResourceKey) -> u32 {
        self.meshes.refcount(key)
    }

    pub fn material_refcount(&self, key: ResourceKey) -> u32 {
        self.materials.refcount(key)
    }

    /// Mesh and material buffers created so far. Shared assets count once
    /// while they stay resident.
    pub fn upload_count(&self) -> usize {
        self.uploads
    }

    /// Bytes of resident terrain vertex and index data.
    pub fn terrain_bytes(&self) -> usize {
        self.blocks.values().map(|b| b.terrain_bytes).sum()
    }

    /// Bytes of resident shared mesh vertex and index data.
    pub fn mesh_bytes(&self) -> usize {
        self.meshes
            .values()
            .map(|mesh| {
                bytemuck::cast_slice::<MeshVertex, u8>(&mesh.vertices).len()
                    + bytemuck::cast_slice::<u32, u8>(&mesh.indices).len()
            })
            .sum()
    }
}

impl GpuBuffers for HeadlessGpu {
    fn upload_block(&mut self, bundle: &BlockBundle) {
        // ids are 32-bit digests, so two positions may share one
        if self.blocks.contains_key(&bundle.block_id) {
            tracing::warn!(
                block = ?bundle.block_id,
                position = %bundle.position,
                "block id already resident, upload skipped"
            );
            return;
        }
        let mut resources = Vec::with_capacity(bundle.entities.len());
        for entity in &bundle.entities {
            let (Some(mesh), Some(material)) = (
                bundle.resources.mesh(entity.mesh),
                bundle.resources.material(entity.material),
            ) else {
                tracing::warn!(entity = entity.id, "entity references missing resources");
                continue;
            };
            self.acquire((entity.mesh, mesh), (entity.material, material));
            resources.push((entity.mesh, entity.material));
        }
        let terrain = &bundle.terrain.mesh;
        let terrain_bytes = bytemuck::cast_slice::<TerrainVertex, u8>(&terrain.vertices).len()
            + bytemuck::cast_slice::<u32, u8>(&terrain.indices).len();
        tracing::trace!(block = ?bundle.block_id, entities = resources.len(), terrain_bytes, "uploaded block");
        self.blocks.insert(
            bundle.block_id,
            ResidentBlock {
                resources,
                terrain_bytes,
            },
        );
    }

    fn release_block(&mut self, block: BlockId) {
        let Some(resident) = self.blocks.remove(&block) else {
            tracing::warn!(?block, "release of unknown block");
            return;
        };
        for (mesh, material) in resident.resources {
            self.release(mesh, material);
        }
    }

    fn upload_entity(&mut self, upload: EntityUpload<'_>) -> EntityHandle {
        self.acquire(upload.mesh, upload.material);
        self.next_entity += 1;
        let handle = EntityHandle(self.next_entity);
        self.entities
            .insert(handle, (upload.mesh.0, upload.material.0));
        handle
    }

    fn release_entity(&mut self, handle: EntityHandle) {
        match self.entities.remove(&handle) {
            Some((mesh, material)) => self.release(mesh, material),
            None => tracing::warn!(?handle, "release of unknown entity"),
        }
    }
}

/// Registry of static surfaces and dynamic bodies.
#[derive(Debug, Default)]
pub struct HeadlessPhysics {
    surfaces: HashMap<BlockId, usize>,
    bodies: HashMap<GameObjectHandle, GameObjectConstruction>,
    next_body: u64,
}

impl HeadlessPhysics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_surface(&self, block: BlockId) -> bool {
        self.surfaces.contains_key(&block)
    }

    /// Triangle count of the surface registered for `block`.
    pub fn surface_triangles(&self, block: BlockId) -> Option<usize> {
        self.surfaces.get(&block).copied()
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn body(&self, handle: GameObjectHandle) -> Option<&GameObjectConstruction> {
        self.bodies.get(&handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

impl PhysicsWorld for HeadlessPhysics {
    fn add_static_surface(&mut self, block: BlockId, meshes: &[CollisionMesh]) {
        let triangles = meshes.iter().map(CollisionMesh::triangle_count).sum();
        if self.surfaces.insert(block, triangles).is_some() {
            tracing::warn!(?block, "static surface replaced");
        }
    }

    fn remove_surface(&mut self, block: BlockId) {
        if self.surfaces.remove(&block).is_none() {
            tracing::warn!(?block, "removal of unknown surface");
        }
    }

    fn construct_game_object(&mut self, info: &GameObjectConstruction) -> GameObjectHandle {
        self.next_body += 1;
        let handle = GameObjectHandle(self.next_body);
        self.bodies.insert(handle, info.clone());
        handle
    }

    fn destroy_game_object(&mut self, handle: GameObjectHandle) {
        if self.bodies.remove(&handle).is_none() {
            tracing::warn!(?handle, "destroy of unknown game object");
        }
    }
}
