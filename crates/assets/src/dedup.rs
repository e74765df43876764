use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use worldstream_common::{IdentifierCache, ResourceKey};

use crate::AssetError;
use crate::config::{ObjectConfig, read_config};
use crate::mesh::{MeshData, load_mesh};
use crate::pixels::PixelBuffer;
use crate::source::AssetSource;

/// Decoded surface description for an object.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub texture: Arc<PixelBuffer>,
    /// Resolved path the texture was decoded from.
    pub texture_path: PathBuf,
}

/// Mesh and material keys an object config resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedObject {
    pub mesh: ResourceKey,
    pub material: ResourceKey,
    pub collidable: bool,
}

/// Decoded resources produced by one load pass, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct DecodedResources {
    pub meshes: HashMap<ResourceKey, Arc<MeshData>>,
    pub materials: HashMap<ResourceKey, Arc<Material>>,
}

impl DecodedResources {
    pub fn mesh(&self, key: ResourceKey) -> Option<&Arc<MeshData>> {
        self.meshes.get(&key)
    }

    pub fn material(&self, key: ResourceKey) -> Option<&Arc<Material>> {
        self.materials.get(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty() && self.materials.is_empty()
    }
}

/// Load-pass-local cache making every mesh and texture decode at most once.
///
/// Create one per load request and drop it (via [`finish`](Self::finish))
/// when the request is done. It is deliberately not shared between requests:
/// cross-block sharing belongs to the GPU collaborator.
#[derive(Debug, Default)]
pub struct ResourceDeduplicator {
    resources: DecodedResources,
    objects: HashMap<ResourceKey, ResolvedObject>,
    mesh_decodes: usize,
    material_decodes: usize,
}

impl ResourceDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an object config to shared mesh/material keys, decoding only
    /// what this pass has not seen yet.
    pub fn resolve_object(
        &mut self,
        source: &dyn AssetSource,
        ids: &mut IdentifierCache,
        object_path: &Path,
    ) -> Result<ResolvedObject, AssetError> {
        let object_key = ids.key_for_path(&source.resolve(object_path));
        if let Some(resolved) = self.objects.get(&object_key) {
            return Ok(*resolved);
        }

        let config: ObjectConfig = read_config(source, object_path)?;
        let mesh = self.mesh(source, ids, &config.mesh)?;
        let material = self.material(source, ids, &config.texture)?;
        let resolved = ResolvedObject {
            mesh,
            material,
            collidable: config.collidable,
        };
        self.objects.insert(object_key, resolved);
        Ok(resolved)
    }

    /// Key of the mesh at `path`, decoding it on first use.
    pub fn mesh(
        &mut self,
        source: &dyn AssetSource,
        ids: &mut IdentifierCache,
        path: &Path,
    ) -> Result<ResourceKey, AssetError> {
        let key = ids.key_for_path(&source.resolve(path));
        if !self.resources.meshes.contains_key(&key) {
            let mesh = load_mesh(source, path)?;
            tracing::trace!(path = %path.display(), triangles = mesh.triangle_count(), "decoded mesh");
            self.resources.meshes.insert(key, Arc::new(mesh));
            self.mesh_decodes += 1;
        }
        Ok(key)
    }

    /// Key of the material textured by `path`, decoding it on first use.
    pub fn material(
        &mut self,
        source: &dyn AssetSource,
        ids: &mut IdentifierCache,
        path: &Path,
    ) -> Result<ResourceKey, AssetError> {
        let resolved = source.resolve(path);
        let key = ids.key_for_path(&resolved);
        if !self.resources.materials.contains_key(&key) {
            let texture = source.decode_image(path)?;
            self.resources.materials.insert(
                key,
                Arc::new(Material {
                    texture: Arc::new(texture),
                    texture_path: resolved,
                }),
            );
            self.material_decodes += 1;
        }
        Ok(key)
    }

    /// `(meshes, materials)` decoded so far in this pass.
    pub fn decode_counts(&self) -> (usize, usize) {
        (self.mesh_decodes, self.material_decodes)
    }

    pub fn resources(&self) -> &DecodedResources {
        &self.resources
    }

    pub fn finish(self) -> DecodedResources {
        self.resources
    }
}
