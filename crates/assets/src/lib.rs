//! Asset layer: the asset-store contract, decoded resource types and the
//! per-load deduplication pass.
//!
//! Everything in this crate runs on the loader's worker thread. Nothing here
//! touches GPU or physics state.

mod config;
mod dedup;
mod mesh;
mod pixels;
mod source;

use std::path::PathBuf;

pub use config::{
    BlockManifest, BodyConfig, BodyKind, GameObjectConfig, GameObjectPart, ObjectConfig,
    PlacedObject, VehicleConfig, WheelConfig, read_config,
};
pub use dedup::{DecodedResources, Material, ResolvedObject, ResourceDeduplicator};
pub use mesh::{CollisionMesh, MeshData, MeshVertex, load_mesh, parse_obj};
pub use pixels::PixelBuffer;
pub use source::{AssetSource, FsAssetSource, MemoryAssetSource};

/// Errors from asset operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("asset not found: {0:?}")]
    NotFound(PathBuf),
    #[error("image decode error in {path:?}: {reason}")]
    Image { path: PathBuf, reason: String },
    #[error("JSON error in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("YAML error in {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("mesh error in {path:?}: {reason}")]
    Mesh { path: PathBuf, reason: String },
}

pub fn crate_info() -> &'static str {
    "worldstream-assets v0.1.0"
}
