//! Terrain rasterization: heightmap image + base texture -> block mesh.
//!
//! # Invariants
//! - The last row and column of every block grid sit at height 0 so
//!   neighbouring blocks stitch without cracks.
//! - Triangles wind counter-clockwise seen from above (+Y).

mod rasterizer;

pub use rasterizer::{
    TerrainError, TerrainMesh, TerrainRasterizer, TerrainSettings, TerrainTile, TerrainVertex,
    decode_height,
};

pub fn crate_info() -> &'static str {
    "worldstream-terrain v0.1.0"
}
