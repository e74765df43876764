use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::path::Path;
use std::sync::Arc;
use worldstream_assets::{AssetError, AssetSource, CollisionMesh, PixelBuffer};
use worldstream_common::StreamConfig;

/// Midpoint of the 24-bit height encoding; maps to height 0.
const HEIGHT_ZERO: f64 = (1u32 << 23) as f64;

/// Errors from rasterizing a block. Both mean "skip the block for now".
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    #[error("heightmap decode failed: {0}")]
    Heightmap(#[source] AssetError),
    #[error("base texture decode failed: {0}")]
    Texture(#[source] AssetError),
}

/// Terrain vertex, laid out for direct GPU upload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Grid parameters shared by every block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainSettings {
    pub block_size: u32,
    pub grid_spacing: u32,
    pub texture_tile_size: f32,
    pub height_range: f32,
}

impl TerrainSettings {
    /// Cells along one block edge.
    pub fn resolution(&self) -> u32 {
        (self.block_size / self.grid_spacing).max(1)
    }
}

impl From<&StreamConfig> for TerrainSettings {
    fn from(config: &StreamConfig) -> Self {
        Self {
            block_size: config.block_size,
            grid_spacing: config.grid_spacing,
            texture_tile_size: config.texture_tile_size,
            height_range: config.height_range,
        }
    }
}

/// Triangulated `(n+1) x (n+1)` height grid of one block.
///
/// Vertex `(i, j)` lives at index `j * (n + 1) + i`; `i` runs along X and
/// `j` along Z.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainMesh {
    pub vertices: Vec<TerrainVertex>,
    pub indices: Vec<u32>,
    resolution: u32,
    origin: Vec3,
}

impl TerrainMesh {
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Vertices per row.
    pub fn row_len(&self) -> u32 {
        self.resolution + 1
    }

    pub fn vertex(&self, i: u32, j: u32) -> &TerrainVertex {
        &self.vertices[(j * self.row_len() + i) as usize]
    }

    /// Height of grid vertex `(i, j)` relative to the block origin.
    pub fn height_at(&self, i: u32, j: u32) -> f32 {
        self.vertex(i, j).position[1] - self.origin.y
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// `(min, max)` vertex height relative to the block origin.
    pub fn height_bounds(&self) -> (f32, f32) {
        self.vertices
            .iter()
            .map(|v| v.position[1] - self.origin.y)
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), h| {
                (lo.min(h), hi.max(h))
            })
    }

    pub fn collision_mesh(&self) -> CollisionMesh {
        CollisionMesh {
            positions: self.vertices.iter().map(|v| Vec3::from(v.position)).collect(),
            indices: self.indices.clone(),
        }
    }
}

/// Rasterized terrain plus the texture it is drawn with.
#[derive(Debug, Clone)]
pub struct TerrainTile {
    pub mesh: TerrainMesh,
    pub texture: Arc<PixelBuffer>,
}

/// Turns height-encoding images into block meshes.
#[derive(Debug, Clone)]
pub struct TerrainRasterizer {
    settings: TerrainSettings,
}

impl TerrainRasterizer {
    pub fn new(settings: TerrainSettings) -> Self {
        assert!(settings.grid_spacing > 0, "grid_spacing must be positive");
        assert!(
            settings.texture_tile_size > 0.0,
            "texture_tile_size must be positive"
        );
        Self { settings }
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    /// Decode both images through `source` and build the block mesh.
    ///
    /// Returns an error instead of a partial tile when either image fails.
    pub fn rasterize(
        &self,
        source: &dyn AssetSource,
        heightmap: &Path,
        texture: &Path,
        offset: Vec3,
    ) -> Result<TerrainTile, TerrainError> {
        let heights = source.decode_image(heightmap).map_err(TerrainError::Heightmap)?;
        let texture = source.decode_image(texture).map_err(TerrainError::Texture)?;
        let mesh = self.build_mesh(&heights, offset);
        tracing::trace!(
            vertices = mesh.vertices.len(),
            triangles = mesh.triangle_count(),
            "rasterized terrain"
        );
        Ok(TerrainTile {
            mesh,
            texture: Arc::new(texture),
        })
    }

    /// Build the mesh for a block whose minimum corner sits at `offset`.
    pub fn build_mesh(&self, heightmap: &PixelBuffer, offset: Vec3) -> TerrainMesh {
        let n = self.settings.resolution();
        let row = n + 1;
        let spacing = self.settings.grid_spacing as f32;
        let tile = self.settings.texture_tile_size;

        let mut heights = vec![0.0f32; (row * row) as usize];
        for j in 0..row {
            for i in 0..row {
                // last row/column only stitches to the neighbour
                if i == n || j == n {
                    continue;
                }
                let px = (u64::from(i) * u64::from(heightmap.width()) / u64::from(row)) as u32;
                let py = (u64::from(j) * u64::from(heightmap.height()) / u64::from(row)) as u32;
                heights[(j * row + i) as usize] =
                    decode_height(heightmap.pixel(px, py), self.settings.height_range);
            }
        }

        let h = |i: i64, j: i64| -> f32 {
            if i < 0 || j < 0 || i > n as i64 || j > n as i64 {
                0.0
            } else {
                heights[(j as u32 * row + i as u32) as usize]
            }
        };

        let mut vertices = Vec::with_capacity(heights.len());
        for j in 0..row {
            for i in 0..row {
                let (ii, jj) = (i as i64, j as i64);
                let normal = Vec3::new(
                    h(ii - 1, jj) - h(ii + 1, jj),
                    2.0 * spacing,
                    h(ii, jj - 1) - h(ii, jj + 1),
                )
                .normalize();
                vertices.push(TerrainVertex {
                    position: [
                        offset.x + i as f32 * spacing,
                        offset.y + h(ii, jj),
                        offset.z + j as f32 * spacing,
                    ],
                    normal: normal.to_array(),
                    uv: [i as f32 * spacing / tile, j as f32 * spacing / tile],
                });
            }
        }

        let mut indices = Vec::with_capacity((n * n * 6) as usize);
        for j in 0..n {
            for i in 0..n {
                let tl = j * row + i;
                let tr = tl + 1;
                let bl = tl + row;
                let br = bl + 1;
                indices.extend_from_slice(&[tl, bl, tr, tr, bl, br]);
            }
        }

        TerrainMesh {
            vertices,
            indices,
            resolution: n,
            origin: offset,
        }
    }
}

/// Height encoded in the RGB channels of one heightmap pixel.
///
/// The 24-bit value is recentered around `2^23`, scaled to
/// `[-height_range, height_range)` and rounded to two decimals.
pub fn decode_height(rgba: [u8; 4], height_range: f32) -> f32 {
    let raw = (u32::from(rgba[0]) << 16) | (u32::from(rgba[1]) << 8) | u32::from(rgba[2]);
    let scaled = (f64::from(raw) - HEIGHT_ZERO) / HEIGHT_ZERO * f64::from(height_range);
    ((scaled * 100.0).round() / 100.0) as f32
}
