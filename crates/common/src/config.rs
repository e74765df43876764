use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors from loading or validating a [`StreamConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Largest terrain grid per block edge. Keeps `(n + 1)²` vertex indices in `u32`.
pub const MAX_TERRAIN_RESOLUTION: u32 = 4096;

/// Largest keep-set radius, in blocks.
pub const MAX_ADJACENT_BLOCKS: u32 = 64;

/// Startup configuration for the streaming pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Side length of a block in world units.
    pub block_size: u32,
    /// Chebyshev radius (in blocks) of the keep-set around the viewpoint.
    pub max_adjacent_blocks: u32,
    /// Distance between terrain grid vertices in world units.
    pub grid_spacing: u32,
    /// World-space size covered by one repetition of the terrain texture.
    pub texture_tile_size: f32,
    /// Terrain height multiplier applied to decoded heightmap values.
    pub height_range: f32,
    /// Root directory every asset path is resolved against.
    pub asset_root: PathBuf,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            block_size: 1000,
            max_adjacent_blocks: 1,
            grid_spacing: 10,
            texture_tile_size: 50.0,
            height_range: 200.0,
            asset_root: PathBuf::from("./assets"),
        }
    }
}

impl StreamConfig {
    /// Load and validate a config file. `.yaml`/`.yml` are parsed as YAML,
    /// anything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&text)?,
            _ => serde_json::from_str(&text)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be positive".into()));
        }
        if self.grid_spacing == 0 {
            return Err(ConfigError::Invalid("grid_spacing must be positive".into()));
        }
        if self.block_size % self.grid_spacing != 0 {
            return Err(ConfigError::Invalid(format!(
                "grid_spacing {} does not divide block_size {}",
                self.grid_spacing, self.block_size
            )));
        }
        let resolution = self.block_size / self.grid_spacing;
        if resolution > MAX_TERRAIN_RESOLUTION {
            return Err(ConfigError::Invalid(format!(
                "terrain resolution {resolution} exceeds {MAX_TERRAIN_RESOLUTION}"
            )));
        }
        if self.max_adjacent_blocks > MAX_ADJACENT_BLOCKS {
            return Err(ConfigError::Invalid(format!(
                "max_adjacent_blocks {} exceeds {MAX_ADJACENT_BLOCKS}",
                self.max_adjacent_blocks
            )));
        }
        if !self.texture_tile_size.is_finite() || self.texture_tile_size <= 0.0 {
            return Err(ConfigError::Invalid(
                "texture_tile_size must be positive".into(),
            ));
        }
        if !self.height_range.is_finite() {
            return Err(ConfigError::Invalid("height_range must be finite".into()));
        }
        Ok(())
    }

    /// Number of grid cells along one block edge.
    pub fn terrain_resolution(&self) -> u32 {
        (self.block_size / self.grid_spacing.max(1)).max(1)
    }
}
