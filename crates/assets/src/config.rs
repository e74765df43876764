use glam::{Quat, Vec3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use worldstream_common::{BlockPosition, Transform};

use crate::AssetError;
use crate::source::AssetSource;

/// Read a config asset. `.yaml`/`.yml` are parsed as YAML, anything else as JSON.
pub fn read_config<T: DeserializeOwned>(
    source: &dyn AssetSource,
    path: &Path,
) -> Result<T, AssetError> {
    let text = source.read_text(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&text).map_err(|e| AssetError::Yaml {
            path: path.to_path_buf(),
            source: e,
        }),
        _ => serde_json::from_str(&text).map_err(|e| AssetError::Json {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Per-block description at `blocks/<x>_<y>/block.json`.
///
/// Terrain image paths are relative to the block directory; object paths are
/// relative to the asset root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockManifest {
    #[serde(default = "BlockManifest::default_heightmap")]
    pub heightmap: PathBuf,
    #[serde(default = "BlockManifest::default_texture")]
    pub texture: PathBuf,
    #[serde(default)]
    pub entities: Vec<PlacedObject>,
}

impl BlockManifest {
    fn default_heightmap() -> PathBuf {
        PathBuf::from("heightmap.png")
    }

    fn default_texture() -> PathBuf {
        PathBuf::from("texture.png")
    }

    /// Directory holding the assets of the block at `pos`.
    pub fn block_dir(pos: BlockPosition) -> PathBuf {
        PathBuf::from("blocks").join(pos.to_string())
    }

    /// Location of the manifest for the block at `pos`.
    pub fn path_for(pos: BlockPosition) -> PathBuf {
        Self::block_dir(pos).join("block.json")
    }
}

impl Default for BlockManifest {
    fn default() -> Self {
        Self {
            heightmap: Self::default_heightmap(),
            texture: Self::default_texture(),
            entities: Vec::new(),
        }
    }
}

/// A static object placed in a block, in block-local coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedObject {
    /// Object config path, relative to the asset root.
    pub object: PathBuf,
    #[serde(default)]
    pub translation: [f32; 3],
    /// Quaternion as `[x, y, z, w]`.
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
}

impl PlacedObject {
    pub fn transform(&self) -> Transform {
        transform_from_parts(self.translation, self.rotation, self.scale)
    }
}

/// A renderable object: one mesh, one texture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub mesh: PathBuf,
    pub texture: PathBuf,
    #[serde(default = "default_true")]
    pub collidable: bool,
}

/// Construction description of a dynamic game object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameObjectConfig {
    pub name: String,
    pub parts: Vec<GameObjectPart>,
    #[serde(default)]
    pub body: BodyConfig,
    #[serde(default)]
    pub vehicle: Option<VehicleConfig>,
}

/// One renderable part of a game object, relative to the object origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameObjectPart {
    pub object: PathBuf,
    #[serde(default)]
    pub offset: [f32; 3],
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
}

impl GameObjectPart {
    pub fn transform(&self) -> Transform {
        transform_from_parts(self.offset, self.rotation, self.scale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    Static,
    #[default]
    Dynamic,
    Kinematic,
}

/// Rigid body parameters handed to the physics collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyConfig {
    pub kind: BodyKind,
    pub mass: f32,
    pub friction: f32,
    pub restitution: f32,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            kind: BodyKind::Dynamic,
            mass: 1.0,
            friction: 0.5,
            restitution: 0.0,
        }
    }
}

/// Raycast-vehicle parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleConfig {
    pub wheels: Vec<WheelConfig>,
    #[serde(default)]
    pub max_engine_force: f32,
    #[serde(default)]
    pub max_brake_force: f32,
    /// Radians.
    #[serde(default)]
    pub max_steer_angle: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelConfig {
    /// Attachment point in object space.
    pub position: [f32; 3],
    pub radius: f32,
    #[serde(default = "default_suspension")]
    pub suspension_rest_length: f32,
    #[serde(default)]
    pub steering: bool,
    #[serde(default)]
    pub driven: bool,
}

fn transform_from_parts(translation: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Transform {
    Transform {
        position: Vec3::from(translation),
        rotation: Quat::from_array(rotation).normalize(),
        scale: Vec3::from(scale),
    }
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_true() -> bool {
    true
}

fn default_suspension() -> f32 {
    0.3
}
