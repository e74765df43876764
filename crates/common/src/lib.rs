//! Shared vocabulary for the streaming pipeline.
//!
//! # Invariants
//! - Identifier keys are derived from content only; the same path or block
//!   position produces the same key in every process.
//! - Configuration is passed explicitly; nothing here holds global state.

mod config;
mod ident;
mod types;

pub use config::{ConfigError, MAX_ADJACENT_BLOCKS, MAX_TERRAIN_RESOLUTION, StreamConfig};
pub use ident::{IdentifierCache, normalize_path, path_key, position_key};
pub use types::{BlockId, BlockPosition, ResourceKey, Transform};

pub fn crate_info() -> &'static str {
    "worldstream-common v0.1.0"
}
