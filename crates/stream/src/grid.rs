use glam::{Vec2, Vec3};
use std::collections::HashSet;
use worldstream_common::BlockPosition;

/// Fixed-size square partitioning of the ground plane into blocks.
///
/// World X maps to block `x` and world Z to block `y`. Coordinates are
/// floored, so the block containing `-1.0` is `-1`, not `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGrid {
    block_size: u32,
}

impl BlockGrid {
    /// Create a grid with the given block side length.
    pub fn new(block_size: u32) -> Self {
        assert!(block_size > 0, "block_size must be positive");
        Self { block_size }
    }

    /// Block side length in world units.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Convert a ground-plane position to the block containing it.
    pub fn to_block_position(&self, world: Vec2) -> BlockPosition {
        let size = f64::from(self.block_size);
        BlockPosition {
            x: (f64::from(world.x) / size).floor() as i32,
            y: (f64::from(world.y) / size).floor() as i32,
        }
    }

    /// Block under a 3D viewpoint (Y is ignored).
    pub fn block_at(&self, viewpoint: Vec3) -> BlockPosition {
        self.to_block_position(Vec2::new(viewpoint.x, viewpoint.z))
    }

    /// World-space minimum corner of a block, at height 0.
    pub fn block_origin(&self, pos: BlockPosition) -> Vec3 {
        let size = self.block_size as f32;
        Vec3::new(pos.x as f32 * size, 0.0, pos.y as f32 * size)
    }

    /// All blocks within Chebyshev distance `radius` of `center`, inclusive.
    pub fn neighborhood(&self, center: BlockPosition, radius: u32) -> HashSet<BlockPosition> {
        let r = radius as i32;
        let side = (2 * radius as usize) + 1;
        let mut result = HashSet::with_capacity(side * side);
        for dx in -r..=r {
            for dy in -r..=r {
                result.insert(BlockPosition::new(center.x + dx, center.y + dy));
            }
        }
        result
    }
}
