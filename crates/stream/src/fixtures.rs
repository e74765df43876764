//! Shared test worlds.

use std::thread;
use std::time::{Duration, Instant};
use worldstream_assets::{MemoryAssetSource, PixelBuffer};
use worldstream_common::{BlockPosition, StreamConfig};

pub const TRI: &str = "v 0 0 0\nv 1 0 0\nv 0 0 1\nf 1 3 2\n";

/// 1000-unit blocks rasterized at a 4x4 grid.
pub fn small_config() -> StreamConfig {
    StreamConfig {
        block_size: 1000,
        max_adjacent_blocks: 1,
        grid_spacing: 250,
        ..StreamConfig::default()
    }
}

/// Memory source with the shared rock and tree objects and no blocks.
pub fn object_source() -> MemoryAssetSource {
    MemoryAssetSource::new()
        .with_text("meshes/rock.obj", TRI)
        .with_text("meshes/wheel.obj", TRI)
        .with_image("textures/stone.png", PixelBuffer::solid(2, 2, [90, 90, 90, 255]))
        .with_text(
            "objects/rock.json",
            r#"{ "mesh": "meshes/rock.obj", "texture": "textures/stone.png" }"#,
        )
        .with_text(
            "objects/wheel.json",
            r#"{ "mesh": "meshes/wheel.obj", "texture": "textures/stone.png", "collidable": false }"#,
        )
}

/// Add a block at `pos` whose manifest places `rocks` copies of the rock.
pub fn add_block(source: &mut MemoryAssetSource, pos: BlockPosition, rocks: usize) {
    let dir = format!("blocks/{pos}");
    let entities: Vec<String> = (0..rocks)
        .map(|i| {
            format!(
                r#"{{ "object": "objects/rock.json", "translation": [{}, 0, 10] }}"#,
                10 * (i + 1)
            )
        })
        .collect();
    source.insert_text(
        format!("{dir}/block.json"),
        format!(r#"{{ "entities": [{}] }}"#, entities.join(", ")),
    );
    // 0x800000 decodes to height 0
    source.insert_image(
        format!("{dir}/heightmap.png"),
        PixelBuffer::solid(8, 8, [0x80, 0, 0, 255]),
    );
    source.insert_image(
        format!("{dir}/texture.png"),
        PixelBuffer::solid(2, 2, [30, 120, 30, 255]),
    );
}

/// Memory source holding every block in the square `[-r, r]²` plus `extra`.
pub fn world_source(radius: i32, extra: &[BlockPosition]) -> MemoryAssetSource {
    let mut source = object_source();
    for x in -radius..=radius {
        for y in -radius..=radius {
            add_block(&mut source, BlockPosition::new(x, y), 1);
        }
    }
    for pos in extra {
        add_block(&mut source, *pos, 1);
    }
    source
}

/// Poll `cond` until it holds or five seconds pass.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}
