use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Component, Path};

use crate::types::{BlockId, BlockPosition, ResourceKey};

/// Memoizing front for content-derived asset keys.
///
/// Repeated references to the same file collapse to the same key, which is
/// what lets the loader and the GPU collaborator share resources without
/// comparing paths. Bounded by the number of distinct asset files; block ids
/// are not memoized, see [`position_key`].
#[derive(Debug, Clone, Default)]
pub struct IdentifierCache {
    paths: HashMap<String, ResourceKey>,
}

impl IdentifierCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for a resolved asset path.
    pub fn key_for_path(&mut self, path: &Path) -> ResourceKey {
        let normalized = normalize_path(path);
        if let Some(key) = self.paths.get(&normalized) {
            return *key;
        }
        let key = ResourceKey(digest_u32(&[b"path:", normalized.as_bytes()]));
        self.paths.insert(normalized, key);
        key
    }

    /// Id for the block at `pos`. Computed on every call; positions are
    /// unbounded as the viewpoint roams, so they are not memoized.
    pub fn block_id(&self, pos: BlockPosition) -> BlockId {
        position_key(pos)
    }

    /// Number of memoized paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Uncached key derivation for a path.
pub fn path_key(path: &Path) -> ResourceKey {
    ResourceKey(digest_u32(&[b"path:", normalize_path(path).as_bytes()]))
}

/// Id for the block at `pos`.
///
/// A 32-bit digest prefix: distinct positions can collide, with probability
/// about `n² / 2³³` among `n` resident blocks. Consumers keyed by position
/// are unaffected; consumers keyed by id must tolerate a clash.
pub fn position_key(pos: BlockPosition) -> BlockId {
    BlockId(position_digest(pos))
}

/// Canonical string form of a path: `.` components dropped, `/` separators.
pub fn normalize_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::RootDir => parts.push(String::new()),
            Component::Prefix(p) => parts.push(p.as_os_str().to_string_lossy().into_owned()),
            Component::ParentDir => parts.push("..".into()),
            Component::Normal(s) => parts.push(s.to_string_lossy().replace('\\', "/")),
        }
    }
    if parts.len() == 1 && parts[0].is_empty() {
        return "/".into();
    }
    parts.join("/")
}

fn position_digest(pos: BlockPosition) -> u32 {
    digest_u32(&[b"block:", &pos.x.to_le_bytes(), &pos.y.to_le_bytes()])
}

fn digest_u32(chunks: &[&[u8]]) -> u32 {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    let result = hasher.finalize();
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&result[..4]);
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn same_path_same_key() {
        let mut ids = IdentifierCache::new();
        let a = ids.key_for_path(Path::new("objects/rock.json"));
        let b = ids.key_for_path(Path::new("objects/./rock.json"));
        assert_eq!(a, b);
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn different_paths_differ() {
        let mut ids = IdentifierCache::new();
        let a = ids.key_for_path(Path::new("objects/rock.json"));
        let b = ids.key_for_path(Path::new("objects/tree.json"));
        assert_ne!(a, b);
    }

    #[test]
    fn cached_and_uncached_agree() {
        let mut ids = IdentifierCache::new();
        let path = PathBuf::from("meshes/crate.obj");
        assert_eq!(ids.key_for_path(&path), path_key(&path));

        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn block_ids_are_stable_and_not_memoized() {
        let pos = BlockPosition::new(-3, 7);
        let ids = IdentifierCache::new();
        assert_eq!(ids.block_id(pos), position_key(pos));
        assert_eq!(position_key(pos), position_key(pos));
        assert!(ids.is_empty());
        assert_ne!(position_key(pos), position_key(BlockPosition::new(7, -3)));
    }

    #[test]
    fn neighbouring_blocks_get_distinct_ids() {
        let mut seen = std::collections::HashSet::new();
        for x in -5..=5 {
            for y in -5..=5 {
                assert!(seen.insert(position_key(BlockPosition::new(x, y))));
            }
        }
    }

    #[test]
    fn normalize_drops_cur_dir() {
        assert_eq!(normalize_path(Path::new("./a/./b.png")), "a/b.png");
        assert_eq!(normalize_path(Path::new("/")), "/");
        assert_eq!(normalize_path(Path::new("/root/x")), "/root/x");
    }
}
