use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use worldstream_common::normalize_path;

use crate::AssetError;
use crate::pixels::PixelBuffer;

/// Synchronous asset store used by the loader worker.
///
/// Paths passed in are relative to the source's root (absolute paths are
/// used as-is). Implementations must be callable from the worker thread.
pub trait AssetSource: Send + Sync {
    /// Full path an asset reference resolves to. Identifier keys are derived
    /// from this, so two spellings of one file share a key.
    fn resolve(&self, path: &Path) -> PathBuf;

    /// Read a text asset (configs, OBJ meshes).
    fn read_text(&self, path: &Path) -> Result<String, AssetError>;

    /// Decode an image asset to RGBA8.
    fn decode_image(&self, path: &Path) -> Result<PixelBuffer, AssetError>;
}

impl<S: AssetSource + ?Sized> AssetSource for Arc<S> {
    fn resolve(&self, path: &Path) -> PathBuf {
        (**self).resolve(path)
    }

    fn read_text(&self, path: &Path) -> Result<String, AssetError> {
        (**self).read_text(path)
    }

    fn decode_image(&self, path: &Path) -> Result<PixelBuffer, AssetError> {
        (**self).decode_image(path)
    }
}

/// Asset source backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    root: PathBuf,
}

impl FsAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for FsAssetSource {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn read_text(&self, path: &Path) -> Result<String, AssetError> {
        let full = self.resolve(path);
        std::fs::read_to_string(&full).map_err(|e| match e.kind() {
            ErrorKind::NotFound => AssetError::NotFound(full.clone()),
            _ => AssetError::Io {
                path: full.clone(),
                source: e,
            },
        })
    }

    fn decode_image(&self, path: &Path) -> Result<PixelBuffer, AssetError> {
        let full = self.resolve(path);
        if !full.exists() {
            return Err(AssetError::NotFound(full));
        }
        let img = image::open(&full).map_err(|e| AssetError::Image {
            path: full.clone(),
            reason: e.to_string(),
        })?;
        let pixels = PixelBuffer::from_image(img.to_rgba8()).ok_or_else(|| AssetError::Image {
            path: full.clone(),
            reason: "image has zero size".into(),
        })?;
        tracing::trace!(path = %full.display(), "decoded image");
        Ok(pixels)
    }
}

/// In-memory asset source. Counts reads per path so callers can check how
/// often an asset was actually decoded.
#[derive(Debug, Default)]
pub struct MemoryAssetSource {
    texts: HashMap<String, String>,
    images: HashMap<String, PixelBuffer>,
    reads: Mutex<HashMap<String, usize>>,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.insert_text(path, text);
        self
    }

    pub fn with_image(mut self, path: impl AsRef<Path>, image: PixelBuffer) -> Self {
        self.insert_image(path, image);
        self
    }

    pub fn insert_text(&mut self, path: impl AsRef<Path>, text: impl Into<String>) {
        self.texts.insert(normalize_path(path.as_ref()), text.into());
    }

    pub fn insert_image(&mut self, path: impl AsRef<Path>, image: PixelBuffer) {
        self.images.insert(normalize_path(path.as_ref()), image);
    }

    /// How many times `path` was read or decoded.
    pub fn read_count(&self, path: impl AsRef<Path>) -> usize {
        self.reads
            .lock()
            .get(&normalize_path(path.as_ref()))
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, key: &str) {
        *self.reads.lock().entry(key.to_string()).or_default() += 1;
    }
}

impl AssetSource for MemoryAssetSource {
    fn resolve(&self, path: &Path) -> PathBuf {
        PathBuf::from(normalize_path(path))
    }

    fn read_text(&self, path: &Path) -> Result<String, AssetError> {
        let key = normalize_path(path);
        self.record(&key);
        self.texts
            .get(&key)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_path_buf()))
    }

    fn decode_image(&self, path: &Path) -> Result<PixelBuffer, AssetError> {
        let key = normalize_path(path);
        self.record(&key);
        self.images
            .get(&key)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_source_reads_text_and_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi").unwrap();
        image::RgbaImage::from_pixel(4, 2, image::Rgba([1, 2, 3, 255]))
            .save(dir.path().join("tex.png"))
            .unwrap();

        let source = FsAssetSource::new(dir.path());
        assert_eq!(source.read_text(Path::new("hello.txt")).unwrap(), "hi");
        let img = source.decode_image(Path::new("tex.png")).unwrap();
        assert_eq!((img.width(), img.height()), (4, 2));
        assert_eq!(img.pixel(3, 1), [1, 2, 3, 255]);
    }

    #[test]
    fn fs_source_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsAssetSource::new(dir.path());
        assert!(matches!(
            source.read_text(Path::new("nope.json")),
            Err(AssetError::NotFound(_))
        ));
        assert!(matches!(
            source.decode_image(Path::new("nope.png")),
            Err(AssetError::NotFound(_))
        ));
    }

    #[test]
    fn fs_source_rejects_corrupt_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.png"), b"not a png").unwrap();
        let source = FsAssetSource::new(dir.path());
        assert!(matches!(
            source.decode_image(Path::new("bad.png")),
            Err(AssetError::Image { .. })
        ));
    }

    #[test]
    fn fs_source_rejects_zero_size_images() {
        let dir = tempfile::tempdir().unwrap();
        // farbfeld header for a 0x0 image
        let mut empty = b"farbfeld".to_vec();
        empty.extend_from_slice(&[0; 8]);
        std::fs::write(dir.path().join("empty.ff"), &empty).unwrap();
        std::fs::write(dir.path().join("empty.ppm"), b"P6\n0 0\n255\n").unwrap();

        let source = FsAssetSource::new(dir.path());
        for name in ["empty.ff", "empty.ppm"] {
            assert!(matches!(
                source.decode_image(Path::new(name)),
                Err(AssetError::Image { .. })
            ));
        }
    }

    #[test]
    fn fs_source_resolves_relative_to_root() {
        let source = FsAssetSource::new("/data/world");
        assert_eq!(
            source.resolve(Path::new("objects/rock.json")),
            PathBuf::from("/data/world/objects/rock.json")
        );
        assert_eq!(
            source.resolve(Path::new("/abs/x.png")),
            PathBuf::from("/abs/x.png")
        );
    }

    #[test]
    fn memory_source_counts_reads() {
        let source = MemoryAssetSource::new()
            .with_text("a.json", "{}")
            .with_image("t.png", PixelBuffer::solid(1, 1, [0, 0, 0, 255]));
        source.read_text(Path::new("a.json")).unwrap();
        source.read_text(Path::new("./a.json")).unwrap();
        source.decode_image(Path::new("t.png")).unwrap();
        assert_eq!(source.read_count("a.json"), 2);
        assert_eq!(source.read_count("t.png"), 1);
        assert_eq!(source.read_count("missing"), 0);
        assert!(source.read_text(Path::new("missing")).is_err());
    }
}
