//! Artwork store reading image files from disk, with disk and memory caches.
//!
//! - Disk cache: square PNG covers in `<cache>/<size>/<xxh3>.png`
//! - Memory cache: LRU of decoded artwork bounded by bytes
//!
//! The hash covers the artwork id, the source mtime and the requested size, so
//! editing a source image or changing the texture size never serves stale
//! pixels.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use image::imageops::FilterType;
use image::{ImageFormat, RgbaImage};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use xxhash_rust::xxh3::xxh3_64;

use super::store::{Artwork, ArtworkStore};
use crate::error::ArtworkError;

/// Default memory cache size in megabytes.
pub const DEFAULT_MAX_MEMORY_MB: usize = 64;

const MIN_MEMORY_MB: usize = 16;
const MAX_MEMORY_MB: usize = 512;

/// Bump when cover generation changes shape (crop, filter, format).
const COVER_CACHE_VERSION: u8 = 1;

const DEFAULT_LRU_CAPACITY: usize = 1024;

/// Hash identifying one generated cover on disk and in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CoverKey(u64);

impl CoverKey {
    fn new(id: &str, mtime: i64, size: u32) -> Self {
        let mut data = Vec::with_capacity(id.len() + 13);
        data.push(COVER_CACHE_VERSION);
        data.extend_from_slice(id.as_bytes());
        data.extend_from_slice(&mtime.to_le_bytes());
        data.extend_from_slice(&size.to_le_bytes());
        Self(xxh3_64(&data))
    }

    fn disk_filename(self) -> String {
        format!("{:016x}.png", self.0)
    }
}

struct MemoryCache {
    entries: LruCache<CoverKey, Artwork>,
    bytes: usize,
}

pub struct DiskArtworkStore {
    /// Base for relative artwork ids.
    root: Option<PathBuf>,
    cache_dir: PathBuf,
    max_memory_bytes: usize,
    memory: Mutex<MemoryCache>,
}

impl DiskArtworkStore {
    pub fn new(cache_dir: PathBuf, max_memory_mb: usize) -> Self {
        let max_memory_mb = max_memory_mb.clamp(MIN_MEMORY_MB, MAX_MEMORY_MB);

        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            warn!(?cache_dir, error = ?e, "Failed to create artwork cache directory");
        }
        debug!(?cache_dir, max_memory_mb, "Initialized artwork store");

        let capacity = NonZeroUsize::new(DEFAULT_LRU_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            root: None,
            cache_dir,
            max_memory_bytes: max_memory_mb * 1024 * 1024,
            memory: Mutex::new(MemoryCache {
                entries: LruCache::new(capacity),
                bytes: 0,
            }),
        }
    }

    /// Store using the per-user cache directory.
    pub fn new_default(max_memory_mb: usize) -> Result<Self> {
        Ok(Self::new(Self::default_cache_dir()?, max_memory_mb))
    }

    pub fn default_cache_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "coverflow")
            .context("Failed to determine project directories")?;
        Ok(proj_dirs.cache_dir().join("covers"))
    }

    /// Resolve relative artwork ids against `root`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn max_memory(&self) -> usize {
        self.max_memory_bytes
    }

    pub fn memory_usage(&self) -> usize {
        self.memory.lock().bytes
    }

    pub fn memory_entry_count(&self) -> usize {
        self.memory.lock().entries.len()
    }

    pub fn clear_memory(&self) {
        let mut memory = self.memory.lock();
        memory.entries.clear();
        memory.bytes = 0;
        debug!("Cleared artwork memory cache");
    }

    fn resolve(&self, id: &str) -> PathBuf {
        let path = Path::new(id);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn disk_path(&self, key: CoverKey, size: u32) -> PathBuf {
        self.cache_dir
            .join(size.to_string())
            .join(key.disk_filename())
    }

    fn load_cached(path: &Path) -> Option<Artwork> {
        match image::open(path) {
            Ok(image) => Some(Artwork::from_rgba(image.to_rgba8())),
            Err(e) => {
                warn!(?path, error = ?e, "Dropping unreadable cached cover");
                let _ = std::fs::remove_file(path);
                None
            }
        }
    }

    fn generate(src: &Path, dst: &Path, size: u32) -> Result<Artwork, ArtworkError> {
        debug!(?src, size, "Generating cover");
        let image = image::open(src).map_err(|source| ArtworkError::Decode {
            path: src.to_path_buf(),
            source,
        })?;
        let cover: RgbaImage = image
            .resize_to_fill(size, size, FilterType::CatmullRom)
            .to_rgba8();

        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ArtworkError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        if let Err(source) = cover.save_with_format(dst, ImageFormat::Png) {
            // The cover is still usable, only the disk layer missed it.
            warn!(?dst, error = ?source, "Failed to write cached cover");
        }

        Ok(Artwork::from_rgba(cover))
    }

    fn remember(&self, key: CoverKey, artwork: &Artwork) {
        let needed = artwork.memory_bytes();
        let mut memory = self.memory.lock();

        while memory.bytes + needed > self.max_memory_bytes {
            let Some((_, evicted)) = memory.entries.pop_lru() else {
                break;
            };
            memory.bytes = memory.bytes.saturating_sub(evicted.memory_bytes());
            trace!(
                evicted_bytes = evicted.memory_bytes(),
                current_bytes = memory.bytes,
                "Evicted cover from memory cache"
            );
        }

        if let Some(old) = memory.entries.put(key, artwork.clone()) {
            memory.bytes = memory.bytes.saturating_sub(old.memory_bytes());
        }
        memory.bytes += needed;
    }
}

impl ArtworkStore for DiskArtworkStore {
    fn lookup(&self, id: &str, size: u32) -> Result<Option<Artwork>, ArtworkError> {
        let src = self.resolve(id);
        let metadata = match std::fs::metadata(&src) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ArtworkError::Io { path: src, source }),
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let key = CoverKey::new(id, mtime, size);
        if let Some(artwork) = self.memory.lock().entries.get(&key).cloned() {
            trace!(id, "Memory cache hit");
            return Ok(Some(artwork));
        }

        let disk_path = self.disk_path(key, size);
        let artwork = match disk_path
            .exists()
            .then(|| Self::load_cached(&disk_path))
            .flatten()
        {
            Some(artwork) => {
                trace!(id, "Disk cache hit");
                artwork
            }
            None => Self::generate(&src, &disk_path, size)?,
        };

        self.remember(key, &artwork);
        Ok(Some(artwork))
    }
}
