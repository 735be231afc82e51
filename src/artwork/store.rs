//! Artwork lookup contract and an in-memory implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::RwLock;

use crate::error::ArtworkError;

/// Estimated bytes per pixel for RGBA artwork.
pub(crate) const BYTES_PER_PIXEL: usize = 4;

/// Decoded RGBA8 artwork ready to hand to a renderer.
#[derive(Clone, PartialEq, Eq)]
pub struct Artwork {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

impl Artwork {
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            pixels: image.into_raw().into(),
        }
    }

    /// Copies the pixels back into an image buffer.
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.to_vec())
    }

    pub fn memory_bytes(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

impl fmt::Debug for Artwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artwork")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Blocking artwork source. Only ever called from the fetch worker.
///
/// `Ok(None)` means the id has no artwork; the cover keeps its placeholder.
pub trait ArtworkStore: Send + Sync {
    fn lookup(&self, id: &str, size: u32) -> Result<Option<Artwork>, ArtworkError>;
}

impl<S: ArtworkStore + ?Sized> ArtworkStore for Arc<S> {
    fn lookup(&self, id: &str, size: u32) -> Result<Option<Artwork>, ArtworkError> {
        (**self).lookup(id, size)
    }
}

/// Store backed by artwork the host inserted up front.
#[derive(Default)]
pub struct MemoryArtworkStore {
    entries: RwLock<HashMap<String, Artwork>>,
    lookups: AtomicUsize,
}

impl MemoryArtworkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, artwork: Artwork) {
        self.entries.write().insert(id.into(), artwork);
    }

    /// Fills `id` with a solid square of `size` pixels.
    pub fn insert_solid(&self, id: impl Into<String>, size: u32, rgba: [u8; 4]) {
        let image = RgbaImage::from_pixel(size, size, image::Rgba(rgba));
        self.insert(id, Artwork::from_rgba(image));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of lookups served so far, hits and misses alike.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl ArtworkStore for MemoryArtworkStore {
    fn lookup(&self, id: &str, _size: u32) -> Result<Option<Artwork>, ArtworkError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.entries.read().get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artwork_round_trips_through_image() {
        let image = RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4]));
        let artwork = Artwork::from_rgba(image.clone());
        assert_eq!(artwork.memory_bytes(), 24);
        assert_eq!(artwork.to_image(), Some(image));
    }

    #[test]
    fn test_memory_store_hits_and_misses() {
        let store = MemoryArtworkStore::new();
        store.insert_solid("a", 4, [255, 0, 0, 255]);

        let hit = store.lookup("a", 256).unwrap().unwrap();
        assert_eq!((hit.width, hit.height), (4, 4));
        assert!(store.lookup("b", 256).unwrap().is_none());
        assert_eq!(store.lookup_count(), 2);
    }
}
