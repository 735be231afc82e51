//! Artwork pipeline for the cover flow.
//!
//! - `ArtworkStore` - blocking lookup contract, with disk and memory stores
//! - `reflection` - mirrored reflection appended below loaded covers
//! - `ArtworkFetcher` - focus-ordered background worker

pub mod disk;
pub mod fetcher;
pub mod reflection;
pub mod store;

pub use disk::DiskArtworkStore;
pub use fetcher::{
    ArtworkFetcher, ArtworkFetcherBuilder, ArtworkUpdate, FetchMode, FetcherState,
};
pub use store::{Artwork, ArtworkStore, MemoryArtworkStore};
