//! Directory scanner producing source entries from cover image files.
//!
//! Each image becomes one entry: the parent directory names the artist, the
//! file stem names the album and the full path is the artwork id.

use std::path::Path;

use anyhow::{bail, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::models::SourceEntry;

/// Configuration for the library scanner.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Whether to scan directories recursively.
    pub recursive: bool,
    /// Maximum directory depth (0 = unlimited).
    pub max_depth: usize,
    /// Whether to follow symbolic links.
    pub follow_symlinks: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            max_depth: 0, // unlimited
            follow_symlinks: false,
        }
    }
}

/// Whether `ext` names an image format the artwork store can decode.
pub fn is_artwork_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "jpg" | "jpeg" | "png" | "webp" | "gif" | "bmp" | "tiff" | "tif"
    )
}

#[derive(Debug, Clone, Default)]
pub struct LibraryScanner {
    config: ScanConfig,
}

impl LibraryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Lists every cover image under `dir`, sorted by path.
    pub fn scan(&self, dir: &Path) -> Result<Vec<SourceEntry>> {
        if !dir.is_dir() {
            bail!("Library path is not a directory: {}", dir.display());
        }

        let mut walker = WalkDir::new(dir).follow_links(self.config.follow_symlinks);
        if !self.config.recursive {
            walker = walker.max_depth(1);
        } else if self.config.max_depth > 0 {
            walker = walker.max_depth(self.config.max_depth);
        }

        let mut paths = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable library entry");
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            let ext = entry.path().extension().and_then(|e| e.to_str()).unwrap_or("");
            if is_artwork_extension(ext) {
                paths.push(entry.into_path());
            }
        }
        paths.sort();

        let entries: Vec<SourceEntry> = paths
            .iter()
            .map(|path| {
                let artist = path
                    .parent()
                    .filter(|parent| *parent != dir)
                    .and_then(|parent| parent.file_name())
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let title = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                SourceEntry::new(artist, title).with_artwork(path.to_string_lossy())
            })
            .collect();

        debug!(dir = %dir.display(), count = entries.len(), "Scanned library");
        Ok(entries)
    }
}
