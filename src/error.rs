//! Error types for the queue and artwork layers.

use std::path::PathBuf;

use thiserror::Error;

/// Index-tracking invariant violations raised by the priority map.
///
/// These are programmer errors: they mean an item's index bookkeeping has
/// gone out of sync with the map.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("item is already filed under key {key}")]
    Duplicate { key: i32 },
    #[error("no item filed under key {key}")]
    KeyNotFound { key: i32 },
    #[error("item is not filed in the queue")]
    NotFiled,
}

/// Failures while resolving or decoding artwork.
#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("failed to read artwork {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode artwork {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("artwork lookup panicked: {0}")]
    Panicked(String),
}
