//! Arena owning every cover the flow has ever shown.
//!
//! Covers are created the first time their cache key shows up in the source
//! list and are reused on every later reload. Each cover has a [`CoverSlot`]
//! next to it holding state that only the UI thread touches.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::actor::DisplayState;
use crate::models::{Cover, CoverId, SourceEntry};

/// Cache key of the cover shown when the list is empty.
pub const EMPTY_COVER_KEY: &str = "\u{0}empty";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtworkState {
    /// A lookup is queued or running.
    Pending,
    Loaded,
    /// Showing the default image, either never looked up or the lookup failed.
    Placeholder,
}

/// UI-thread state of one cover.
#[derive(Debug, Clone)]
pub struct CoverSlot {
    /// Alpha the cover was last drawn at.
    pub last_alpha: f64,
    pub visible: bool,
    pub opacity: u8,
    pub last_state: Option<DisplayState>,
    pub artwork: ArtworkState,
}

impl Default for CoverSlot {
    fn default() -> Self {
        Self {
            last_alpha: 0.0,
            visible: false,
            opacity: 0,
            last_state: None,
            artwork: ArtworkState::Placeholder,
        }
    }
}

#[derive(Default)]
pub struct CoverCache {
    covers: Vec<Arc<Cover>>,
    slots: Vec<CoverSlot>,
    by_key: HashMap<String, CoverId>,
}

impl CoverCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cover for `entry`, created if its key is new. The flag tells which.
    pub fn get_or_create(&mut self, entry: &SourceEntry) -> (Arc<Cover>, bool) {
        let key = entry.cache_key();
        if let Some(cover) = self.find(&key) {
            return (Arc::clone(cover), false);
        }
        let cover = self.insert(key, entry.label(), entry.artwork_id.clone());
        (cover, true)
    }

    /// The cover standing in for an empty list.
    pub fn placeholder(&mut self) -> Arc<Cover> {
        if let Some(cover) = self.find(EMPTY_COVER_KEY) {
            return Arc::clone(cover);
        }
        self.insert(EMPTY_COVER_KEY.to_string(), String::new(), None)
    }

    fn insert(&mut self, key: String, label: String, artwork_id: Option<String>) -> Arc<Cover> {
        let id = CoverId::new(self.covers.len() as u32);
        let cover = Arc::new(Cover::new(id, key.clone(), label, artwork_id));
        trace!(%id, key = %key.replace('\n', " - "), "Created cover");
        self.covers.push(Arc::clone(&cover));
        self.slots.push(CoverSlot::default());
        self.by_key.insert(key, id);
        cover
    }

    pub fn get(&self, id: CoverId) -> Option<&Arc<Cover>> {
        self.covers.get(id.slot())
    }

    pub fn find(&self, key: &str) -> Option<&Arc<Cover>> {
        self.by_key.get(key).and_then(|id| self.get(*id))
    }

    pub fn slot(&self, id: CoverId) -> Option<&CoverSlot> {
        self.slots.get(id.slot())
    }

    pub fn slot_mut(&mut self, id: CoverId) -> Option<&mut CoverSlot> {
        self.slots.get_mut(id.slot())
    }

    pub fn len(&self) -> usize {
        self.covers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.covers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Cover>> {
        self.covers.iter()
    }
}
