//! The host library as the flow sees it: an ordered, read-only list of
//! entries plus clear/reload notifications.

/// Title used for entries the host could not name.
pub const UNKNOWN_TITLE: &str = "Unknown Album";

/// One entry of the host list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub artist: String,
    pub title: String,
    /// Identifier handed to the artwork store, if the entry has artwork.
    pub artwork_id: Option<String>,
}

impl SourceEntry {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            artwork_id: None,
        }
    }

    pub fn with_artwork(mut self, artwork_id: impl Into<String>) -> Self {
        self.artwork_id = Some(artwork_id.into());
        self
    }

    fn display_title(&self) -> &str {
        if self.title.is_empty() {
            UNKNOWN_TITLE
        } else {
            &self.title
        }
    }

    /// Identity of the cover built for this entry; stable across reloads.
    pub fn cache_key(&self) -> String {
        format!("{}\n{}", self.artist, self.display_title())
    }

    pub fn label(&self) -> String {
        format!("{}\n{}", self.artist, self.display_title())
    }
}

/// Notifications the host list emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEvent {
    Cleared,
    Reloaded,
}

/// Ordered collection the flow reads covers from. Never mutated by the flow.
pub trait SourceList {
    fn len(&self) -> usize;
    fn get(&self, index: usize) -> Option<SourceEntry>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SourceList for Vec<SourceEntry> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, index: usize) -> Option<SourceEntry> {
        self.as_slice().get(index).cloned()
    }
}

impl SourceList for [SourceEntry] {
    fn len(&self) -> usize {
        <[SourceEntry]>::len(self)
    }

    fn get(&self, index: usize) -> Option<SourceEntry> {
        <[SourceEntry]>::get(self, index).cloned()
    }
}
