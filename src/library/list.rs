//! An in-memory host list with a text filter.

use crate::models::{ListEvent, SourceEntry, SourceList};

/// Entries plus the subset matching the current filter.
#[derive(Debug, Clone, Default)]
pub struct LibraryList {
    entries: Vec<SourceEntry>,
    filter: Option<String>,
    visible: Vec<usize>,
}

impl LibraryList {
    pub fn new(entries: Vec<SourceEntry>) -> Self {
        let mut list = Self {
            entries,
            filter: None,
            visible: Vec::new(),
        };
        list.apply_filter();
        list
    }

    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Replaces every entry. Returns the notification to forward.
    pub fn replace(&mut self, entries: Vec<SourceEntry>) -> ListEvent {
        self.entries = entries;
        self.apply_filter();
        ListEvent::Reloaded
    }

    pub fn clear(&mut self) -> ListEvent {
        self.entries.clear();
        self.visible.clear();
        ListEvent::Cleared
    }

    /// Keeps entries whose artist or title contains `filter`, ignoring case.
    /// An empty filter shows everything. Returns `None` if nothing changed.
    pub fn set_filter(&mut self, filter: Option<&str>) -> Option<ListEvent> {
        let filter = filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_lowercase);
        if filter == self.filter {
            return None;
        }
        self.filter = filter;
        self.apply_filter();
        Some(ListEvent::Reloaded)
    }

    fn apply_filter(&mut self) {
        self.visible = match &self.filter {
            None => (0..self.entries.len()).collect(),
            Some(needle) => self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| {
                    entry.artist.to_lowercase().contains(needle)
                        || entry.title.to_lowercase().contains(needle)
                })
                .map(|(i, _)| i)
                .collect(),
        };
    }
}

impl SourceList for LibraryList {
    fn len(&self) -> usize {
        self.visible.len()
    }

    fn get(&self, index: usize) -> Option<SourceEntry> {
        self.visible
            .get(index)
            .and_then(|i| self.entries.as_slice().get(*i))
            .cloned()
    }
}
