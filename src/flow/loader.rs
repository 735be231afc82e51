//! Builds the ordered cover list from the host list.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::cache::CoverCache;
use crate::models::{Cover, SourceEntry, SourceList};

/// Sort order of the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Album,
    Artist,
}

impl SortBy {
    fn sort_key(self, entry: &SourceEntry) -> String {
        match self {
            SortBy::Album => format!("{}{}", entry.title, entry.artist),
            SortBy::Artist => format!("{}{}", entry.artist, entry.title),
        }
    }

    /// Label the flow shows for `entry` and derives its letter from.
    pub fn sort_label(self, entry: &SourceEntry) -> String {
        let label = match self {
            SortBy::Album => &entry.title,
            SortBy::Artist => &entry.artist,
        };
        if label.is_empty() {
            "?".to_string()
        } else {
            label.clone()
        }
    }

    fn compare(a: &str, b: &str) -> Ordering {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    }
}

/// First index of each leading letter in the cover list.
///
/// Labels starting with anything other than an ASCII letter file under `?`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LetterLookup {
    first: BTreeMap<char, usize>,
}

impl LetterLookup {
    pub fn letter_of(label: &str) -> char {
        match label.chars().next() {
            Some(c) if c.is_ascii_alphabetic() => c.to_ascii_uppercase(),
            _ => '?',
        }
    }

    pub fn build(covers: &[Arc<Cover>]) -> Self {
        let mut first = BTreeMap::new();
        for (position, cover) in covers.iter().enumerate() {
            first
                .entry(Self::letter_of(&cover.sort_label()))
                .or_insert(position);
        }
        Self { first }
    }

    /// Index of the first cover under `letter`, if any.
    pub fn get(&self, letter: char) -> Option<usize> {
        let letter = if letter.is_ascii_alphabetic() {
            letter.to_ascii_uppercase()
        } else {
            '?'
        };
        self.first.get(&letter).copied()
    }

    pub fn letters(&self) -> impl Iterator<Item = (char, usize)> + '_ {
        self.first.iter().map(|(c, i)| (*c, *i))
    }
}

/// Outcome of one load.
#[derive(Debug, Default)]
pub struct LoadedCovers {
    /// Covers in display order; each cover's index is its position.
    pub covers: Vec<Arc<Cover>>,
    /// Covers created by this load.
    pub created: Vec<Arc<Cover>>,
    /// Position in the host list of each cover, by display index.
    pub source_indices: Vec<usize>,
    pub letters: LetterLookup,
}

#[derive(Default)]
pub struct CoverLoader {
    cache: CoverCache,
    sort_by: SortBy,
}

impl CoverLoader {
    pub fn new(sort_by: SortBy) -> Self {
        Self {
            cache: CoverCache::new(),
            sort_by,
        }
    }

    pub fn cache(&self) -> &CoverCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut CoverCache {
        &mut self.cache
    }

    pub fn sort_by(&self) -> SortBy {
        self.sort_by
    }

    /// Returns true if the order changed.
    pub fn set_sort_by(&mut self, sort_by: SortBy) -> bool {
        let changed = self.sort_by != sort_by;
        self.sort_by = sort_by;
        changed
    }

    /// Reads `source` into a sorted, de-duplicated cover list.
    ///
    /// Entries sharing a cache key collapse onto one cover; the later entry
    /// wins the host position. Covers are reused from the cache when their
    /// key was seen before. Covers not placed by this load keep whatever
    /// index the caller left them at.
    pub fn load<S: SourceList + ?Sized>(&mut self, source: &S) -> LoadedCovers {
        let sort_by = self.sort_by;
        let mut sorted: BTreeMap<SortKey, (usize, Arc<Cover>)> = BTreeMap::new();
        let mut created = Vec::new();

        for position in 0..source.len() {
            let Some(entry) = source.get(position) else {
                continue;
            };
            let (cover, is_new) = self.cache.get_or_create(&entry);
            if is_new {
                created.push(Arc::clone(&cover));
            }
            cover.set_sort_label(sort_by.sort_label(&entry));
            let key = SortKey {
                order: sort_by.sort_key(&entry),
                cache_key: cover.cache_key().to_string(),
            };
            sorted.insert(key, (position, cover));
        }

        let mut covers = Vec::with_capacity(sorted.len());
        let mut source_indices = Vec::with_capacity(sorted.len());
        for (index, (position, cover)) in sorted.into_values().enumerate() {
            cover.set_index(index as i32);
            source_indices.push(position);
            covers.push(cover);
        }
        let letters = LetterLookup::build(&covers);

        debug!(
            count = covers.len(),
            created = created.len(),
            sort_by = ?sort_by,
            "Loaded covers"
        );
        LoadedCovers {
            covers,
            created,
            source_indices,
            letters,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct SortKey {
    order: String,
    cache_key: String,
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        SortBy::compare(&self.order, &other.order).then_with(|| self.cache_key.cmp(&other.cache_key))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
