//! Ordered map from slot index to a small bucket of items.
//!
//! Every item is filed under the index it reported when it was added and
//! appears at most once across all buckets. A reverse map from item id to
//! key keeps lookups, removals and re-filing at O(log n). Buckets that become
//! empty are pruned immediately.
//!
//! The map is not thread safe; [`FocusOrderedQueue`](super::FocusOrderedQueue)
//! wraps it in a mutex.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::trace;

use crate::error::QueueError;
use crate::models::Indexable;

pub struct IndexedPriorityMap<T: Indexable> {
    buckets: BTreeMap<i32, VecDeque<T>>,
    filed: HashMap<T::Id, i32>,
    /// Bumped on every add, remove and re-file. Pops do not count.
    revision: u64,
}

impl<T: Indexable + Clone> IndexedPriorityMap<T> {
    pub fn new() -> Self {
        Self {
            buckets: BTreeMap::new(),
            filed: HashMap::new(),
            revision: 0,
        }
    }

    /// Files `item` under its current index.
    pub fn add(&mut self, item: T) -> Result<(), QueueError> {
        if let Some(&key) = self.filed.get(&item.id()) {
            return Err(QueueError::Duplicate { key });
        }
        let key = item.index();
        self.file(key, item);
        self.revision += 1;
        Ok(())
    }

    /// Removes and returns the first item filed under `key`.
    pub fn pop_first(&mut self, key: i32) -> Result<T, QueueError> {
        let bucket = self
            .buckets
            .get_mut(&key)
            .ok_or(QueueError::KeyNotFound { key })?;
        let item = bucket
            .pop_front()
            .ok_or(QueueError::KeyNotFound { key })?;
        let now_empty = bucket.is_empty();
        if now_empty {
            self.buckets.remove(&key);
        }
        self.filed.remove(&item.id());
        Ok(item)
    }

    /// First item filed under `key`, if any.
    pub fn try_get(&self, key: i32) -> Option<&T> {
        self.buckets.get(&key).and_then(|bucket| bucket.front())
    }

    /// Removes a filed item wherever it currently sits.
    pub fn remove(&mut self, id: T::Id) -> Result<T, QueueError> {
        let key = self.filed.remove(&id).ok_or(QueueError::NotFiled)?;
        let item = self.unfile(key, id).ok_or(QueueError::NotFiled)?;
        self.revision += 1;
        Ok(item)
    }

    /// Moves a filed item to `new_key`. Returns false if the item is not
    /// filed or already sits under `new_key`.
    pub fn reindex(&mut self, id: T::Id, new_key: i32) -> bool {
        let Some(&old_key) = self.filed.get(&id) else {
            return false;
        };
        if old_key == new_key {
            return false;
        }
        let Some(item) = self.unfile(old_key, id) else {
            return false;
        };
        trace!(?id, old_key, new_key, "Re-filing queued item");
        self.file(new_key, item);
        self.revision += 1;
        true
    }

    pub fn contains(&self, id: T::Id) -> bool {
        self.filed.contains_key(&id)
    }

    /// Key an item is currently filed under.
    pub fn key_of(&self, id: T::Id) -> Option<i32> {
        self.filed.get(&id).copied()
    }

    /// Number of filed items.
    pub fn len(&self) -> usize {
        self.filed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filed.is_empty()
    }

    /// Number of non-empty keys.
    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn first_key(&self) -> Option<i32> {
        self.buckets.keys().next().copied()
    }

    pub fn last_key(&self) -> Option<i32> {
        self.buckets.keys().next_back().copied()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Empties the map, returning every item in key order.
    pub fn drain(&mut self) -> Vec<T> {
        let buckets = std::mem::take(&mut self.buckets);
        self.filed.clear();
        self.revision += 1;
        buckets.into_values().flatten().collect()
    }

    fn file(&mut self, key: i32, item: T) {
        self.filed.insert(item.id(), key);
        self.buckets.entry(key).or_default().push_back(item);
    }

    fn unfile(&mut self, key: i32, id: T::Id) -> Option<T> {
        let bucket = self.buckets.get_mut(&key)?;
        let position = bucket.iter().position(|item| item.id() == id)?;
        let item = bucket.remove(position);
        let now_empty = bucket.is_empty();
        if now_empty {
            self.buckets.remove(&key);
        }
        item
    }
}

impl<T: Indexable + Clone> Default for IndexedPriorityMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cover, CoverId};
    use std::sync::Arc;

    fn cover_at(raw: u32, index: i32) -> Arc<Cover> {
        let cover = Arc::new(Cover::new(CoverId::new(raw), format!("k{raw}"), "", None));
        cover.set_index(index);
        cover
    }

    #[test]
    fn test_add_and_pop_in_bucket_order() {
        let mut map = IndexedPriorityMap::new();
        let a = cover_at(0, 3);
        let b = cover_at(1, 3);
        map.add(Arc::clone(&a)).unwrap();
        map.add(Arc::clone(&b)).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.key_count(), 1);
        assert_eq!(map.try_get(3).map(|c| c.id()), Some(a.id()));
        assert_eq!(map.pop_first(3).unwrap().id(), a.id());
        assert_eq!(map.pop_first(3).unwrap().id(), b.id());
        assert!(map.is_empty());
        assert_eq!(map.key_count(), 0);
    }

    #[test]
    fn test_duplicate_add_fails() {
        let mut map = IndexedPriorityMap::new();
        let a = cover_at(0, 1);
        map.add(Arc::clone(&a)).unwrap();
        assert_eq!(map.add(Arc::clone(&a)), Err(QueueError::Duplicate { key: 1 }));

        // Still a duplicate after the item moved on its own.
        a.set_index(7);
        assert_eq!(map.add(a), Err(QueueError::Duplicate { key: 1 }));
    }

    #[test]
    fn test_pop_missing_key_fails() {
        let mut map: IndexedPriorityMap<Arc<Cover>> = IndexedPriorityMap::new();
        assert_eq!(map.pop_first(5).unwrap_err(), QueueError::KeyNotFound { key: 5 });
        assert!(map.try_get(5).is_none());
    }

    #[test]
    fn test_reindex_moves_and_prunes() {
        let mut map = IndexedPriorityMap::new();
        let a = cover_at(0, 2);
        map.add(Arc::clone(&a)).unwrap();
        let before = map.revision();

        assert!(map.reindex(a.id(), 9));
        assert!(map.revision() > before);
        assert!(map.try_get(2).is_none());
        assert_eq!(map.key_of(a.id()), Some(9));
        assert_eq!(map.first_key(), Some(9));
        assert!(!map.reindex(a.id(), 9));
    }

    #[test]
    fn test_pop_does_not_bump_revision() {
        let mut map = IndexedPriorityMap::new();
        map.add(cover_at(0, 0)).unwrap();
        let before = map.revision();
        map.pop_first(0).unwrap();
        assert_eq!(map.revision(), before);
    }

    #[test]
    fn test_remove_unfiled_fails() {
        let mut map = IndexedPriorityMap::new();
        let a = cover_at(0, 4);
        assert_eq!(map.remove(a.id()).unwrap_err(), QueueError::NotFiled);
        map.add(Arc::clone(&a)).unwrap();
        assert_eq!(map.remove(a.id()).unwrap().id(), a.id());
        assert!(!map.contains(a.id()));
    }

    #[test]
    fn test_items_never_in_two_buckets() {
        let mut map = IndexedPriorityMap::new();
        let covers: Vec<_> = (0..6).map(|i| cover_at(i, (i % 3) as i32)).collect();
        for c in &covers {
            map.add(Arc::clone(c)).unwrap();
        }
        for (step, c) in covers.iter().enumerate() {
            map.reindex(c.id(), (step as i32 * 7) % 5);
        }
        map.pop_first(map.first_key().unwrap()).unwrap();

        let drained = map.drain();
        let mut ids: Vec<_> = drained.iter().map(|c| c.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), drained.len());
        assert_eq!(drained.len(), 5);
    }
}
