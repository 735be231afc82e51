//! Covers: the items the flow displays and the fetcher loads artwork for.
//!
//! A cover is shared between the UI thread and the fetch worker as
//! `Arc<Cover>`. Its index is atomic and observable so that a queue holding
//! it can re-file it when the flow reorders covers.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Index of a cover that is not placed in the current list.
pub const UNPLACED: i32 = -1;

/// Arena handle of a cover inside the [`CoverCache`](crate::flow::CoverCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoverId(u32);

impl CoverId {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Position of this cover in its arena.
    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CoverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callback invoked with `(id, old_index, new_index)`.
pub type IndexListener<Id> = Arc<dyn Fn(Id, i32, i32) + Send + Sync>;

/// Token returned when subscribing to index changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Something with a mutable position that announces when it moves.
pub trait Indexable {
    type Id: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn id(&self) -> Self::Id;
    fn index(&self) -> i32;
    fn on_index_changed(&self, listener: IndexListener<Self::Id>) -> ListenerId;
    fn remove_index_listener(&self, listener: ListenerId);
}

impl<T: Indexable + ?Sized> Indexable for Arc<T> {
    type Id = T::Id;

    fn id(&self) -> Self::Id {
        (**self).id()
    }

    fn index(&self) -> i32 {
        (**self).index()
    }

    fn on_index_changed(&self, listener: IndexListener<Self::Id>) -> ListenerId {
        (**self).on_index_changed(listener)
    }

    fn remove_index_listener(&self, listener: ListenerId) {
        (**self).remove_index_listener(listener)
    }
}

pub struct Cover {
    id: CoverId,
    cache_key: String,
    label: String,
    artwork_id: Option<String>,
    sort_label: RwLock<String>,
    index: AtomicI32,
    /// Set while a fetch for this cover is outstanding.
    enqueued: Mutex<bool>,
    listeners: Mutex<Vec<(ListenerId, IndexListener<CoverId>)>>,
}

impl Cover {
    pub fn new(
        id: CoverId,
        cache_key: impl Into<String>,
        label: impl Into<String>,
        artwork_id: Option<String>,
    ) -> Self {
        Self {
            id,
            cache_key: cache_key.into(),
            label: label.into(),
            artwork_id,
            sort_label: RwLock::new(String::new()),
            index: AtomicI32::new(UNPLACED),
            enqueued: Mutex::new(false),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> CoverId {
        self.id
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn artwork_id(&self) -> Option<&str> {
        self.artwork_id.as_deref()
    }

    pub fn sort_label(&self) -> String {
        self.sort_label.read().clone()
    }

    pub fn set_sort_label(&self, label: impl Into<String>) {
        *self.sort_label.write() = label.into();
    }

    pub fn index(&self) -> i32 {
        self.index.load(Ordering::Acquire)
    }

    pub fn is_placed(&self) -> bool {
        self.index() >= 0
    }

    /// Moves the cover and notifies listeners if the index actually changed.
    ///
    /// Listeners run on the calling thread with no cover lock held, so they
    /// may lock whatever container is tracking this cover.
    pub fn set_index(&self, value: i32) {
        let old = self.index.swap(value, Ordering::AcqRel);
        if old == value {
            return;
        }
        let listeners: Vec<IndexListener<CoverId>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(self.id, old, value);
        }
    }

    pub fn is_enqueued(&self) -> bool {
        *self.enqueued.lock()
    }

    /// Marks the cover as enqueued. Returns false if it already was.
    pub fn try_mark_enqueued(&self) -> bool {
        let mut enqueued = self.enqueued.lock();
        if *enqueued {
            false
        } else {
            *enqueued = true;
            true
        }
    }

    pub fn clear_enqueued(&self) {
        *self.enqueued.lock() = false;
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl Indexable for Cover {
    type Id = CoverId;

    fn id(&self) -> CoverId {
        self.id
    }

    fn index(&self) -> i32 {
        Cover::index(self)
    }

    fn on_index_changed(&self, listener: IndexListener<CoverId>) -> ListenerId {
        let id = ListenerId::next();
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove_index_listener(&self, listener: ListenerId) {
        self.listeners.lock().retain(|(id, _)| *id != listener);
    }
}

impl fmt::Debug for Cover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cover")
            .field("id", &self.id)
            .field("cache_key", &self.cache_key)
            .field("index", &self.index())
            .field("enqueued", &self.is_enqueued())
            .finish()
    }
}

impl PartialEq for Cover {
    fn eq(&self, other: &Self) -> bool {
        self.cache_key == other.cache_key
    }
}

impl Eq for Cover {}
