use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use coverflow::artwork::{Artwork, ArtworkFetcher, ArtworkStore, ArtworkUpdate, MemoryArtworkStore};
use coverflow::flow::CoverCache;
use coverflow::models::Cover;
use coverflow::{ArtworkError, SourceEntry};

/// Store that holds its first lookup until released and records the order
/// of every lookup.
struct GatedStore {
    started: flume::Sender<()>,
    gate: flume::Receiver<()>,
    order: Mutex<Vec<String>>,
}

impl ArtworkStore for GatedStore {
    fn lookup(&self, id: &str, _size: u32) -> Result<Option<Artwork>, ArtworkError> {
        let first = {
            let mut order = self.order.lock();
            order.push(id.to_string());
            order.len() == 1
        };
        if first {
            let _ = self.started.send(());
            let _ = self.gate.recv_timeout(Duration::from_secs(5));
        }
        Ok(None)
    }
}

fn covers(cache: &mut CoverCache, indices: &[i32]) -> Vec<Arc<Cover>> {
    indices
        .iter()
        .map(|index| {
            let entry = SourceEntry::new("artist", format!("at {index}")).with_artwork(index.to_string());
            let (cover, _) = cache.get_or_create(&entry);
            cover.set_index(*index);
            cover
        })
        .collect()
}

fn wait_for_updates(fetcher: &ArtworkFetcher, expected: usize) -> Vec<ArtworkUpdate> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut updates = Vec::new();
    while updates.len() < expected && Instant::now() < deadline {
        fetcher.drain_updates(|u| updates.push(u));
        thread::sleep(Duration::from_millis(5));
    }
    updates
}

#[test]
fn worker_serves_covers_nearest_to_focus_first() {
    let (started_tx, started_rx) = flume::bounded(1);
    let (gate_tx, gate_rx) = flume::bounded(1);
    let store = Arc::new(GatedStore {
        started: started_tx,
        gate: gate_rx,
        order: Mutex::new(Vec::new()),
    });
    let fetcher = ArtworkFetcher::new(store.clone());
    let mut cache = CoverCache::new();

    let blocker = covers(&mut cache, &[100]);
    fetcher.enqueue(&blocker[0]).unwrap();
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("worker never started");

    fetcher.set_focus(10);
    for cover in covers(&mut cache, &[15, 7, 11, 9]) {
        assert!(fetcher.enqueue(&cover).unwrap());
    }
    gate_tx.send(()).unwrap();

    let updates = wait_for_updates(&fetcher, 5);
    assert_eq!(updates.len(), 5);
    assert_eq!(*store.order.lock(), vec!["100", "9", "11", "7", "15"]);
    fetcher.stop();
}

#[test]
fn reindexed_cover_is_served_at_its_new_position() {
    let (started_tx, started_rx) = flume::bounded(1);
    let (gate_tx, gate_rx) = flume::bounded(1);
    let store = Arc::new(GatedStore {
        started: started_tx,
        gate: gate_rx,
        order: Mutex::new(Vec::new()),
    });
    let fetcher = ArtworkFetcher::new(store.clone());
    let mut cache = CoverCache::new();

    let blocker = covers(&mut cache, &[0]);
    fetcher.enqueue(&blocker[0]).unwrap();
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("worker never started");

    fetcher.set_focus(20);
    let queued = covers(&mut cache, &[18, 40]);
    for cover in &queued {
        fetcher.enqueue(cover).unwrap();
    }
    // The far cover moves next to the focus while still queued.
    queued[1].set_index(20);
    gate_tx.send(()).unwrap();

    wait_for_updates(&fetcher, 3);
    assert_eq!(*store.order.lock(), vec!["0", "40", "18"]);
}

#[test]
fn stop_waits_for_the_worker() {
    let store = Arc::new(MemoryArtworkStore::new());
    let fetcher = ArtworkFetcher::new(store.clone());
    let mut cache = CoverCache::new();
    for cover in covers(&mut cache, &[0, 1, 2, 3]) {
        store.insert_solid(cover.artwork_id().unwrap_or_default(), 4, [1, 1, 1, 255]);
        fetcher.enqueue(&cover).unwrap();
    }
    fetcher.stop();
    assert!(!fetcher.is_running());

    let served = store.lookup_count();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(store.lookup_count(), served);

    // Remaining covers are served once the worker comes back.
    fetcher.start();
    let updates = wait_for_updates(&fetcher, 4);
    assert_eq!(updates.len(), 4);
    assert!(updates.iter().all(|u| u.artwork.is_some()));
    assert_eq!(store.lookup_count(), 4);
}
