use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use tempfile::tempdir;

use coverflow::artwork::{DiskArtworkStore, FetchMode, MemoryArtworkStore};
use coverflow::flow::{ActorCall, ArtworkState, CoverManager, FlowEvent, RecordingSink};
use coverflow::library::{LibraryList, LibraryScanner};
use coverflow::{FlowConfig, SourceEntry, SourceList};

const FRAME: Duration = Duration::from_millis(34);

fn albums(titles: &[&str]) -> Vec<SourceEntry> {
    titles
        .iter()
        .map(|title| SourceEntry::new("Various", *title).with_artwork(*title))
        .collect()
}

fn settle(
    manager: &mut CoverManager<LibraryList>,
    sink: &mut RecordingSink,
    mut now: Instant,
) -> Instant {
    for _ in 0..2_000 {
        now += FRAME;
        manager.tick_at(now, sink);
        if !manager.is_transitioning() && !manager.timeline().can_play() {
            break;
        }
    }
    now
}

#[test]
fn filtering_to_three_keeps_the_centred_cover() {
    let titles = ["a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7", "a8", "a9"];
    let config = FlowConfig::new()
        .visible_covers(5)
        .fetch_mode(FetchMode::Inline);
    let mut manager = CoverManager::new(
        LibraryList::new(albums(&titles)),
        Arc::new(MemoryArtworkStore::new()),
        config,
    );
    let mut sink = RecordingSink::new();
    let start = Instant::now();
    manager.reload_now(start, &mut sink);
    manager.set_target_index(4);
    let now = settle(&mut manager, &mut sink, start);
    let centred = manager.current_cover().map(|c| c.id()).unwrap();

    let event = manager
        .source_mut()
        .replace(albums(&["a3b", "a4", "a5b"]));
    manager.handle_list_event(event, now);
    let mut now = now + Duration::from_millis(260);
    manager.tick_at(now, &mut sink);

    assert!(manager.is_transitioning());
    assert_eq!(manager.target_index(), 1);
    assert_eq!(manager.covers()[1].id(), centred);
    assert!((manager.timeline().progress() - 0.5).abs() < 1e-12);
    let plan = manager.transition_plan().unwrap();
    assert_eq!(plan.slides.len(), 1);
    assert_eq!(plan.fade_in.len(), 2);
    let events = manager.drain_events();
    assert!(events.contains(&FlowEvent::TargetIndexChanged(1)));
    assert!(events.contains(&FlowEvent::NewCurrentCover(centred)));

    now = settle(&mut manager, &mut sink, now);
    assert!(manager.drain_events().contains(&FlowEvent::CoversChanged));
    assert!(!manager.timeline().is_paused());

    // Clearing the list leaves the placeholder on stage.
    let event = manager.source_mut().clear();
    manager.handle_list_event(event, now);
    settle(&mut manager, &mut sink, now + Duration::from_millis(260));
    assert_eq!(manager.covers().len(), 1);
    assert!(manager.covers()[0].artwork_id().is_none());
}

fn write_cover(path: &Path, shade: u8) {
    RgbaImage::from_pixel(32, 24, Rgba([shade, shade, shade, 255]))
        .save(path)
        .unwrap();
}

#[test]
fn scanned_library_loads_artwork_in_background() {
    let library = tempdir().unwrap();
    let cache = tempdir().unwrap();
    for (artist, album, shade) in [
        ("Can", "Ege Bamyasi", 10),
        ("Can", "Tago Mago", 60),
        ("Neu", "Neu 75", 120),
        ("Faust", "IV", 200),
    ] {
        let dir = library.path().join(artist);
        std::fs::create_dir_all(&dir).unwrap();
        write_cover(&dir.join(format!("{album}.png")), shade);
    }
    std::fs::write(library.path().join("readme.txt"), "not a cover").unwrap();

    let entries = LibraryScanner::new().scan(library.path()).unwrap();
    assert_eq!(entries.len(), 4);

    let store = Arc::new(DiskArtworkStore::new(cache.path().to_path_buf(), 16));
    let config = FlowConfig::new()
        .visible_covers(5)
        .texture_size(16)
        .fetch_idle_timeout(Duration::from_millis(200));
    let mut manager = CoverManager::new(LibraryList::new(entries), store.clone(), config);
    let mut sink = RecordingSink::new();
    manager.reload_now(Instant::now(), &mut sink);

    let deadline = Instant::now() + Duration::from_secs(10);
    let loaded = |manager: &CoverManager<LibraryList>| {
        manager.covers().iter().all(|cover| {
            manager
                .cache()
                .slot(cover.id())
                .is_some_and(|slot| slot.artwork == ArtworkState::Loaded)
        })
    };
    while !loaded(&manager) && Instant::now() < deadline {
        manager.tick_at(Instant::now(), &mut sink);
        thread::sleep(Duration::from_millis(10));
    }
    assert!(loaded(&manager));
    assert_eq!(manager.source().len(), 4);
    assert_eq!(store.memory_entry_count(), 4);
    assert!(sink
        .calls
        .iter()
        .any(|call| matches!(call, ActorCall::SetArtwork(_, true))));
}
