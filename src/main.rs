//! Headless cover flow demo.
//!
//! Scans a directory of cover images, drives the flow with a simulated frame
//! clock and logs what a renderer would be asked to draw.
//!
//! ```text
//! coverflow-demo --path ~/Music/covers --visible 9 --frames 300 --filter blue
//! ```

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use coverflow::artwork::{Artwork, DiskArtworkStore, FetchMode};
use coverflow::flow::{ActorSink, CoverManager, DisplayState, FlowEvent};
use coverflow::library::{LibraryList, LibraryScanner};
use coverflow::models::CoverId;
use coverflow::{FlowConfig, SourceList};

const FRAME: Duration = Duration::from_millis(33);
const DEFAULT_FRAMES: usize = 240;
const MEMORY_CACHE_MB: usize = 64;

#[derive(Debug, Clone)]
struct DemoArgs {
    path: PathBuf,
    visible: Option<usize>,
    texture_size: Option<u32>,
    frames: usize,
    filter: Option<String>,
    inline: bool,
}

fn parse_args() -> Result<DemoArgs> {
    let mut path = None;
    let mut visible = None;
    let mut texture_size = None;
    let mut frames = DEFAULT_FRAMES;
    let mut filter = None;
    let mut inline = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--path" => {
                let value = args.next().context("Missing value for --path")?;
                path = Some(PathBuf::from(value));
            }
            "--visible" => {
                let value = args.next().context("Missing value for --visible")?;
                visible = Some(
                    value
                        .parse()
                        .context("Failed to parse --visible as a positive integer")?,
                );
            }
            "--texture-size" => {
                let value = args.next().context("Missing value for --texture-size")?;
                texture_size = Some(
                    value
                        .parse()
                        .context("Failed to parse --texture-size as a positive integer")?,
                );
            }
            "--frames" => {
                let value = args.next().context("Missing value for --frames")?;
                frames = value
                    .parse()
                    .context("Failed to parse --frames as a non-negative integer")?;
            }
            "--filter" => {
                filter = Some(args.next().context("Missing value for --filter")?);
            }
            "--inline" => inline = true,
            other if !other.starts_with("--") && path.is_none() => {
                path = Some(PathBuf::from(other));
            }
            other => bail!("Unknown argument: {other}"),
        }
    }

    if texture_size == Some(0) {
        bail!("--texture-size must be greater than 0");
    }
    let path = path.context("Usage: coverflow-demo --path <directory> (or positional path)")?;
    Ok(DemoArgs {
        path,
        visible,
        texture_size,
        frames,
        filter,
        inline,
    })
}

/// Sink that logs what would be drawn.
#[derive(Default)]
struct LogSink {
    shown: HashSet<CoverId>,
    applied: usize,
    artwork_loaded: usize,
    artwork_missing: usize,
}

impl ActorSink for LogSink {
    fn apply(&mut self, id: CoverId, state: &DisplayState) {
        self.applied += 1;
        if self.shown.insert(id) {
            debug!(
                cover = %id,
                x = state.x,
                depth = state.depth,
                rotation = state.rotation_y,
                opacity = state.opacity,
                "Show"
            );
        }
    }

    fn hide(&mut self, id: CoverId) {
        if self.shown.remove(&id) {
            debug!(cover = %id, "Hide");
        }
    }

    fn set_opacity(&mut self, _id: CoverId, _opacity: u8) {}

    fn set_artwork(&mut self, id: CoverId, artwork: Option<&Artwork>) {
        match artwork {
            Some(artwork) => {
                self.artwork_loaded += 1;
                debug!(cover = %id, width = artwork.width, height = artwork.height, "Artwork");
            }
            None => self.artwork_missing += 1,
        }
    }

    fn restack(&mut self, _order: &[CoverId]) {}
}

fn log_events(manager: &mut CoverManager<LibraryList>) {
    for event in manager.drain_events() {
        match event {
            FlowEvent::NewCurrentCover(id) => {
                let label = manager
                    .cache()
                    .get(id)
                    .map(|cover| cover.label().replace('\n', " - "))
                    .unwrap_or_default();
                info!(cover = %id, %label, "Current cover");
            }
            other => debug!(event = ?other, "Flow event"),
        }
    }
}

fn run(args: DemoArgs) -> Result<()> {
    let entries = LibraryScanner::new()
        .scan(&args.path)
        .with_context(|| format!("Failed to scan {}", args.path.display()))?;
    info!(path = %args.path.display(), covers = entries.len(), "Scanned library");

    let store = Arc::new(
        DiskArtworkStore::new_default(MEMORY_CACHE_MB)
            .context("Failed to set up the artwork cache")?,
    );
    let mut config = FlowConfig::new().fetch_mode(if args.inline {
        FetchMode::Inline
    } else {
        FetchMode::Threaded
    });
    if let Some(visible) = args.visible {
        config = config.visible_covers(visible);
    }
    if let Some(size) = args.texture_size {
        config = config.texture_size(size);
    }

    let mut manager = CoverManager::new(LibraryList::new(entries), store.clone(), config);
    let mut sink = LogSink::default();
    let mut now = Instant::now();
    manager.reload_now(now, &mut sink);

    let sweep_at = args.frames / 3;
    let filter_at = args.frames * 2 / 3;
    for frame in 0..args.frames {
        if frame == sweep_at {
            let last = manager.source().len().saturating_sub(1);
            info!(index = last, "Scrolling to the end");
            manager.set_target_index(last as i64);
        }
        if frame == filter_at {
            if let Some(filter) = args.filter.as_deref() {
                if let Some(event) = manager.source_mut().set_filter(Some(filter)) {
                    info!(filter, "Filtering");
                    manager.handle_list_event(event, now);
                }
            }
        }

        now += FRAME;
        manager.tick_at(now, &mut sink);
        log_events(&mut manager);
        if !args.inline {
            thread::sleep(FRAME);
        }
    }

    info!(
        covers = manager.covers().len(),
        target_index = manager.target_index(),
        draws = sink.applied,
        artwork_loaded = sink.artwork_loaded,
        artwork_missing = sink.artwork_missing,
        memory_cache_bytes = store.memory_usage(),
        "Done"
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("coverflow=info".parse().unwrap()),
        )
        .init();

    let args = parse_args()?;
    run(args)
}
