//! Background artwork loading.
//!
//! One dedicated worker thread drains a [`FocusOrderedQueue`] of covers,
//! looks their artwork up in the [`ArtworkStore`] and posts the result on a
//! channel. The owner drains that channel on its own thread with
//! [`ArtworkFetcher::drain_updates`], which is the only place results touch
//! covers.
//!
//! The worker is started lazily by `enqueue` and stops itself after sitting
//! idle for `idle_timeout`; the next `enqueue` spawns a fresh one.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::reflection;
use super::store::{Artwork, ArtworkStore};
use crate::error::{ArtworkError, QueueError};
use crate::models::Cover;
use crate::queue::{Dequeued, FocusOrderedQueue};

/// Default edge length of requested artwork in pixels.
pub const DEFAULT_TEXTURE_SIZE: u32 = 256;

/// Default idle period after which the worker exits.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Nice value applied to the worker thread.
#[cfg(target_os = "linux")]
const WORKER_NICE: libc::c_int = 10;

/// Where lookups run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// On the dedicated worker thread.
    #[default]
    Threaded,
    /// Synchronously inside `enqueue`, on the caller's thread.
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Result of one lookup, handed to the owner thread.
#[derive(Debug)]
pub struct ArtworkUpdate {
    pub cover: Arc<Cover>,
    /// `None` when the lookup failed or found nothing.
    pub artwork: Option<Artwork>,
    /// Texture size the lookup was made at.
    pub size: u32,
}

struct Lifecycle {
    state: FetcherState,
    handle: Option<JoinHandle<()>>,
    /// Identifies the current worker; stale workers must not touch `state`.
    generation: u64,
}

struct Inner {
    queue: FocusOrderedQueue<Arc<Cover>>,
    store: Arc<dyn ArtworkStore>,
    pending_focus: Mutex<Option<i32>>,
    lifecycle: Mutex<Lifecycle>,
    texture_size: AtomicU32,
    idle_timeout: Duration,
    reflections: bool,
    updates_tx: Sender<ArtworkUpdate>,
}

impl Inner {
    fn process(&self, cover: &Arc<Cover>) -> ArtworkUpdate {
        let size = self.texture_size.load(Ordering::Relaxed);
        let artwork = match cover.artwork_id() {
            Some(id) => self.lookup(cover, id, size),
            None => None,
        };
        ArtworkUpdate {
            cover: Arc::clone(cover),
            artwork,
            size,
        }
    }

    fn lookup(&self, cover: &Cover, id: &str, size: u32) -> Option<Artwork> {
        trace!(cover = %cover.id(), id, size, "Looking up artwork");

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let found = self.store.lookup(id, size)?;
            Ok(match found {
                Some(artwork) if self.reflections => reflection::reflect(&artwork),
                other => other,
            })
        }))
        .unwrap_or_else(|payload| Err(ArtworkError::Panicked(panic_message(payload.as_ref()))));

        match result {
            Ok(artwork) => {
                if artwork.is_none() {
                    trace!(cover = %cover.id(), id, "No artwork found");
                }
                artwork
            }
            Err(e) => {
                warn!(cover = %cover.id(), id, error = ?e, "Artwork lookup failed");
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Marks the lifecycle stopped when a worker exits for any reason.
struct ExitGuard {
    inner: Arc<Inner>,
    generation: u64,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.generation == self.generation && lifecycle.state != FetcherState::Stopped {
            lifecycle.state = FetcherState::Stopped;
        }
    }
}

pub struct ArtworkFetcher {
    inner: Arc<Inner>,
    updates_rx: Receiver<ArtworkUpdate>,
    mode: FetchMode,
}

impl ArtworkFetcher {
    pub fn new(store: Arc<dyn ArtworkStore>) -> Self {
        ArtworkFetcherBuilder::new().build(store)
    }

    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    pub fn state(&self) -> FetcherState {
        self.inner.lifecycle.lock().state
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.state(),
            FetcherState::Starting | FetcherState::Running
        )
    }

    /// Covers waiting for the worker.
    pub fn pending_count(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn texture_size(&self) -> u32 {
        self.inner.texture_size.load(Ordering::Relaxed)
    }

    /// Size used for lookups from now on; already queued covers pick it up too.
    pub fn set_texture_size(&self, size: u32) {
        self.inner.texture_size.store(size.max(1), Ordering::Relaxed);
    }

    /// Queues `cover` for a lookup.
    ///
    /// Returns `Ok(false)` when the cover has no artwork id or a fetch for it
    /// is already outstanding.
    pub fn enqueue(&self, cover: &Arc<Cover>) -> Result<bool, QueueError> {
        if cover.artwork_id().is_none() || !cover.try_mark_enqueued() {
            return Ok(false);
        }

        match self.mode {
            FetchMode::Inline => {
                let update = self.inner.process(cover);
                // The receiver lives in `self`, so this cannot fail.
                let _ = self.inner.updates_tx.send(update);
            }
            FetchMode::Threaded => {
                if let Err(e) = self.inner.queue.enqueue(Arc::clone(cover)) {
                    cover.clear_enqueued();
                    return Err(e);
                }
                self.start();
            }
        }
        Ok(true)
    }

    /// Records the index the worker should favour. Applied before its next pop.
    pub fn set_focus(&self, index: i32) {
        match self.mode {
            FetchMode::Inline => self.inner.queue.set_focus(index),
            FetchMode::Threaded => *self.inner.pending_focus.lock() = Some(index),
        }
    }

    /// Spawns the worker unless one is already running.
    pub fn start(&self) {
        if self.mode == FetchMode::Inline {
            return;
        }

        let mut lifecycle = self.inner.lifecycle.lock();
        if matches!(
            lifecycle.state,
            FetcherState::Starting | FetcherState::Running
        ) {
            return;
        }

        let previous = lifecycle.handle.take();
        lifecycle.generation += 1;
        lifecycle.state = FetcherState::Starting;
        self.inner.queue.resume();

        let generation = lifecycle.generation;
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("artwork-fetcher".to_string())
            .spawn(move || worker_loop(inner, generation));

        match spawned {
            Ok(handle) => {
                lifecycle.handle = Some(handle);
                debug!(generation, "Started artwork worker");
            }
            Err(e) => {
                lifecycle.state = FetcherState::Stopped;
                error!(error = ?e, "Failed to spawn artwork worker");
            }
        }
        drop(lifecycle);

        // An idle worker that already exited on its own.
        if let Some(handle) = previous {
            let _ = handle.join();
        }
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// Queued covers stay queued and are picked up by the next `start`.
    pub fn stop(&self) {
        let handle = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.state == FetcherState::Stopped && lifecycle.handle.is_none() {
                return;
            }
            lifecycle.state = FetcherState::Stopping;
            self.inner.queue.stop();
            lifecycle.handle.take()
        };

        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Artwork worker panicked");
            }
        }

        self.inner.lifecycle.lock().state = FetcherState::Stopped;
        debug!("Stopped artwork worker");
    }

    /// Hands every finished lookup to `apply`, on the calling thread.
    ///
    /// The cover's enqueued flag is cleared before `apply` runs so a
    /// re-enqueue from inside `apply` is not swallowed.
    pub fn drain_updates<F>(&self, mut apply: F) -> usize
    where
        F: FnMut(ArtworkUpdate),
    {
        let mut count = 0;
        while let Ok(update) = self.updates_rx.try_recv() {
            update.cover.clear_enqueued();
            apply(update);
            count += 1;
        }
        count
    }

    /// Drops everything still queued and clears the covers' enqueued flags.
    pub fn clear_pending(&self) -> usize {
        let dropped = self.inner.queue.clear();
        for cover in &dropped {
            cover.clear_enqueued();
        }
        dropped.len()
    }
}

impl Drop for ArtworkFetcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(inner: Arc<Inner>, generation: u64) {
    let _guard = ExitGuard {
        inner: Arc::clone(&inner),
        generation,
    };
    lower_priority();

    {
        let mut lifecycle = inner.lifecycle.lock();
        if lifecycle.generation != generation || lifecycle.state != FetcherState::Starting {
            return;
        }
        lifecycle.state = FetcherState::Running;
    }
    debug!(generation, "Artwork worker running");

    loop {
        if let Some(focus) = inner.pending_focus.lock().take() {
            trace!(focus, "Applying fetch focus");
            inner.queue.set_focus(focus);
        }

        match inner.queue.dequeue_timeout(inner.idle_timeout) {
            Dequeued::Item(cover) => {
                let update = inner.process(&cover);
                if inner.updates_tx.send(update).is_err() {
                    debug!("Artwork owner gone, worker exiting");
                    break;
                }
            }
            Dequeued::Stopped => break,
            Dequeued::TimedOut => {
                // Decided under the lifecycle lock so a concurrent enqueue
                // either lands before the check or sees `Stopped` and respawns.
                let mut lifecycle = inner.lifecycle.lock();
                if lifecycle.generation == generation && inner.queue.is_empty() {
                    lifecycle.state = FetcherState::Stopped;
                    debug!(generation, "Artwork worker idle, exiting");
                    break;
                }
            }
        }
    }
}

/// Renices the calling worker thread.
///
/// Linux treats `PRIO_PROCESS` with `who = 0` as the calling thread. Other
/// unixes would renice the whole process, so they keep the default priority.
#[cfg(target_os = "linux")]
fn lower_priority() {
    // SAFETY: setpriority takes no pointers; on Linux `who = 0` names the calling thread.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, WORKER_NICE) };
    if rc != 0 {
        trace!("Could not lower artwork worker priority");
    }
}

#[cfg(not(target_os = "linux"))]
fn lower_priority() {}

/// Builder for [`ArtworkFetcher`].
pub struct ArtworkFetcherBuilder {
    texture_size: u32,
    idle_timeout: Duration,
    mode: FetchMode,
    reflections: bool,
}

impl ArtworkFetcherBuilder {
    pub fn new() -> Self {
        Self {
            texture_size: DEFAULT_TEXTURE_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            mode: FetchMode::Threaded,
            reflections: false,
        }
    }

    pub fn texture_size(mut self, size: u32) -> Self {
        self.texture_size = size.max(1);
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Append a mirrored reflection below every loaded cover.
    pub fn reflections(mut self, enabled: bool) -> Self {
        self.reflections = enabled;
        self
    }

    pub fn build(self, store: Arc<dyn ArtworkStore>) -> ArtworkFetcher {
        let (updates_tx, updates_rx) = flume::unbounded();
        let inner = Arc::new(Inner {
            queue: FocusOrderedQueue::new(),
            store,
            pending_focus: Mutex::new(None),
            lifecycle: Mutex::new(Lifecycle {
                state: FetcherState::Stopped,
                handle: None,
                generation: 0,
            }),
            texture_size: AtomicU32::new(self.texture_size),
            idle_timeout: self.idle_timeout,
            reflections: self.reflections,
            updates_tx,
        });
        ArtworkFetcher {
            inner,
            updates_rx,
            mode: self.mode,
        }
    }
}

impl Default for ArtworkFetcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
