//! The cover flow coordinator.
//!
//! [`CoverManager`] owns the cover list, the timeline, the behaviour and the
//! artwork fetcher, and is driven from one thread by the host's periodic
//! callback through [`CoverManager::tick_at`].
//!
//! When the host list changes the manager reloads: it pauses the timeline,
//! reads the new list, picks a new target index, jumps the timeline there and
//! animates the changeover. Reloads requested while a changeover is running
//! are queued and replayed one by one as each changeover completes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace};

use super::actor::ActorSink;
use super::behaviour::{FlowBehaviour, Geometry, Motion};
use super::cache::{ArtworkState, CoverCache};
use super::loader::{CoverLoader, LetterLookup, SortBy};
use super::transition::{
    CoverFadeIn, CoverSlide, Transition, TransitionPlan, TransitionSets,
};
use crate::artwork::{ArtworkFetcher, ArtworkFetcherBuilder, ArtworkStore, ArtworkUpdate};
use crate::config::FlowConfig;
use crate::models::{Cover, CoverId, ListEvent, SourceList, UNPLACED};
use crate::timeline::{AdaptiveTimeline, TimelineEvent};

/// Notifications for the host, drained with [`CoverManager::drain_events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// A reload finished; the cover list is settled.
    CoversChanged,
    TargetIndexChanged(usize),
    /// The timeline arrived at the target and this cover is now current.
    NewCurrentCover(CoverId),
    LetterLookupChanged,
    VisibleCoversChanged(usize),
}

pub struct CoverManager<S: SourceList> {
    config: FlowConfig,
    source: S,
    loader: CoverLoader,
    fetcher: ArtworkFetcher,
    timeline: AdaptiveTimeline,
    behaviour: FlowBehaviour,
    covers: Vec<Arc<Cover>>,
    source_indices: Vec<usize>,
    target_index: usize,
    current_cover: Option<Arc<Cover>>,
    letters: LetterLookup,
    transition: Option<Transition>,
    queued_reloads: VecDeque<ListEvent>,
    /// Target requested while a changeover was running.
    pending_target: Option<i64>,
    /// Debounced list notification and when it fires.
    scheduled_reload: Option<(ListEvent, Instant)>,
    loaded: bool,
    /// Instant the running changeover was last advanced to.
    transition_clock: Option<Instant>,
    events: Vec<FlowEvent>,
}

impl<S: SourceList> CoverManager<S> {
    pub fn new(source: S, store: Arc<dyn ArtworkStore>, config: FlowConfig) -> Self {
        let fetcher = ArtworkFetcherBuilder::new()
            .texture_size(config.texture_size)
            .idle_timeout(config.fetch_idle_timeout)
            .mode(config.fetch_mode)
            .reflections(config.reflections)
            .build(store);
        let geometry = Geometry::new(
            config.stage_width,
            config.stage_height,
            config.min_cover_width,
            config.max_cover_width,
        );
        let behaviour = FlowBehaviour::new(geometry, config.visible_covers, config.texture_size);
        let timeline = AdaptiveTimeline::new(0, config.timeline_settings());

        Self {
            loader: CoverLoader::new(config.sort_by),
            config,
            source,
            fetcher,
            timeline,
            behaviour,
            covers: Vec::new(),
            source_indices: Vec::new(),
            target_index: 0,
            current_cover: None,
            letters: LetterLookup::default(),
            transition: None,
            queued_reloads: VecDeque::new(),
            pending_target: None,
            scheduled_reload: None,
            loaded: false,
            transition_clock: None,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access to the host list. Follow changes with
    /// [`handle_list_event`](Self::handle_list_event).
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn covers(&self) -> &[Arc<Cover>] {
        &self.covers
    }

    pub fn cache(&self) -> &CoverCache {
        self.loader.cache()
    }

    pub fn timeline(&self) -> &AdaptiveTimeline {
        &self.timeline
    }

    pub fn behaviour(&self) -> &FlowBehaviour {
        &self.behaviour
    }

    pub fn fetcher(&self) -> &ArtworkFetcher {
        &self.fetcher
    }

    pub fn target_index(&self) -> usize {
        self.target_index
    }

    pub fn current_cover(&self) -> Option<&Arc<Cover>> {
        self.current_cover.as_ref()
    }

    pub fn letter_lookup(&self) -> &LetterLookup {
        &self.letters
    }

    /// Position in the host list of the cover shown at `index`.
    pub fn source_index(&self, index: usize) -> Option<usize> {
        self.source_indices.get(index).copied()
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    pub fn transition_plan(&self) -> Option<&TransitionPlan> {
        self.transition.as_ref().map(Transition::plan)
    }

    pub fn queued_reloads(&self) -> usize {
        self.queued_reloads.len()
    }

    /// Takes the events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<FlowEvent> {
        std::mem::take(&mut self.events)
    }

    /// Schedules a reload after a host list notification.
    ///
    /// The reload runs `max_animation_span` after the last notification, so
    /// a burst of notifications costs one reload.
    pub fn handle_list_event(&mut self, event: ListEvent, now: Instant) {
        let deadline = now + self.config.max_animation_span;
        trace!(?event, "List changed, reload scheduled");
        self.scheduled_reload = Some((event, deadline));
    }

    /// Reloads right away, or queues the reload if a changeover is running.
    pub fn reload_now(&mut self, now: Instant, sink: &mut dyn ActorSink) {
        self.request_reload(ListEvent::Reloaded, now, sink);
    }

    fn request_reload(&mut self, event: ListEvent, now: Instant, sink: &mut dyn ActorSink) {
        if self.transition.is_some() {
            if self.queued_reloads.back() != Some(&event) {
                self.queued_reloads.push_back(event);
            }
            debug!(queued = self.queued_reloads.len(), "Reload queued behind running transition");
            return;
        }
        self.reload(now, sink);
    }

    /// Whether per-frame updates are suspended.
    pub fn holds_updates(&self) -> bool {
        self.timeline.is_paused() || self.transition.is_some() || !self.queued_reloads.is_empty()
    }

    /// Points the flow at `index`, clamped to the cover list.
    ///
    /// While a changeover runs the request is remembered and applied when it
    /// completes.
    pub fn set_target_index(&mut self, index: i64) {
        if self.transition.is_some() || !self.queued_reloads.is_empty() {
            trace!(index, "Target change postponed");
            self.pending_target = Some(index);
            return;
        }
        let target = self.retarget(index);
        self.timeline.set_target(target as i64);
    }

    /// Retargets to the cover cached under `cache_key`, if it is in the list.
    pub fn scroll_to(&mut self, cache_key: &str) -> bool {
        let Some(index) = self.loader.cache().find(cache_key).and_then(|cover| {
            let index = usize::try_from(cover.index()).ok()?;
            let listed = self.covers.get(index)?;
            (listed.id() == cover.id()).then_some(index)
        }) else {
            return false;
        };
        self.set_target_index(index as i64);
        true
    }

    /// Retargets to the first cover whose sort label starts with `letter`.
    pub fn scroll_to_letter(&mut self, letter: char) -> bool {
        match self.letters.get(letter) {
            Some(index) => {
                self.set_target_index(index as i64);
                true
            }
            None => false,
        }
    }

    pub fn set_sort_by(&mut self, sort_by: SortBy, now: Instant) {
        if self.loader.set_sort_by(sort_by) {
            self.config.sort_by = sort_by;
            self.handle_list_event(ListEvent::Reloaded, now);
        }
    }

    pub fn set_visible_covers(&mut self, count: usize, sink: &mut dyn ActorSink) {
        let count = FlowConfig::clamp_visible_covers(count);
        if count == self.config.visible_covers {
            return;
        }
        self.config.visible_covers = count;
        self.behaviour.set_visible_covers(count);
        self.events.push(FlowEvent::VisibleCoversChanged(count));
        self.refresh(sink);
    }

    pub fn set_stage_size(&mut self, width: f32, height: f32, sink: &mut dyn ActorSink) {
        self.config.stage_width = width;
        self.config.stage_height = height;
        self.behaviour.set_stage_size(width, height);
        self.refresh(sink);
    }

    /// Changes the texture size and requests fresh artwork for every cover.
    pub fn set_texture_size(&mut self, size: u32, sink: &mut dyn ActorSink) {
        let size = size.max(1);
        if size == self.config.texture_size {
            return;
        }
        self.config.texture_size = size;
        self.behaviour.set_texture_size(size);
        self.fetcher.set_texture_size(size);
        for cover in &self.covers {
            if let Some(slot) = self.loader.cache_mut().slot_mut(cover.id()) {
                slot.artwork = ArtworkState::Placeholder;
            }
            sink.set_artwork(cover.id(), None);
        }
        let covers = self.covers.clone();
        for cover in &covers {
            self.request_artwork(cover);
        }
        self.refresh(sink);
    }

    pub fn tick(&mut self, sink: &mut dyn ActorSink) {
        self.tick_at(Instant::now(), sink);
    }

    /// Runs one frame: due reloads, finished artwork, the changeover and the
    /// timeline, in that order.
    pub fn tick_at(&mut self, now: Instant, sink: &mut dyn ActorSink) {
        if let Some((event, deadline)) = self.scheduled_reload {
            if now >= deadline {
                self.scheduled_reload = None;
                self.request_reload(event, now, sink);
            }
        }

        self.apply_artwork(sink);

        if let Some(transition) = self.transition.as_mut() {
            // A changeover started this frame begins from zero.
            let dt = self
                .transition_clock
                .map_or(Duration::ZERO, |since| now.saturating_duration_since(since))
                .min(self.config.time_threshold);
            self.transition_clock = Some(now);
            let frame = transition.advance(dt, &self.behaviour, self.loader.cache_mut(), sink);
            for id in frame.shown {
                self.on_shown(id);
            }
            if frame.finished {
                self.complete_transition(now, sink);
            }
        }

        self.timeline.tick_at(now);
        for event in self.timeline.drain_events() {
            match event {
                TimelineEvent::NewFrame(progress) => {
                    if !self.holds_updates() {
                        self.draw(progress, sink);
                    }
                }
                TimelineEvent::TargetReached(target) => self.on_target_reached(target),
            }
        }
    }

    fn draw(&mut self, progress: f64, sink: &mut dyn ActorSink) {
        let motion = Motion {
            progress,
            delta: self.timeline.delta(),
            direction: self.timeline.direction(),
        };
        let shown =
            self.behaviour
                .update_actors(&self.covers, self.loader.cache_mut(), &motion, sink);
        for id in shown {
            self.on_shown(id);
        }
    }

    /// Redraws the window at the current progress after a layout change.
    fn refresh(&mut self, sink: &mut dyn ActorSink) {
        if self.holds_updates() {
            return;
        }
        let progress = self.timeline.progress();
        let total = self.covers.len();
        self.behaviour.set_previous_bounds(progress, total);
        if let Some(window) = self.behaviour.previous_bounds() {
            for cover in &self.covers {
                let outside = usize::try_from(cover.index())
                    .map_or(true, |index| !window.contains(index));
                let visible = self
                    .loader
                    .cache()
                    .slot(cover.id())
                    .is_some_and(|slot| slot.visible);
                if outside && visible {
                    self.behaviour.hide(cover.id(), self.loader.cache_mut(), sink);
                }
            }
        }
        self.draw(progress, sink);
    }

    fn on_target_reached(&mut self, target: usize) {
        if target != self.target_index {
            return;
        }
        let Some(cover) = self.covers.get(target) else {
            return;
        };
        if self
            .current_cover
            .as_ref()
            .is_some_and(|current| current.id() == cover.id())
        {
            return;
        }
        trace!(cover = %cover.id(), target, "New current cover");
        self.current_cover = Some(Arc::clone(cover));
        self.events.push(FlowEvent::NewCurrentCover(cover.id()));
    }

    /// Clamps and stores a new target index. Does not move the timeline.
    fn retarget(&mut self, index: i64) -> usize {
        let max = self.covers.len().saturating_sub(1) as i64;
        let target = index.clamp(0, max) as usize;
        if target != self.target_index {
            self.target_index = target;
            self.current_cover = None;
            self.events.push(FlowEvent::TargetIndexChanged(target));
        }
        self.fetcher.set_focus(target as i32);
        target
    }

    /// A cover became visible; fetch its artwork if it has none.
    fn on_shown(&mut self, id: CoverId) {
        let Some(cover) = self.loader.cache().get(id).cloned() else {
            return;
        };
        let needs_artwork = self
            .loader
            .cache()
            .slot(id)
            .is_some_and(|slot| slot.artwork == ArtworkState::Placeholder);
        if needs_artwork {
            self.request_artwork(&cover);
        }
    }

    fn request_artwork(&mut self, cover: &Arc<Cover>) {
        match self.fetcher.enqueue(cover) {
            Ok(true) => {
                if let Some(slot) = self.loader.cache_mut().slot_mut(cover.id()) {
                    slot.artwork = ArtworkState::Pending;
                }
            }
            Ok(false) => {}
            Err(e) => error!(cover = %cover.id(), error = %e, "Failed to queue artwork"),
        }
    }

    fn apply_artwork(&mut self, sink: &mut dyn ActorSink) {
        let mut updates: Vec<ArtworkUpdate> = Vec::new();
        self.fetcher.drain_updates(|update| updates.push(update));
        for update in updates {
            let id = update.cover.id();
            if update.size != self.fetcher.texture_size() {
                trace!(cover = %id, size = update.size, "Dropping artwork at an old size");
                if let Some(slot) = self.loader.cache_mut().slot_mut(id) {
                    slot.artwork = ArtworkState::Placeholder;
                }
                self.request_artwork(&update.cover);
                continue;
            }
            let Some(slot) = self.loader.cache_mut().slot_mut(id) else {
                continue;
            };
            slot.artwork = if update.artwork.is_some() {
                ArtworkState::Loaded
            } else {
                ArtworkState::Placeholder
            };
            sink.set_artwork(id, update.artwork.as_ref());
        }
    }

    /// Covers within `visible + 2` positions around `center`.
    fn window_ids(&self, center: usize) -> Vec<CoverId> {
        let reach = self.behaviour.half_visible() + 1;
        let start = center.saturating_sub(reach);
        let end = (center + reach + 1).min(self.covers.len());
        self.covers
            .get(start..end)
            .map(|window| window.iter().map(|cover| cover.id()).collect())
            .unwrap_or_default()
    }

    fn reload(&mut self, now: Instant, sink: &mut dyn ActorSink) {
        self.timeline.pause();
        if self.loaded {
            self.reload_covers(now, sink);
        } else {
            self.load_initial(now, sink);
        }
    }

    fn load_initial(&mut self, now: Instant, sink: &mut dyn ActorSink) {
        self.loaded = true;
        let loaded = self.loader.load(&self.source);
        self.covers = loaded.covers;
        self.source_indices = loaded.source_indices;
        self.letters = loaded.letters;
        for cover in &loaded.created {
            self.request_artwork(cover);
        }

        let empty = self.covers.is_empty();
        if empty {
            self.install_placeholder();
        }
        self.timeline.set_index_count(self.covers.len());
        self.retarget(0);
        self.timeline.set_target(0);
        self.timeline.jump_to_target();
        let progress = self.timeline.progress();
        self.behaviour.set_previous_bounds(progress, self.covers.len());
        self.events.push(FlowEvent::LetterLookupChanged);
        info!(count = self.covers.len(), "Loaded covers");

        if empty {
            let plan = TransitionPlan {
                fade_in: self
                    .covers
                    .iter()
                    .map(|cover| CoverFadeIn {
                        id: cover.id(),
                        alpha: self.behaviour.alpha(cover.index(), progress, 1),
                    })
                    .collect(),
                new_progress: progress,
                ..TransitionPlan::default()
            };
            self.start_transition(plan, now, sink);
        } else {
            self.draw(progress, sink);
            self.timeline.play_at(now);
            self.events.push(FlowEvent::CoversChanged);
        }
    }

    fn reload_covers(&mut self, now: Instant, sink: &mut dyn ActorSink) {
        let old_window = self.window_ids(self.target_index);
        let old_progress = self.timeline.progress();
        for cover in &self.covers {
            cover.set_index(UNPLACED);
        }

        let loaded = self.loader.load(&self.source);
        self.covers = loaded.covers;
        self.source_indices = loaded.source_indices;
        self.letters = loaded.letters;
        for cover in &loaded.created {
            self.request_artwork(cover);
        }

        let persistent: Vec<&Arc<Cover>> = self
            .covers
            .iter()
            .filter(|cover| old_window.contains(&cover.id()))
            .collect();
        let keep_current = self
            .current_cover
            .as_ref()
            .filter(|current| current.is_placed())
            .map(|current| current.index());

        let count = self.covers.len();
        let new_target = if count <= 1 {
            0
        } else if let Some(index) = keep_current {
            index as i64
        } else {
            match persistent.len() {
                0 => (old_progress * (count - 1) as f64).round() as i64,
                1 => persistent[0].index() as i64,
                n => persistent[(n as f64 * 0.5 - 1.0) as usize].index() as i64,
            }
        };
        let persistent_count = persistent.len();

        if self.covers.is_empty() {
            self.install_placeholder();
        }
        self.timeline.set_index_count(self.covers.len());
        let target = self.retarget(new_target);
        self.timeline.set_target(target as i64);
        self.timeline.jump_to_target();
        let new_progress = self.timeline.progress();

        let new_window = self.window_ids(target);
        let sets = TransitionSets::compute(&old_window, &new_window);
        let total = self.covers.len();
        let cache = self.loader.cache();
        let alpha_of = |id: CoverId| {
            cache
                .get(id)
                .map_or(0.0, |cover| self.behaviour.alpha(cover.index(), new_progress, total))
        };
        let plan = TransitionPlan {
            slides: sets
                .persistent
                .iter()
                .map(|&id| CoverSlide {
                    id,
                    alpha_from: cache.slot(id).map_or(0.0, |slot| slot.last_alpha),
                    alpha_to: alpha_of(id),
                })
                .collect(),
            fade_in: sets
                .arriving
                .iter()
                .map(|&id| CoverFadeIn {
                    id,
                    alpha: alpha_of(id),
                })
                .collect(),
            fade_out: sets.departing,
            new_progress,
        };

        info!(
            count = total,
            target,
            persistent = persistent_count,
            fade_out = plan.fade_out.len(),
            fade_in = plan.fade_in.len(),
            "Reloaded covers"
        );
        self.behaviour.set_previous_bounds(new_progress, total);
        self.behaviour.restack(&self.covers, self.loader.cache(), sink);
        self.events.push(FlowEvent::LetterLookupChanged);
        self.start_transition(plan, now, sink);
    }

    fn install_placeholder(&mut self) {
        let placeholder = self.loader.cache_mut().placeholder();
        placeholder.set_index(0);
        self.covers = vec![placeholder];
        self.source_indices.clear();
        self.letters = LetterLookup::default();
    }

    fn start_transition(&mut self, plan: TransitionPlan, now: Instant, sink: &mut dyn ActorSink) {
        let transition = Transition::new(plan, self.config.max_animation_span, self.loader.cache());
        if transition.is_running() {
            self.transition = Some(transition);
            self.transition_clock = Some(now);
        } else {
            self.complete_transition(now, sink);
        }
    }

    fn complete_transition(&mut self, now: Instant, sink: &mut dyn ActorSink) {
        self.transition = None;
        self.transition_clock = None;
        self.timeline.play_at(now);
        self.events.push(FlowEvent::CoversChanged);
        debug!(queued = self.queued_reloads.len(), "Transition complete");

        if self.queued_reloads.pop_front().is_some() {
            self.reload(now, sink);
            return;
        }
        if let Some(index) = self.pending_target.take() {
            self.set_target_index(index);
        }
        let progress = self.timeline.progress();
        self.draw(progress, sink);
    }
}

impl<S: SourceList> Drop for CoverManager<S> {
    fn drop(&mut self) {
        self.fetcher.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::{Artwork, FetchMode, MemoryArtworkStore};
    use crate::error::ArtworkError;
    use crate::flow::actor::RecordingSink;
    use crate::flow::cache::EMPTY_COVER_KEY;
    use crate::models::SourceEntry;

    const FRAME: Duration = Duration::from_millis(34);

    fn entries(titles: &[&str]) -> Vec<SourceEntry> {
        titles
            .iter()
            .map(|t| SourceEntry::new("x", *t).with_artwork(*t))
            .collect()
    }

    fn numbered(n: usize) -> Vec<SourceEntry> {
        let titles: Vec<String> = (0..n).map(|i| format!("t{i}")).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        entries(&refs)
    }

    fn manager(source: Vec<SourceEntry>) -> CoverManager<Vec<SourceEntry>> {
        let store = Arc::new(MemoryArtworkStore::new());
        for entry in &source {
            store.insert_solid(entry.title.clone(), 4, [9, 9, 9, 255]);
        }
        let config = FlowConfig::new()
            .visible_covers(5)
            .fetch_mode(FetchMode::Inline)
            .reflections(false);
        CoverManager::new(source, store, config)
    }

    /// Ticks until the flow is at rest. Returns the time reached.
    fn settle(
        manager: &mut CoverManager<Vec<SourceEntry>>,
        sink: &mut RecordingSink,
        start: Instant,
    ) -> Instant {
        let mut now = start;
        for _ in 0..2_000 {
            now += FRAME;
            manager.tick_at(now, sink);
            if !manager.is_transitioning()
                && !manager.timeline().can_play()
                && manager.queued_reloads() == 0
            {
                break;
            }
        }
        now
    }

    fn loaded_at(
        source: Vec<SourceEntry>,
        target: i64,
    ) -> (CoverManager<Vec<SourceEntry>>, RecordingSink, Instant) {
        let mut manager = manager(source);
        let mut sink = RecordingSink::new();
        let start = Instant::now();
        manager.reload_now(start, &mut sink);
        manager.set_target_index(target);
        let now = settle(&mut manager, &mut sink, start);
        (manager, sink, now)
    }

    #[test]
    fn test_initial_load_shows_window() {
        let (mut manager, sink, _) = loaded_at(numbered(10), 0);
        assert_eq!(manager.covers().len(), 10);
        assert!(!manager.timeline().is_paused());
        let first = manager.covers()[0].id();
        assert_eq!(sink.last_opacity(first), Some(255));
        assert_eq!(
            manager.cache().slot(first).unwrap().artwork,
            ArtworkState::Loaded
        );
        let events = manager.drain_events();
        assert!(events.contains(&FlowEvent::CoversChanged));
        assert!(events.contains(&FlowEvent::NewCurrentCover(first)));
    }

    #[test]
    fn test_target_moves_timeline_and_sets_current() {
        let (mut manager, _sink, _) = loaded_at(numbered(10), 6);
        assert_eq!(manager.target_index(), 6);
        assert!((manager.timeline().progress() - 6.0 / 9.0).abs() < 1e-9);
        let current = manager.current_cover().unwrap().id();
        assert_eq!(current, manager.covers()[6].id());
        assert!(manager
            .drain_events()
            .contains(&FlowEvent::TargetIndexChanged(6)));
    }

    #[test]
    fn test_filtered_reload_keeps_current_cover() {
        let (mut manager, mut sink, now) = loaded_at(numbered(10), 4);
        let kept = manager.covers()[4].id();

        *manager.source_mut() = entries(&["t3a", "t4", "t5a"]);
        manager.reload_now(now, &mut sink);

        assert_eq!(manager.target_index(), 1);
        assert_eq!(manager.covers()[1].id(), kept);
        assert!((manager.timeline().progress() - 0.5).abs() < 1e-12);
        assert!(manager.timeline().is_paused());

        let plan = manager.transition_plan().unwrap();
        assert_eq!(plan.slides.len(), 1);
        assert_eq!(plan.slides[0].id, kept);
        assert_eq!(plan.slides[0].alpha_to, 0.5);
        assert_eq!(plan.fade_in.len(), 2);
        // Old window is indices 1..=7 around target 4.
        assert_eq!(plan.fade_out.len(), 6);
        assert!(!plan.fade_out.contains(&kept));

        manager.drain_events();
        settle(&mut manager, &mut sink, now);
        assert!(!manager.is_transitioning());
        assert!(!manager.timeline().is_paused());
        assert!(manager.drain_events().contains(&FlowEvent::CoversChanged));
        for cover in manager.covers() {
            assert!(manager.cache().slot(cover.id()).unwrap().visible);
        }
    }

    #[test]
    fn test_reload_target_from_median_persistent_cover() {
        // Pinned: with no current cover the new target is the cover at
        // position len/2 - 1 among persistent covers.
        let mut manager = manager(numbered(10));
        let mut sink = RecordingSink::new();
        let now = Instant::now();
        manager.reload_now(now, &mut sink);
        manager.set_target_index(4);
        assert!(manager.current_cover().is_none());

        *manager.source_mut() = entries(&["a", "t2", "t3", "t5", "t6", "z"]);
        manager.reload_now(now, &mut sink);
        assert_eq!(manager.target_index(), 2);
        assert_eq!(manager.covers()[2].label(), "x\nt3");
    }

    #[test]
    fn test_reload_without_overlap_maps_progress() {
        let (mut manager, mut sink, now) = loaded_at(numbered(10), 9);
        *manager.source_mut() = entries(&["a", "b", "c", "d", "e"]);
        manager.reload_now(now, &mut sink);
        assert_eq!(manager.target_index(), 4);
        let plan = manager.transition_plan().unwrap();
        assert!(plan.slides.is_empty());
        assert_eq!(plan.fade_out.len(), 4);
    }

    #[test]
    fn test_reloads_queue_behind_transition() {
        let (mut manager, mut sink, now) = loaded_at(numbered(10), 4);
        *manager.source_mut() = entries(&["t3a", "t4", "t5a"]);
        manager.reload_now(now, &mut sink);
        manager.reload_now(now, &mut sink);
        manager.reload_now(now, &mut sink);
        assert_eq!(manager.queued_reloads(), 1);
        assert!(manager.holds_updates());

        *manager.source_mut() = numbered(10);
        settle(&mut manager, &mut sink, now);
        assert_eq!(manager.queued_reloads(), 0);
        assert_eq!(manager.covers().len(), 10);
        assert_eq!(manager.covers()[manager.target_index()].label(), "x\nt4");
    }

    #[test]
    fn test_target_change_waits_for_transition() {
        let (mut manager, mut sink, now) = loaded_at(numbered(10), 4);
        *manager.source_mut() = entries(&["t3a", "t4", "t5a"]);
        manager.reload_now(now, &mut sink);
        manager.set_target_index(2);
        assert_eq!(manager.target_index(), 1);

        settle(&mut manager, &mut sink, now);
        assert_eq!(manager.target_index(), 2);
        assert_eq!(manager.timeline().target(), 2);
    }

    #[test]
    fn test_fade_out_starts_after_an_idle_gap() {
        let (mut manager, mut sink, now) = loaded_at(numbered(10), 4);
        *manager.source_mut() = entries(&["t3a", "t4", "t5a"]);
        manager.handle_list_event(ListEvent::Reloaded, now);

        // Nothing ticks for two seconds, well past the debounce.
        let now = now + Duration::from_secs(2);
        let before: Vec<(CoverId, u8)> = manager
            .covers()
            .iter()
            .filter_map(|c| sink.last_opacity(c.id()).map(|o| (c.id(), o)))
            .collect();
        sink.take();
        manager.tick_at(now, &mut sink);
        assert!(manager.is_transitioning());
        let departing = manager.transition_plan().unwrap().fade_out.clone();
        assert_eq!(departing.len(), 6);
        assert!(departing.iter().all(|id| !sink.was_hidden(*id)));

        manager.tick_at(now + FRAME, &mut sink);
        assert!(departing.iter().all(|id| !sink.was_hidden(*id)));
        let fading = before
            .iter()
            .filter(|(id, _)| departing.contains(id))
            .filter(|(id, from)| {
                sink.last_opacity(*id)
                    .is_some_and(|o| o > 0 && o < *from)
            })
            .count();
        assert!(fading > 0);

        settle(&mut manager, &mut sink, now + FRAME);
        assert!(departing.iter().all(|id| sink.was_hidden(*id)));
    }

    #[test]
    fn test_list_events_are_debounced() {
        let (mut manager, mut sink, start) = loaded_at(numbered(10), 0);
        *manager.source_mut() = numbered(4);

        manager.handle_list_event(ListEvent::Reloaded, start);
        manager.tick_at(start + Duration::from_millis(100), &mut sink);
        manager.handle_list_event(ListEvent::Reloaded, start + Duration::from_millis(200));
        manager.tick_at(start + Duration::from_millis(300), &mut sink);
        assert_eq!(manager.covers().len(), 10);

        manager.tick_at(start + Duration::from_millis(460), &mut sink);
        assert_eq!(manager.covers().len(), 4);
    }

    #[test]
    fn test_empty_list_shows_placeholder() {
        let mut manager = manager(Vec::new());
        let mut sink = RecordingSink::new();
        let start = Instant::now();
        manager.reload_now(start, &mut sink);
        assert_eq!(manager.covers().len(), 1);
        assert_eq!(manager.covers()[0].cache_key(), EMPTY_COVER_KEY);
        assert!(manager.is_transitioning());

        settle(&mut manager, &mut sink, start);
        let placeholder = manager.covers()[0].id();
        assert_eq!(sink.last_opacity(placeholder), Some(255));
        assert!(manager.drain_events().contains(&FlowEvent::CoversChanged));
    }

    #[test]
    fn test_placeholder_fades_out_when_list_fills() {
        let mut manager = manager(Vec::new());
        let mut sink = RecordingSink::new();
        let start = Instant::now();
        manager.reload_now(start, &mut sink);
        let now = settle(&mut manager, &mut sink, start);
        let placeholder = manager.covers()[0].id();

        *manager.source_mut() = numbered(3);
        manager.reload_now(now, &mut sink);
        assert_eq!(manager.transition_plan().unwrap().fade_out, vec![placeholder]);
        settle(&mut manager, &mut sink, now);
        assert!(sink.was_hidden(placeholder));
        assert!(!manager.cache().get(placeholder).unwrap().is_placed());
    }

    #[test]
    fn test_scroll_helpers() {
        let (mut manager, mut sink, now) = loaded_at(entries(&["apple", "banana", "cherry"]), 0);
        assert!(manager.scroll_to_letter('c'));
        assert_eq!(manager.target_index(), 2);
        assert!(manager.scroll_to("x\nbanana"));
        assert_eq!(manager.target_index(), 1);
        assert!(!manager.scroll_to("x\nmissing"));
        assert!(!manager.scroll_to_letter('q'));

        *manager.source_mut() = entries(&["apple"]);
        manager.reload_now(now, &mut sink);
        settle(&mut manager, &mut sink, now);
        assert!(!manager.scroll_to("x\ncherry"));
    }

    #[test]
    fn test_visible_covers_change_is_reported() {
        let (mut manager, mut sink, _) = loaded_at(numbered(20), 10);
        manager.drain_events();
        manager.set_visible_covers(8, &mut sink);
        assert_eq!(manager.behaviour().visible_covers(), 7);
        assert_eq!(
            manager.drain_events(),
            vec![FlowEvent::VisibleCoversChanged(7)]
        );
    }

    /// Holds lookups at the original size until released.
    struct SizeGate {
        gate: flume::Receiver<()>,
        sizes: parking_lot::Mutex<Vec<u32>>,
    }

    impl ArtworkStore for SizeGate {
        fn lookup(&self, _id: &str, size: u32) -> Result<Option<Artwork>, ArtworkError> {
            self.sizes.lock().push(size);
            if size == 256 {
                let _ = self.gate.recv_timeout(Duration::from_secs(5));
            }
            Ok(Some(Artwork::from_rgba(image::RgbaImage::from_pixel(
                size,
                size,
                image::Rgba([1, 2, 3, 255]),
            ))))
        }
    }

    #[test]
    fn test_texture_size_change_discards_in_flight_artwork() {
        let (gate_tx, gate_rx) = flume::bounded(1);
        let store = Arc::new(SizeGate {
            gate: gate_rx,
            sizes: parking_lot::Mutex::new(Vec::new()),
        });
        let config = FlowConfig::new()
            .visible_covers(5)
            .texture_size(256)
            .reflections(false);
        let mut manager = CoverManager::new(entries(&["a"]), store.clone(), config);
        let mut sink = RecordingSink::new();
        manager.reload_now(Instant::now(), &mut sink);

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.sizes.lock().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        manager.set_texture_size(128, &mut sink);
        gate_tx.send(()).unwrap();

        let id = manager.covers()[0].id();
        let loaded = |manager: &CoverManager<Vec<SourceEntry>>| {
            manager.cache().slot(id).unwrap().artwork == ArtworkState::Loaded
        };
        while !loaded(&manager) && Instant::now() < deadline {
            manager.tick_at(Instant::now(), &mut sink);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(loaded(&manager));
        assert_eq!(*store.sizes.lock(), vec![256, 128]);
    }

    #[test]
    fn test_texture_size_refetches_artwork() {
        let (mut manager, mut sink, now) = loaded_at(numbered(3), 0);
        manager.set_texture_size(128, &mut sink);
        assert_eq!(manager.fetcher().texture_size(), 128);
        manager.tick_at(now + FRAME, &mut sink);
        for cover in manager.covers() {
            assert_eq!(
                manager.cache().slot(cover.id()).unwrap().artwork,
                ArtworkState::Loaded
            );
        }
    }
}
