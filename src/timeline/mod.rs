//! Variable-speed timeline driving the flow's progress toward a target index.
//!
//! Progress is a value in [0, 1] spread over `index_count` positions; the
//! absolute position is `progress * (index_count - 1)`. Each tick moves the
//! progress toward the target at a speed proportional to how far away the
//! target is, smoothed against the previous distance, so long jumps start
//! fast and every move decelerates as it lands.
//!
//! The timeline is driven from one thread by an external periodic callback
//! (`tick` / `tick_at`). It does not own a clock source; the host does.

use std::time::{Duration, Instant};

use tracing::trace;

/// Positions closer than this count as equal.
const POSITION_EPSILON: f64 = 1e-9;

/// Weight of the distance change when smoothing speed.
const DELTA_SMOOTHING: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimelineEvent {
    /// A tick ran; carries the progress after it.
    NewFrame(f64),
    /// The progress arrived at the target index.
    TargetReached(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Pacing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineSettings {
    /// Frames per second the timeline steps at, at most.
    pub target_fps: u32,
    /// Largest elapsed time a single step accounts for.
    pub time_threshold: Duration,
    /// Time scale of a one-index move.
    pub max_animation_span: Duration,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            target_fps: 30,
            time_threshold: Duration::from_millis(1000),
            max_animation_span: Duration::from_millis(250),
        }
    }
}

pub struct AdaptiveTimeline {
    index_count: usize,
    target: usize,
    progress: f64,
    delta: f64,
    last_delta: f64,
    paused: bool,
    /// One-shot delay before ticking resumes.
    timeout: Option<Duration>,
    last_time: Instant,
    /// Set once `TargetReached` fired for the current target.
    reached: bool,
    events: Vec<TimelineEvent>,
    frame_interval: Duration,
    time_threshold: Duration,
    span_ms: f64,
}

impl AdaptiveTimeline {
    pub fn new(index_count: usize, settings: TimelineSettings) -> Self {
        let fps = settings.target_fps.max(1);
        Self {
            index_count,
            target: 0,
            progress: 0.0,
            delta: 0.0,
            last_delta: 0.0,
            paused: false,
            timeout: None,
            last_time: Instant::now(),
            reached: false,
            events: Vec::new(),
            frame_interval: Duration::from_secs_f64(1.0 / fps as f64),
            time_threshold: settings.time_threshold,
            span_ms: (settings.max_animation_span.as_secs_f64() * 1000.0).max(1.0),
        }
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Distance between the target and the current position, in indices.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Current position as a fractional index.
    pub fn absolute_progress(&self) -> f64 {
        if self.index_count > 0 {
            self.progress * (self.index_count - 1) as f64
        } else {
            0.0
        }
    }

    /// The target expressed as a progress value.
    pub fn relative_target(&self) -> f64 {
        if self.index_count > 1 {
            self.target as f64 / (self.index_count - 1) as f64
        } else {
            0.0
        }
    }

    pub fn direction(&self) -> Direction {
        if self.target as f64 > self.absolute_progress() {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    /// True while the position has not arrived at the target.
    pub fn can_play(&self) -> bool {
        !self.at_target()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn set_index_count(&mut self, count: usize) {
        if count == self.index_count {
            return;
        }
        self.index_count = count;
        let max = count.saturating_sub(1);
        if self.target > max {
            self.target = max;
            self.reached = false;
        }
        self.update_delta();
        self.emit(TimelineEvent::NewFrame(self.progress));
        if self.at_target() {
            self.report_reached();
        }
    }

    /// Points the timeline at `target`, clamped into `[0, index_count - 1]`.
    pub fn set_target(&mut self, target: i64) {
        let max = self.index_count.saturating_sub(1) as i64;
        let target = target.clamp(0, max) as usize;
        self.target = target;
        self.reached = false;
        self.update_delta();
        if self.at_target() {
            self.emit(TimelineEvent::NewFrame(self.progress));
            self.report_reached();
        }
    }

    /// Like [`set_target`](Self::set_target) for a fractional position.
    pub fn set_target_position(&mut self, position: f64) {
        let position = if position.is_finite() { position } else { 0.0 };
        self.set_target(position.round() as i64);
    }

    /// Sets the progress directly, clamped into [0, 1].
    pub fn set_progress(&mut self, progress: f64) {
        self.progress = if progress.is_finite() {
            progress.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.update_delta();
        if self.at_target() {
            self.report_reached();
        }
    }

    pub fn jump_to_index(&mut self, index: usize) {
        if self.index_count > 1 {
            self.set_progress(index as f64 / (self.index_count - 1) as f64);
        } else {
            self.set_progress(0.0);
        }
    }

    pub fn jump_to_target(&mut self) {
        self.jump_to_index(self.target);
    }

    /// Suppresses ticking until `timeout` has elapsed.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.set_timeout_at(timeout, Instant::now());
    }

    pub fn set_timeout_at(&mut self, timeout: Option<Duration>, now: Instant) {
        self.last_time = now;
        self.timeout = timeout;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn play(&mut self) {
        self.play_at(Instant::now());
    }

    /// Resumes ticking; time spent paused is not caught up.
    pub fn play_at(&mut self, now: Instant) {
        if self.paused {
            self.last_time = now;
            self.paused = false;
        }
    }

    /// Restarts elapsed-time accounting from `now`.
    pub fn reset_clock(&mut self, now: Instant) {
        self.last_time = now;
    }

    pub fn tick(&mut self) -> bool {
        self.tick_at(Instant::now())
    }

    /// Advances the timeline to `now`. Returns whether a frame was produced.
    ///
    /// Calls closer together than the frame interval are ignored, and the
    /// elapsed time is capped at the time threshold so a stalled host does
    /// not make covers jump.
    pub fn tick_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_time);

        if let Some(timeout) = self.timeout {
            if timeout <= elapsed {
                self.timeout = None;
                self.last_time = now;
            }
            return false;
        }

        let elapsed = elapsed.min(self.time_threshold);
        if elapsed < self.frame_interval {
            return false;
        }

        if !self.paused && self.can_play() && self.index_count > 1 {
            let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
            let step = elapsed_ms * self.frequency() / (self.index_count - 1) as f64;
            let target = self.target as f64;
            match self.direction() {
                Direction::Forward => {
                    self.set_progress(self.progress + step);
                    if target <= self.absolute_progress() + POSITION_EPSILON {
                        self.set_progress(self.relative_target());
                    }
                }
                Direction::Backward => {
                    self.set_progress(self.progress - step);
                    if target >= self.absolute_progress() - POSITION_EPSILON {
                        self.set_progress(self.relative_target());
                    }
                }
            }
            trace!(progress = self.progress, delta = self.delta, "Timeline step");
        }

        self.last_time = now;
        self.emit(TimelineEvent::NewFrame(self.progress));
        true
    }

    /// Takes the events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<TimelineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Indices per millisecond for the next step.
    fn frequency(&mut self) -> f64 {
        let smoothed = self.delta - (self.delta - self.last_delta) * DELTA_SMOOTHING;
        self.last_delta = self.delta;
        smoothed.max(1.0) / self.span_ms
    }

    fn at_target(&self) -> bool {
        (self.target as f64 - self.absolute_progress()).abs() < POSITION_EPSILON
    }

    fn update_delta(&mut self) {
        self.delta = if self.at_target() {
            0.0
        } else {
            (self.target as f64 - self.absolute_progress()).abs()
        };
    }

    fn report_reached(&mut self) {
        if !self.reached {
            self.reached = true;
            self.emit(TimelineEvent::TargetReached(self.target));
        }
    }

    fn emit(&mut self, event: TimelineEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(34);

    fn reached_count(events: &[TimelineEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, TimelineEvent::TargetReached(_)))
            .count()
    }

    fn run_until_idle(timeline: &mut AdaptiveTimeline, start: Instant) -> Instant {
        let mut now = start;
        for _ in 0..10_000 {
            if !timeline.can_play() {
                break;
            }
            now += FRAME;
            timeline.tick_at(now);
        }
        now
    }

    #[test]
    fn test_target_is_clamped() {
        let mut timeline = AdaptiveTimeline::new(5, TimelineSettings::default());
        timeline.set_target(10);
        assert_eq!(timeline.target(), 4);
        timeline.set_target(-3);
        assert_eq!(timeline.target(), 0);
        timeline.set_target_position(f64::NAN);
        assert_eq!(timeline.target(), 0);
        timeline.set_target_position(2.6);
        assert_eq!(timeline.target(), 3);
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut timeline = AdaptiveTimeline::new(5, TimelineSettings::default());
        for (input, expected) in [
            (f64::NAN, 0.0),
            (f64::INFINITY, 0.0),
            (f64::NEG_INFINITY, 0.0),
            (-0.5, 0.0),
            (1.5, 1.0),
            (0.25, 0.25),
        ] {
            timeline.set_progress(input);
            assert_eq!(timeline.progress(), expected, "input {input}");
        }
    }

    #[test]
    fn test_delta_tracks_distance() {
        let mut timeline = AdaptiveTimeline::new(11, TimelineSettings::default());
        timeline.set_target(8);
        timeline.set_progress(0.5);
        assert!((timeline.delta() - 3.0).abs() < 1e-9);
        assert_eq!(timeline.direction(), Direction::Forward);
    }

    #[test]
    fn test_converges_and_reports_once() {
        for count in [2usize, 3, 7, 20, 100] {
            for target in [0, count / 2, count - 1] {
                let mut timeline = AdaptiveTimeline::new(count, TimelineSettings::default());
                let start = Instant::now();
                timeline.reset_clock(start);
                timeline.set_target(target as i64);
                run_until_idle(&mut timeline, start);

                assert_eq!(timeline.delta(), 0.0, "count {count} target {target}");
                assert!(!timeline.can_play());
                let events = timeline.drain_events();
                assert_eq!(reached_count(&events), 1, "count {count} target {target}");
            }
        }
    }

    #[test]
    fn test_reaching_again_after_retarget() {
        let mut timeline = AdaptiveTimeline::new(10, TimelineSettings::default());
        let start = Instant::now();
        timeline.reset_clock(start);
        timeline.set_target(6);
        let now = run_until_idle(&mut timeline, start);
        timeline.set_target(2);
        run_until_idle(&mut timeline, now);

        let events = timeline.drain_events();
        assert_eq!(
            events
                .iter()
                .filter_map(|e| match e {
                    TimelineEvent::TargetReached(t) => Some(*t),
                    _ => None,
                })
                .collect::<Vec<_>>(),
            vec![6, 2]
        );
    }

    #[test]
    fn test_far_targets_move_faster() {
        let mut near = AdaptiveTimeline::new(101, TimelineSettings::default());
        let mut far = AdaptiveTimeline::new(101, TimelineSettings::default());
        let start = Instant::now();
        near.reset_clock(start);
        far.reset_clock(start);
        near.set_target(5);
        far.set_target(100);
        near.tick_at(start + FRAME);
        far.tick_at(start + FRAME);
        assert!(far.absolute_progress() > near.absolute_progress());
    }

    #[test]
    fn test_frame_pacing_and_stall_clamp() {
        let settings = TimelineSettings {
            time_threshold: Duration::from_millis(100),
            ..TimelineSettings::default()
        };
        let mut a = AdaptiveTimeline::new(10_001, settings);
        let mut b = AdaptiveTimeline::new(10_001, settings);
        let start = Instant::now();
        a.reset_clock(start);
        b.reset_clock(start);
        a.set_target(10_000);
        b.set_target(10_000);

        assert!(!a.tick_at(start + Duration::from_millis(5)));
        assert_eq!(a.progress(), 0.0);

        assert!(a.tick_at(start + Duration::from_secs(1)));
        assert!(b.tick_at(start + Duration::from_secs(30)));
        assert_eq!(a.progress(), b.progress());
        assert!(a.can_play());
    }

    #[test]
    fn test_timeout_suppresses_ticks() {
        let mut timeline = AdaptiveTimeline::new(10, TimelineSettings::default());
        let start = Instant::now();
        timeline.set_timeout_at(Some(Duration::from_millis(100)), start);
        timeline.set_target(9);

        assert!(!timeline.tick_at(start + Duration::from_millis(50)));
        assert!(!timeline.tick_at(start + Duration::from_millis(120)));
        assert_eq!(timeline.timeout(), None);
        assert_eq!(timeline.progress(), 0.0);
        assert!(timeline.tick_at(start + Duration::from_millis(160)));
        assert!(timeline.progress() > 0.0);
    }

    #[test]
    fn test_pause_freezes_and_play_resets_clock() {
        let mut timeline = AdaptiveTimeline::new(1001, TimelineSettings::default());
        let start = Instant::now();
        timeline.reset_clock(start);
        timeline.set_target(1000);
        timeline.pause();

        assert!(timeline.tick_at(start + FRAME));
        assert_eq!(timeline.progress(), 0.0);

        let resume = start + Duration::from_secs(10);
        timeline.play_at(resume);
        let mut fresh = AdaptiveTimeline::new(1001, TimelineSettings::default());
        fresh.reset_clock(resume);
        fresh.set_target(1000);

        timeline.tick_at(resume + FRAME);
        fresh.tick_at(resume + FRAME);
        assert!(timeline.progress() > 0.0);
        assert!((timeline.progress() - fresh.progress()).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_index_counts() {
        for count in [0usize, 1] {
            let mut timeline = AdaptiveTimeline::new(count, TimelineSettings::default());
            let start = Instant::now();
            timeline.reset_clock(start);
            timeline.set_target(5);
            assert_eq!(timeline.target(), 0);
            timeline.jump_to_target();
            timeline.tick_at(start + FRAME);
            assert_eq!(timeline.progress(), 0.0);
            assert!(!timeline.can_play());
        }
    }

    #[test]
    fn test_shrinking_index_count_clamps_target() {
        let mut timeline = AdaptiveTimeline::new(10, TimelineSettings::default());
        timeline.set_target(8);
        timeline.set_index_count(4);
        assert_eq!(timeline.target(), 3);
    }

    #[test]
    fn test_clamped_target_already_reached_is_reported() {
        let mut timeline = AdaptiveTimeline::new(10, TimelineSettings::default());
        timeline.set_target(9);
        timeline.jump_to_target();
        timeline.drain_events();

        timeline.set_index_count(4);
        assert_eq!(timeline.target(), 3);
        assert!(timeline
            .drain_events()
            .contains(&TimelineEvent::TargetReached(3)));
    }
}
