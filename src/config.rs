//! Flow configuration.
//!
//! A plain value handed to [`CoverManager::new`](crate::flow::CoverManager::new).
//! Where it comes from (preferences, command line) is up to the host.

use std::time::Duration;

use crate::artwork::FetchMode;
use crate::flow::SortBy;
use crate::timeline::TimelineSettings;

pub const MIN_VISIBLE_COVERS: usize = 5;
pub const MAX_VISIBLE_COVERS: usize = 51;

/// Settings for the cover flow.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowConfig {
    /// Number of covers on stage. Always odd so one cover sits in the centre.
    pub visible_covers: usize,
    /// Edge length of the square artwork textures, in pixels.
    pub texture_size: u32,
    /// Duration of a one-index move and of each transition phase.
    pub max_animation_span: Duration,
    pub target_fps: u32,
    /// Largest elapsed time one timeline step accounts for.
    pub time_threshold: Duration,
    /// Idle time after which the fetch worker exits.
    pub fetch_idle_timeout: Duration,
    pub fetch_mode: FetchMode,
    pub sort_by: SortBy,
    pub reflections: bool,
    pub min_cover_width: f32,
    pub max_cover_width: f32,
    pub stage_width: f32,
    pub stage_height: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            visible_covers: 17,
            texture_size: 256,
            max_animation_span: Duration::from_millis(250),
            target_fps: 30,
            time_threshold: Duration::from_millis(1000),
            fetch_idle_timeout: Duration::from_secs(5),
            fetch_mode: FetchMode::Threaded,
            sort_by: SortBy::Album,
            reflections: true,
            min_cover_width: 64.0,
            max_cover_width: 256.0,
            stage_width: 450.0,
            stage_height: 200.0,
        }
    }
}

impl FlowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamps `count` into the supported range and rounds even counts down.
    pub fn clamp_visible_covers(count: usize) -> usize {
        let count = count.clamp(MIN_VISIBLE_COVERS, MAX_VISIBLE_COVERS);
        if count % 2 == 0 {
            count - 1
        } else {
            count
        }
    }

    pub fn visible_covers(mut self, count: usize) -> Self {
        self.visible_covers = Self::clamp_visible_covers(count);
        self
    }

    pub fn texture_size(mut self, size: u32) -> Self {
        self.texture_size = size.max(1);
        self
    }

    pub fn max_animation_span(mut self, span: Duration) -> Self {
        self.max_animation_span = span;
        self
    }

    pub fn target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps.max(1);
        self
    }

    pub fn time_threshold(mut self, threshold: Duration) -> Self {
        self.time_threshold = threshold;
        self
    }

    pub fn fetch_idle_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_idle_timeout = timeout;
        self
    }

    pub fn fetch_mode(mut self, mode: FetchMode) -> Self {
        self.fetch_mode = mode;
        self
    }

    pub fn sort_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn reflections(mut self, enabled: bool) -> Self {
        self.reflections = enabled;
        self
    }

    pub fn cover_width(mut self, min: f32, max: f32) -> Self {
        self.min_cover_width = min.min(max);
        self.max_cover_width = max.max(min);
        self
    }

    pub fn stage_size(mut self, width: f32, height: f32) -> Self {
        self.stage_width = width.max(0.0);
        self.stage_height = height.max(0.0);
        self
    }

    /// Covers on each side of the centre.
    pub fn half_visible(&self) -> usize {
        (self.visible_covers - 1) / 2
    }

    pub fn timeline_settings(&self) -> TimelineSettings {
        TimelineSettings {
            target_fps: self.target_fps,
            time_threshold: self.time_threshold,
            max_animation_span: self.max_animation_span,
        }
    }
}
