//! Maps timeline progress onto cover positions.
//!
//! Every placed cover gets an alpha in [0, 1] describing how far across the
//! visible window it sits; 0.5 is dead centre. The alpha range is cut into
//! five bands, `1 / visible_covers` wide at the edges and around the centre:
//!
//! ```text
//! 0      step           0.5-step  0.5+step           1-step      1
//! | fade |  side slide  |  centre rotate  |  side slide  |  fade  |
//! ```
//!
//! Each band turns its local progress into a [`DisplayState`]. Motion offsets
//! tilt and shift the covers in the direction of travel, proportionally to
//! how far the timeline still has to go.

use std::sync::Arc;

use super::actor::{ActorSink, DisplayState};
use super::cache::CoverCache;
use crate::models::{Cover, CoverId};
use crate::timeline::Direction;

/// Maximum opacity of covers in the outer fade bands.
const OUTER_MAX_OPACITY: f32 = 223.0;
/// Opacity lost at the outer end of the side bands.
const SIDE_OPACITY_DROP: f32 = 32.0;
const MAX_MOTION_RATIO: f32 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn sign(self) -> f32 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }
}

/// Display band of a cover, with the local progress inside it.
///
/// Fade and slide progress run from 0 at the outer edge to 1 toward the
/// centre; centre progress runs from -1 to 1 left to right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Band {
    OuterFade { side: Side, progress: f32 },
    SideSlide { side: Side, progress: f32 },
    CenterRotate { progress: f32 },
}

/// Alpha of the cover at `index`: `(half - (total-1)*progress + index) / (visible-1)`,
/// clamped to [0, 1]. Unplaced covers are at 0.
pub fn alpha(index: i32, progress: f64, total: usize, visible: usize) -> f64 {
    if index < 0 {
        return 0.0;
    }
    let half = (visible.saturating_sub(1) / 2) as f64;
    let span = visible.saturating_sub(1).max(1) as f64;
    let raw = (half - total.saturating_sub(1) as f64 * progress + index as f64) / span;
    raw.clamp(0.0, 1.0)
}

/// Band an alpha falls into. Every alpha maps to exactly one band.
pub fn band_for(alpha: f64, visible: usize) -> Band {
    let alpha = alpha as f32;
    let step = 1.0 / visible.max(1) as f32;
    let side_span = (0.5 - 2.0 * step).max(f32::EPSILON);

    if alpha < step {
        Band::OuterFade {
            side: Side::Left,
            progress: alpha / step,
        }
    } else if alpha <= 0.5 - step {
        Band::SideSlide {
            side: Side::Left,
            progress: (alpha - step) / side_span,
        }
    } else if alpha < 0.5 + step {
        Band::CenterRotate {
            progress: (alpha - 0.5) / step,
        }
    } else if alpha <= 1.0 - step {
        Band::SideSlide {
            side: Side::Right,
            progress: (1.0 - step - alpha) / side_span,
        }
    } else {
        Band::OuterFade {
            side: Side::Right,
            progress: (1.0 - alpha) / step,
        }
    }
}

/// Stage layout derived from the stage size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub width: f32,
    pub height: f32,
    pub z_far: f32,
    pub z_near: f32,
    pub rotation_angle: f32,
    pub min_cover_width: f32,
    pub max_cover_width: f32,
    pub center_x: f32,
    pub center_y: f32,
    pub cover_width: f32,
    pub center_margin: f32,
    pub center_width: f32,
    pub side_margin: f32,
    pub x_step: f32,
    pub side_width: f32,
}

impl Geometry {
    pub fn new(width: f32, height: f32, min_cover_width: f32, max_cover_width: f32) -> Self {
        Self {
            width,
            height,
            z_far: 50.0,
            z_near: 100.0,
            rotation_angle: 60.0,
            min_cover_width,
            max_cover_width,
            center_x: 0.0,
            center_y: 0.0,
            cover_width: 0.0,
            center_margin: 0.0,
            center_width: 0.0,
            side_margin: 0.0,
            x_step: 0.0,
            side_width: 0.0,
        }
    }

    /// Recomputes the derived fields for `visible` covers.
    pub fn layout(&mut self, visible: usize) {
        let visible = visible.max(1) as f32;
        self.center_x = self.width * 0.5;
        self.center_y = self.height * 0.45;
        self.cover_width = (self.height * 0.5)
            .min(self.max_cover_width)
            .max(self.min_cover_width);
        self.center_margin = self.cover_width * 0.75;
        self.center_width = self.center_margin * 2.0;

        self.side_margin = self.cover_width * 0.5;
        self.x_step = (self.width - self.center_width - self.side_margin) / visible;
        self.side_width = self.width * 0.5 - (self.center_margin + self.x_step + self.side_margin);
        if self.side_width > self.cover_width {
            self.side_margin += self.side_width - self.cover_width;
            self.x_step = (self.width - self.center_width - self.side_margin) / visible;
            self.side_width =
                self.width * 0.5 - (self.center_margin + self.x_step + self.side_margin);
        }
    }
}

/// Tilt and shift applied while the timeline is moving.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionOffsets {
    pub rotation: f32,
    pub center_x: f32,
    pub z_near: f32,
}

/// Timeline values the behaviour reads on each update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub progress: f64,
    pub delta: f64,
    pub direction: Direction,
}

impl Motion {
    /// A stationary timeline at `progress`.
    pub fn at_rest(progress: f64) -> Self {
        Self {
            progress,
            delta: 0.0,
            direction: Direction::Forward,
        }
    }
}

/// Visible index range around a centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub lower: usize,
    pub center: usize,
    pub upper: usize,
}

impl WindowBounds {
    pub fn around(progress: f64, total: usize, half: usize) -> Option<Self> {
        let last = total.checked_sub(1)?;
        let center = ((progress * last as f64).max(0.0) as usize).min(last);
        Some(Self {
            lower: center.saturating_sub(half + 1),
            center,
            upper: (center + half + 1).min(last),
        })
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.lower..=self.upper).contains(&index)
    }
}

pub struct FlowBehaviour {
    geometry: Geometry,
    visible_covers: usize,
    texture_size: u32,
    previous: Option<WindowBounds>,
}

impl FlowBehaviour {
    pub fn new(geometry: Geometry, visible_covers: usize, texture_size: u32) -> Self {
        let mut behaviour = Self {
            geometry,
            visible_covers,
            texture_size: texture_size.max(1),
            previous: None,
        };
        behaviour.geometry.layout(visible_covers);
        behaviour
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn visible_covers(&self) -> usize {
        self.visible_covers
    }

    pub fn half_visible(&self) -> usize {
        self.visible_covers.saturating_sub(1) / 2
    }

    pub fn set_visible_covers(&mut self, visible: usize) {
        self.visible_covers = visible;
        self.geometry.layout(visible);
    }

    pub fn set_stage_size(&mut self, width: f32, height: f32) {
        self.geometry.width = width;
        self.geometry.height = height;
        self.geometry.layout(self.visible_covers);
    }

    pub fn set_cover_width_limits(&mut self, min: f32, max: f32) {
        self.geometry.min_cover_width = min;
        self.geometry.max_cover_width = max;
        self.geometry.layout(self.visible_covers);
    }

    pub fn set_texture_size(&mut self, size: u32) {
        self.texture_size = size.max(1);
    }

    pub fn alpha(&self, index: i32, progress: f64, total: usize) -> f64 {
        alpha(index, progress, total, self.visible_covers)
    }

    pub fn offsets(&self, delta: f64, direction: Direction) -> MotionOffsets {
        let g = &self.geometry;
        let ratio = (0.75 * delta as f32 / self.visible_covers.max(1) as f32).min(MAX_MOTION_RATIO);
        let mut offsets = MotionOffsets {
            rotation: g.rotation_angle / 5.0 * ratio,
            center_x: -(g.center_margin / 2.0) * ratio,
            z_near: -(g.z_near - g.z_far) * 1.5 * ratio,
        };
        if direction != Direction::Forward {
            offsets.rotation = -offsets.rotation;
            offsets.center_x = -offsets.center_x;
        }
        offsets
    }

    /// Display state for a band.
    pub fn state_for_band(&self, band: Band, offsets: MotionOffsets) -> DisplayState {
        let g = &self.geometry;
        let scale = g.cover_width / self.texture_size as f32;
        match band {
            Band::OuterFade { side, progress } => {
                let sign = side.sign();
                let edge = if side == Side::Left { 0.0 } else { g.width };
                DisplayState {
                    x: edge + (g.side_margin + progress * g.x_step) * sign,
                    y: g.center_y,
                    depth: g.z_far - 3.0 + progress,
                    rotation_y: sign * g.rotation_angle + offsets.rotation,
                    opacity: (progress * OUTER_MAX_OPACITY).clamp(0.0, 255.0) as u8,
                    shade: 255,
                    shade_left: side == Side::Left,
                    scale,
                }
            }
            Band::SideSlide { side, progress } => {
                let sign = side.sign();
                let travel = (1.0 - progress) * (g.side_width + offsets.center_x * sign);
                DisplayState {
                    x: g.center_x + offsets.center_x - sign * (travel + g.center_margin),
                    y: g.center_y,
                    depth: g.z_far - 2.0 + progress,
                    rotation_y: sign * g.rotation_angle + offsets.rotation,
                    opacity: (255.0 - (1.0 - progress) * SIDE_OPACITY_DROP).clamp(0.0, 255.0)
                        as u8,
                    shade: 255,
                    shade_left: side == Side::Left,
                    scale,
                }
            }
            Band::CenterRotate { progress } => DisplayState {
                x: g.center_x + offsets.center_x + g.center_margin * progress,
                y: g.center_y,
                depth: g.z_far + (g.z_near + offsets.z_near - g.z_far) * (1.0 - progress.abs()),
                rotation_y: -progress * g.rotation_angle + offsets.rotation,
                opacity: 255,
                shade: (255.0 * progress.abs()).clamp(0.0, 255.0) as u8,
                shade_left: progress < 0.0,
                scale,
            },
        }
    }

    pub fn state_for_alpha(&self, alpha: f64, motion: &Motion) -> DisplayState {
        let band = band_for(alpha, self.visible_covers);
        self.state_for_band(band, self.offsets(motion.delta, motion.direction))
    }

    /// Draws one cover at `alpha`. Returns true if it just became visible.
    pub fn apply_alpha(
        &self,
        id: CoverId,
        alpha: f64,
        motion: &Motion,
        cache: &mut CoverCache,
        sink: &mut dyn ActorSink,
    ) -> bool {
        let state = self.state_for_alpha(alpha, motion);
        sink.apply(id, &state);
        let Some(slot) = cache.slot_mut(id) else {
            return false;
        };
        let was_visible = slot.visible;
        slot.last_alpha = alpha;
        slot.opacity = state.opacity;
        slot.last_state = Some(state);
        slot.visible = state.opacity > 0;
        slot.visible && !was_visible
    }

    pub fn hide(&self, id: CoverId, cache: &mut CoverCache, sink: &mut dyn ActorSink) {
        sink.hide(id);
        if let Some(slot) = cache.slot_mut(id) {
            slot.visible = false;
            slot.opacity = 0;
        }
    }

    /// Remembers the window at `progress` as the one currently drawn.
    pub fn set_previous_bounds(&mut self, progress: f64, total: usize) {
        self.previous = WindowBounds::around(progress, total, self.half_visible());
    }

    pub fn previous_bounds(&self) -> Option<WindowBounds> {
        self.previous
    }

    /// Redraws the covers in the window around `motion.progress`.
    ///
    /// Covers that scrolled out of the window since the last update are
    /// hidden. Returns the covers that became visible.
    pub fn update_actors(
        &mut self,
        covers: &[Arc<Cover>],
        cache: &mut CoverCache,
        motion: &Motion,
        sink: &mut dyn ActorSink,
    ) -> Vec<CoverId> {
        let half = self.half_visible();
        let Some(current) = WindowBounds::around(motion.progress, covers.len(), half) else {
            self.previous = None;
            return Vec::new();
        };
        let previous = self.previous.unwrap_or(current);

        let departed = if current.center < previous.center {
            (current.upper + 1)..=previous.upper
        } else if current.center > previous.center {
            previous.lower..=current.lower.saturating_sub(1)
        } else {
            1..=0
        };
        for index in departed {
            if current.contains(index) {
                continue;
            }
            if let Some(cover) = covers.get(index) {
                self.hide(cover.id(), cache, sink);
            }
        }

        let mut shown = Vec::new();
        for cover in &covers[current.lower..=current.upper] {
            let alpha = self.alpha(cover.index(), motion.progress, covers.len());
            if self.apply_alpha(cover.id(), alpha, motion, cache, sink) {
                shown.push(cover.id());
            }
        }
        self.restack(covers, cache, sink);

        self.previous = Some(current);
        shown
    }

    /// Re-sorts visible covers back to front by depth.
    pub fn restack(&self, covers: &[Arc<Cover>], cache: &CoverCache, sink: &mut dyn ActorSink) {
        let mut order: Vec<(CoverId, f32)> = covers
            .iter()
            .filter_map(|cover| {
                let slot = cache.slot(cover.id())?;
                let state = slot.last_state.as_ref()?;
                slot.visible.then_some((cover.id(), state.depth))
            })
            .collect();
        order.sort_by(|a, b| a.1.total_cmp(&b.1));
        let ids: Vec<CoverId> = order.into_iter().map(|(id, _)| id).collect();
        sink.restack(&ids);
    }
}
