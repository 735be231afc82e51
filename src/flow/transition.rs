//! Changeover between two cover lists.
//!
//! Covers are partitioned into departing, persistent and arriving sets. The
//! transition fades departing covers out, slides persistent ones from the
//! alpha they were last drawn at to their alpha in the new list, then fades
//! arriving covers in. Each phase starts when the previous one completes;
//! empty phases are left out.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, trace};

use super::actor::ActorSink;
use super::animation::{Score, ScoreStep};
use super::behaviour::{FlowBehaviour, Motion};
use super::cache::CoverCache;
use crate::models::CoverId;

/// Partition of covers around a list change. The three sets are pairwise
/// disjoint and together hold every cover of `before` and `after`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionSets {
    /// In `before` only, in `before` order.
    pub departing: Vec<CoverId>,
    /// In both, in `after` order.
    pub persistent: Vec<CoverId>,
    /// In `after` only, in `after` order.
    pub arriving: Vec<CoverId>,
}

impl TransitionSets {
    pub fn compute(before: &[CoverId], after: &[CoverId]) -> Self {
        let before_set: HashSet<CoverId> = before.iter().copied().collect();
        let after_set: HashSet<CoverId> = after.iter().copied().collect();
        let mut seen = HashSet::new();

        let departing = before
            .iter()
            .copied()
            .filter(|id| !after_set.contains(id) && seen.insert(*id))
            .collect();
        let (persistent, arriving) = after
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .partition(|id| before_set.contains(id));

        Self {
            departing,
            persistent,
            arriving,
        }
    }

    pub fn len(&self) -> usize {
        self.departing.len() + self.persistent.len() + self.arriving.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionPhase {
    FadeOut,
    Slide,
    FadeIn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverSlide {
    pub id: CoverId,
    pub alpha_from: f64,
    pub alpha_to: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFadeIn {
    pub id: CoverId,
    /// Alpha the cover is placed at before fading in.
    pub alpha: f64,
}

/// What a transition animates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionPlan {
    pub fade_out: Vec<CoverId>,
    pub slides: Vec<CoverSlide>,
    pub fade_in: Vec<CoverFadeIn>,
    /// Timeline progress the new list is shown at.
    pub new_progress: f64,
}

impl TransitionPlan {
    pub fn is_empty(&self) -> bool {
        self.fade_out.is_empty() && self.slides.is_empty() && self.fade_in.is_empty()
    }
}

/// Result of advancing a transition by one frame.
#[derive(Debug, Default)]
pub struct TransitionFrame {
    /// Covers that became visible during the frame.
    pub shown: Vec<CoverId>,
    pub finished: bool,
}

pub struct Transition {
    plan: TransitionPlan,
    score: Score<TransitionPhase>,
    /// Opacity each departing cover had when the transition started.
    fade_out_from: Vec<(CoverId, u8)>,
    /// Target opacity of arriving covers, filled when the fade-in starts.
    fade_in_to: Vec<(CoverId, u8)>,
}

impl Transition {
    pub fn new(plan: TransitionPlan, span: Duration, cache: &CoverCache) -> Self {
        let mut score = Score::new();
        if !plan.fade_out.is_empty() {
            score.append(TransitionPhase::FadeOut, span);
        }
        if !plan.slides.is_empty() {
            score.append(TransitionPhase::Slide, span);
        }
        if !plan.fade_in.is_empty() {
            score.append(TransitionPhase::FadeIn, span);
        }
        score.start();

        let fade_out_from = plan
            .fade_out
            .iter()
            .map(|id| (*id, cache.slot(*id).map_or(0, |slot| slot.opacity)))
            .collect();

        debug!(
            fade_out = plan.fade_out.len(),
            slides = plan.slides.len(),
            fade_in = plan.fade_in.len(),
            phases = score.len(),
            "Starting transition"
        );

        Self {
            plan,
            score,
            fade_out_from,
            fade_in_to: Vec::new(),
        }
    }

    pub fn plan(&self) -> &TransitionPlan {
        &self.plan
    }

    pub fn phase(&self) -> Option<TransitionPhase> {
        self.score.current_phase()
    }

    pub fn is_running(&self) -> bool {
        self.score.is_playing()
    }

    /// Plays `dt` of the transition, drawing through `sink`.
    pub fn advance(
        &mut self,
        dt: Duration,
        behaviour: &FlowBehaviour,
        cache: &mut CoverCache,
        sink: &mut dyn ActorSink,
    ) -> TransitionFrame {
        let steps = self.score.advance(dt);
        self.apply_steps(&steps, behaviour, cache, sink)
    }

    /// Jumps to the end state of every remaining phase.
    pub fn finish(
        &mut self,
        behaviour: &FlowBehaviour,
        cache: &mut CoverCache,
        sink: &mut dyn ActorSink,
    ) -> TransitionFrame {
        let steps = self.score.complete();
        self.apply_steps(&steps, behaviour, cache, sink)
    }

    fn apply_steps(
        &mut self,
        steps: &[ScoreStep<TransitionPhase>],
        behaviour: &FlowBehaviour,
        cache: &mut CoverCache,
        sink: &mut dyn ActorSink,
    ) -> TransitionFrame {
        let mut frame = TransitionFrame::default();
        let motion = Motion::at_rest(self.plan.new_progress);

        for step in steps {
            trace!(phase = ?step.phase, progress = step.progress, "Transition step");
            match step.phase {
                TransitionPhase::FadeOut => {
                    for &(id, from) in &self.fade_out_from {
                        if step.finished {
                            behaviour.hide(id, cache, sink);
                            continue;
                        }
                        let opacity = lerp_opacity(from, 0, step.progress);
                        sink.set_opacity(id, opacity);
                        if let Some(slot) = cache.slot_mut(id) {
                            slot.opacity = opacity;
                        }
                    }
                }
                TransitionPhase::Slide => {
                    for slide in &self.plan.slides {
                        let alpha =
                            slide.alpha_from + (slide.alpha_to - slide.alpha_from) * step.progress;
                        if behaviour.apply_alpha(slide.id, alpha, &motion, cache, sink) {
                            frame.shown.push(slide.id);
                        }
                    }
                }
                TransitionPhase::FadeIn => {
                    if self.fade_in_to.is_empty() {
                        for fade in &self.plan.fade_in {
                            let state = behaviour.state_for_alpha(fade.alpha, &motion);
                            if behaviour.apply_alpha(fade.id, fade.alpha, &motion, cache, sink) {
                                frame.shown.push(fade.id);
                            }
                            self.fade_in_to.push((fade.id, state.opacity));
                        }
                    }
                    for &(id, to) in &self.fade_in_to {
                        let opacity = lerp_opacity(0, to, step.progress);
                        sink.set_opacity(id, opacity);
                        if let Some(slot) = cache.slot_mut(id) {
                            slot.opacity = opacity;
                            slot.visible = to > 0;
                        }
                    }
                }
            }
        }

        frame.finished = !self.score.is_playing();
        frame
    }
}

fn lerp_opacity(from: u8, to: u8, progress: f64) -> u8 {
    let value = from as f64 + (to as f64 - from as f64) * progress.clamp(0.0, 1.0);
    value.round().clamp(0.0, 255.0) as u8
}
