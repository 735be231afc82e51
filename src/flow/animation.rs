//! Phase sequencing for timed animations.
//!
//! A [`Score`] chains phases so each starts when the previous one completes.
//! It is advanced by the caller with the elapsed time of a frame and never
//! reads a clock.

use std::time::Duration;

/// Progress report for one phase during a [`Score::advance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreStep<P> {
    pub phase: P,
    /// Phase progress in [0, 1].
    pub progress: f64,
    /// True when the phase completed during this advance.
    pub finished: bool,
}

/// Phases played back to back.
#[derive(Debug, Clone)]
pub struct Score<P> {
    phases: Vec<(P, Duration)>,
    current: usize,
    elapsed: Duration,
    playing: bool,
}

impl<P> Default for Score<P> {
    fn default() -> Self {
        Self {
            phases: Vec::new(),
            current: 0,
            elapsed: Duration::ZERO,
            playing: false,
        }
    }
}

impl<P: Copy> Score<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a phase after the existing ones.
    pub fn append(&mut self, phase: P, duration: Duration) {
        self.phases.push((phase, duration));
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn start(&mut self) {
        self.current = 0;
        self.elapsed = Duration::ZERO;
        self.playing = !self.phases.is_empty();
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// The phase being played, if any.
    pub fn current_phase(&self) -> Option<P> {
        if !self.playing {
            return None;
        }
        self.phases.get(self.current).map(|(phase, _)| *phase)
    }

    /// Plays `dt` worth of the score.
    ///
    /// Every phase touched gets a step; time left after a phase finishes
    /// flows into the next one. Zero-length phases finish on the first
    /// advance that reaches them.
    pub fn advance(&mut self, dt: Duration) -> Vec<ScoreStep<P>> {
        let mut steps = Vec::new();
        let mut budget = dt;
        while self.playing {
            let Some(&(phase, duration)) = self.phases.get(self.current) else {
                self.playing = false;
                break;
            };
            let remaining = duration.saturating_sub(self.elapsed);
            if budget >= remaining {
                budget -= remaining;
                steps.push(ScoreStep {
                    phase,
                    progress: 1.0,
                    finished: true,
                });
                self.current += 1;
                self.elapsed = Duration::ZERO;
                if self.current >= self.phases.len() {
                    self.playing = false;
                }
            } else {
                self.elapsed += budget;
                steps.push(ScoreStep {
                    phase,
                    progress: self.elapsed.as_secs_f64() / duration.as_secs_f64(),
                    finished: false,
                });
                break;
            }
        }
        steps
    }

    /// Finishes every remaining phase at once.
    pub fn complete(&mut self) -> Vec<ScoreStep<P>> {
        let mut steps = Vec::new();
        if !self.playing {
            return steps;
        }
        for &(phase, _) in &self.phases[self.current..] {
            steps.push(ScoreStep {
                phase,
                progress: 1.0,
                finished: true,
            });
        }
        self.current = self.phases.len();
        self.playing = false;
        steps
    }
}
