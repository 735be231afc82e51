//! The seam to the rendering layer.
//!
//! The flow never draws. It tells an [`ActorSink`] where each cover sits, how
//! opaque it is and which artwork it shows; the host maps that onto whatever
//! scene graph it renders with.

use crate::artwork::Artwork;
use crate::models::CoverId;

/// Everything a renderer needs to place one cover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayState {
    /// Horizontal position of the cover's anchor on the stage.
    pub x: f32,
    pub y: f32,
    /// Larger is nearer to the viewer.
    pub depth: f32,
    /// Rotation around the vertical axis in degrees.
    pub rotation_y: f32,
    pub opacity: u8,
    /// Darkening overlay strength, 0 = none.
    pub shade: u8,
    /// Which edge the shade gradient starts from.
    pub shade_left: bool,
    /// Uniform scale from texture size to on-screen cover width.
    pub scale: f32,
}

pub trait ActorSink {
    /// Shows the cover with the given state.
    fn apply(&mut self, id: CoverId, state: &DisplayState);
    fn hide(&mut self, id: CoverId);
    /// Changes only the opacity; used by fades.
    fn set_opacity(&mut self, id: CoverId, opacity: u8);
    /// `None` reverts the cover to its placeholder.
    fn set_artwork(&mut self, id: CoverId, artwork: Option<&Artwork>);
    /// Visible covers, back to front.
    fn restack(&mut self, order: &[CoverId]);
}

/// Sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ActorSink for NullSink {
    fn apply(&mut self, _id: CoverId, _state: &DisplayState) {}
    fn hide(&mut self, _id: CoverId) {}
    fn set_opacity(&mut self, _id: CoverId, _opacity: u8) {}
    fn set_artwork(&mut self, _id: CoverId, _artwork: Option<&Artwork>) {}
    fn restack(&mut self, _order: &[CoverId]) {}
}

/// One call received by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActorCall {
    Apply(CoverId, DisplayState),
    Hide(CoverId),
    SetOpacity(CoverId, u8),
    SetArtwork(CoverId, bool),
    Restack(Vec<CoverId>),
}

/// Sink that keeps every call, for tests and headless hosts.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub calls: Vec<ActorCall>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Vec<ActorCall> {
        std::mem::take(&mut self.calls)
    }

    /// Last opacity the cover was given, through `apply` or `set_opacity`.
    pub fn last_opacity(&self, id: CoverId) -> Option<u8> {
        self.calls.iter().rev().find_map(|call| match call {
            ActorCall::Apply(c, state) if *c == id => Some(state.opacity),
            ActorCall::SetOpacity(c, opacity) if *c == id => Some(*opacity),
            _ => None,
        })
    }

    pub fn was_hidden(&self, id: CoverId) -> bool {
        self.calls
            .iter()
            .any(|call| matches!(call, ActorCall::Hide(c) if *c == id))
    }
}

impl ActorSink for RecordingSink {
    fn apply(&mut self, id: CoverId, state: &DisplayState) {
        self.calls.push(ActorCall::Apply(id, *state));
    }

    fn hide(&mut self, id: CoverId) {
        self.calls.push(ActorCall::Hide(id));
    }

    fn set_opacity(&mut self, id: CoverId, opacity: u8) {
        self.calls.push(ActorCall::SetOpacity(id, opacity));
    }

    fn set_artwork(&mut self, id: CoverId, artwork: Option<&Artwork>) {
        self.calls.push(ActorCall::SetArtwork(id, artwork.is_some()));
    }

    fn restack(&mut self, order: &[CoverId]) {
        self.calls.push(ActorCall::Restack(order.to_vec()));
    }
}
