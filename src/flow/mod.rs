//! The cover flow: layout, transitions and the coordinator tying them to the
//! timeline and the artwork fetcher.

pub mod actor;
pub mod animation;
pub mod behaviour;
pub mod cache;
pub mod loader;
pub mod manager;
pub mod transition;

pub use actor::{ActorCall, ActorSink, DisplayState, NullSink, RecordingSink};
pub use animation::{Score, ScoreStep};
pub use behaviour::{alpha, band_for, Band, FlowBehaviour, Geometry, Motion, Side};
pub use cache::{ArtworkState, CoverCache, CoverSlot, EMPTY_COVER_KEY};
pub use loader::{CoverLoader, LetterLookup, LoadedCovers, SortBy};
pub use manager::{CoverManager, FlowEvent};
pub use transition::{Transition, TransitionPhase, TransitionPlan, TransitionSets};
