//! Headless cover-flow engine.
//!
//! Two engines make up the flow: a focus-ordered background artwork loader
//! ([`artwork::ArtworkFetcher`] over [`queue::FocusOrderedQueue`]) and a
//! variable-speed timeline with the transitions built on it
//! ([`timeline::AdaptiveTimeline`], [`flow::CoverManager`]). Rendering is left
//! to the host through [`flow::ActorSink`].

pub mod artwork;
pub mod config;
pub mod error;
pub mod flow;
pub mod library;
pub mod models;
pub mod queue;
pub mod timeline;

pub use config::FlowConfig;
pub use error::{ArtworkError, QueueError};
pub use flow::{ActorSink, CoverManager, DisplayState, FlowEvent};
pub use models::{Cover, CoverId, ListEvent, SourceEntry, SourceList};
