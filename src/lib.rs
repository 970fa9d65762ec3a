//! Annotrack is the temporal annotation track engine behind a video
//! annotation tool.
//!
//! A user marks an object's box on a sparse set of frames (keyframes); the
//! engine deterministically reconstructs position, occlusion, and attribute
//! values on every frame in between, including not-visible spans. The main
//! pieces:
//!
//! - [`PositionJournal`]: ordered sparse frame-to-keyframe map with linear
//!   interpolation
//! - [`Track`]: one journal plus mutable/immutable attribute timelines and
//!   the flag state machine
//! - [`TrackCollection`]: owns the track set and a typed update-event queue
//! - [`AttributeNavigator`]: keyboard-driven traversal of visible tracks and
//!   their attributes for rapid classification
//! - [`History`]: explicit command objects with inverses for undo/redo
#![forbid(unsafe_code)]

pub mod collection;
pub mod foundation;
pub mod history;
pub mod journal;
pub mod navigator;
pub mod schema;
pub mod track;

pub use collection::{EngineEvent, TrackCollection};
pub use foundation::core::{AttributeId, FrameIndex, JobBounds, LabelId, TrackId};
pub use foundation::error::{AnnotrackError, AnnotrackResult};
pub use history::{Command, EngineOp, History};
pub use journal::{InterpolatedBox, Keyframe, PositionJournal};
pub use navigator::{AttributeNavigator, FocusBox};
pub use schema::{AttributeKind, AttributeSchema, AttributeValue, LabelRegistry, LabelSchema};
pub use track::{
    AttributeRecord, AttributeWrite, BoxRecord, InterpolationRecord, KeyframeToggle, ShapeKind,
    ShapeRecord, Track, TrackFlags, TrackKind, TrackRecord, TrackState,
};
