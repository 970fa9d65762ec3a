use std::collections::VecDeque;

use crate::{
    foundation::core::{AttributeId, FrameIndex, JobBounds, TrackId},
    foundation::error::{AnnotrackError, AnnotrackResult},
    journal::Keyframe,
    schema::{AttributeValue, LabelRegistry},
    track::{AttributeWrite, KeyframeToggle, Track},
};

/// Typed update events, queued by the collection and drained by consumers
/// (renderer, undo stack, navigator). Events carry ids; consumers re-read
/// the full object state they need.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    TrackUpdated(TrackId),
    TrackRemoved(TrackId),
    FrameChanged(FrameIndex),
    NavigatorUpdated,
}

/// Owns the set of tracks for the current job.
///
/// All mutation runs synchronously on the caller's thread; every public
/// mutator recomputes derived track state before the matching event is
/// queued, so consumers draining the queue always observe consistent state.
#[derive(Clone, Debug)]
pub struct TrackCollection {
    bounds: JobBounds,
    tracks: Vec<Track>,
    cur_frame: FrameIndex,
    next_id: u64,
    events: VecDeque<EngineEvent>,
}

impl TrackCollection {
    pub fn new(bounds: JobBounds) -> Self {
        Self {
            bounds,
            tracks: Vec::new(),
            cur_frame: bounds.start,
            next_id: 0,
            events: VecDeque::new(),
        }
    }

    pub fn bounds(&self) -> JobBounds {
        self.bounds
    }

    pub fn cur_frame(&self) -> FrameIndex {
        self.cur_frame
    }

    /// Next free track id for user-drawn shapes.
    pub fn allocate_id(&mut self) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Take ownership of a new track. Its id must not collide.
    pub fn add(&mut self, track: Track) -> AnnotrackResult<TrackId> {
        let id = track.id();
        if self.tracks.iter().any(|t| t.id() == id) {
            return Err(AnnotrackError::validation(format!(
                "duplicate track id {}",
                id.0
            )));
        }
        self.next_id = self.next_id.max(id.0 + 1);
        self.tracks.push(track);
        self.events.push_back(EngineEvent::TrackUpdated(id));
        Ok(id)
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == id)
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id() == id)
    }

    /// Tracks not soft-deleted, in insertion order.
    pub fn live(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| !t.flags().removed)
    }

    /// Ids of live tracks, the navigator's snapshot source.
    pub fn live_ids(&self) -> Vec<TrackId> {
        self.live().map(|t| t.id()).collect()
    }

    /// Soft-delete: the track leaves live iteration but stays addressable
    /// for undo.
    pub fn remove(&mut self, id: TrackId) -> bool {
        let Some(track) = self.get_mut(id) else {
            return false;
        };
        if track.flags().removed {
            return false;
        }
        track.mark_removed(true);
        self.events.push_back(EngineEvent::TrackRemoved(id));
        true
    }

    /// Undo a soft-delete.
    pub fn restore(&mut self, id: TrackId) -> bool {
        let Some(track) = self.get_mut(id) else {
            return false;
        };
        if !track.flags().removed {
            return false;
        }
        track.mark_removed(false);
        self.events.push_back(EngineEvent::TrackUpdated(id));
        true
    }

    /// Move the whole job to `frame`. Out-of-bounds is fatal and nothing is
    /// mutated in that case.
    #[tracing::instrument(skip(self))]
    pub fn set_cur_frame(&mut self, frame: FrameIndex) -> AnnotrackResult<()> {
        if !self.bounds.contains(frame) {
            return Err(AnnotrackError::validation(format!(
                "cur_frame {} outside job bounds [{}, {}]",
                frame.0, self.bounds.start.0, self.bounds.stop.0
            )));
        }
        self.cur_frame = frame;
        for track in &mut self.tracks {
            track.set_cur_frame(frame)?;
        }
        self.events.push_back(EngineEvent::FrameChanged(frame));
        Ok(())
    }

    // -- per-track mutators that queue update events -----------------------

    pub fn set_occluded(&mut self, id: TrackId, value: bool) -> bool {
        let Some(track) = self.get_mut(id) else {
            return false;
        };
        let changed = track.set_occluded(value);
        if changed {
            self.events.push_back(EngineEvent::TrackUpdated(id));
        }
        changed
    }

    pub fn set_outside(&mut self, id: TrackId, value: bool) -> bool {
        let Some(track) = self.get_mut(id) else {
            return false;
        };
        let changed = track.set_outside(value);
        if changed {
            self.events.push_back(EngineEvent::TrackUpdated(id));
        }
        changed
    }

    pub fn record_position(&mut self, id: TrackId, keyframe: Keyframe, frame: FrameIndex) -> bool {
        let Some(track) = self.get_mut(id) else {
            return false;
        };
        let changed = track.record_position(keyframe, frame);
        if changed {
            self.events.push_back(EngineEvent::TrackUpdated(id));
        }
        changed
    }

    pub fn set_key_frame(&mut self, id: TrackId, enable: bool) -> KeyframeToggle {
        let Some(track) = self.get_mut(id) else {
            return KeyframeToggle::Unchanged;
        };
        let toggle = track.set_key_frame(enable);
        if toggle != KeyframeToggle::Unchanged {
            self.events.push_back(EngineEvent::TrackUpdated(id));
        }
        toggle
    }

    pub fn record_attribute(
        &mut self,
        id: TrackId,
        attr: AttributeId,
        value: AttributeValue,
        registry: &LabelRegistry,
    ) -> AnnotrackResult<AttributeWrite> {
        let Some(track) = self.get_mut(id) else {
            return Ok(AttributeWrite::Blocked);
        };
        let write = track.record_attribute_and_keyframe(attr, value, registry)?;
        if write != AttributeWrite::Blocked {
            self.events.push_back(EngineEvent::TrackUpdated(id));
        }
        Ok(write)
    }

    // -- event queue -------------------------------------------------------

    pub(crate) fn push_event(&mut self, event: EngineEvent) {
        self.events.push_back(event);
    }

    /// Drain queued events after a batch of mutations.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }
}
