use crate::{
    collection::TrackCollection,
    foundation::core::{AttributeId, FrameIndex, TrackId},
    foundation::error::{AnnotrackError, AnnotrackResult},
    journal::Keyframe,
    schema::{AttributeValue, LabelRegistry},
    track::{AttributeWrite, KeyframeToggle},
};

/// One engine mutation, expressed against the public mutator APIs so a
/// history stack can be replayed or serialized. Frame context is carried in
/// the op itself: replay does not depend on where the playhead sits now.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum EngineOp {
    SetOccluded {
        track: TrackId,
        frame: FrameIndex,
        value: bool,
    },
    SetOutside {
        track: TrackId,
        frame: FrameIndex,
        value: bool,
    },
    InsertKeyframe {
        track: TrackId,
        frame: FrameIndex,
    },
    RemoveKeyframe {
        track: TrackId,
        frame: FrameIndex,
    },
    /// Inverse of a keyframe removal: puts back the stored geometry and the
    /// mutable timeline entries deleted with it.
    RestoreKeyframe {
        track: TrackId,
        frame: FrameIndex,
        keyframe: Keyframe,
        attribute_entries: Vec<(AttributeId, AttributeValue)>,
    },
    RecordAttribute {
        track: TrackId,
        frame: FrameIndex,
        attribute: AttributeId,
        value: AttributeValue,
    },
    /// Inverse of a mutable attribute write at one frame.
    RestoreMutableAttribute {
        track: TrackId,
        frame: FrameIndex,
        attribute: AttributeId,
        previous: Option<AttributeValue>,
    },
    /// Inverse of an immutable attribute write.
    RestoreImmutableAttribute {
        track: TrackId,
        attribute: AttributeId,
        previous: AttributeValue,
    },
    RemoveTrack {
        track: TrackId,
    },
    RestoreTrack {
        track: TrackId,
    },
}

impl EngineOp {
    /// Replay this op against the collection.
    pub fn execute(
        &self,
        collection: &mut TrackCollection,
        registry: &LabelRegistry,
    ) -> AnnotrackResult<()> {
        match self {
            Self::SetOccluded { track, frame, value } => {
                at_frame(collection, *track, *frame, |t| {
                    t.set_occluded(*value);
                })
            }
            Self::SetOutside { track, frame, value } => {
                at_frame(collection, *track, *frame, |t| {
                    t.set_outside(*value);
                })
            }
            Self::InsertKeyframe { track, frame } => at_frame(collection, *track, *frame, |t| {
                t.set_key_frame(true);
            }),
            Self::RemoveKeyframe { track, frame } => at_frame(collection, *track, *frame, |t| {
                t.set_key_frame(false);
            }),
            Self::RestoreKeyframe {
                track,
                frame,
                keyframe,
                attribute_entries,
            } => at_frame(collection, *track, *frame, |t| {
                t.restore_keyframe(*frame, *keyframe, attribute_entries);
            }),
            Self::RecordAttribute {
                track,
                frame,
                attribute,
                value,
            } => {
                let target = *track;
                let f = *frame;
                let t = collection
                    .get_mut(target)
                    .ok_or_else(|| unknown_track(target))?;
                let saved = t.cur_frame();
                t.set_cur_frame(f)?;
                let result = t.record_attribute_and_keyframe(*attribute, value.clone(), registry);
                let t = collection
                    .get_mut(target)
                    .ok_or_else(|| unknown_track(target))?;
                t.set_cur_frame(saved)?;
                result?;
                collection.push_event(crate::collection::EngineEvent::TrackUpdated(target));
                Ok(())
            }
            Self::RestoreMutableAttribute {
                track,
                frame,
                attribute,
                previous,
            } => at_frame(collection, *track, *frame, |t| {
                t.restore_mutable_attribute(*attribute, *frame, previous.clone());
            }),
            Self::RestoreImmutableAttribute {
                track,
                attribute,
                previous,
            } => {
                let t = collection
                    .get_mut(*track)
                    .ok_or_else(|| unknown_track(*track))?;
                t.restore_immutable_attribute(*attribute, previous.clone());
                Ok(())
            }
            Self::RemoveTrack { track } => {
                collection.remove(*track);
                Ok(())
            }
            Self::RestoreTrack { track } => {
                collection.restore(*track);
                Ok(())
            }
        }
    }
}

fn unknown_track(id: TrackId) -> AnnotrackError {
    AnnotrackError::validation(format!("unknown track id {}", id.0))
}

/// Run `f` on a track with its cur_frame temporarily set to `frame`, then
/// queue the update event consumers expect from any completed mutation.
fn at_frame(
    collection: &mut TrackCollection,
    id: TrackId,
    frame: FrameIndex,
    f: impl FnOnce(&mut crate::track::Track),
) -> AnnotrackResult<()> {
    let track = collection.get_mut(id).ok_or_else(|| unknown_track(id))?;
    let saved = track.cur_frame();
    track.set_cur_frame(frame)?;
    f(track);
    track.set_cur_frame(saved)?;
    collection.push_event(crate::collection::EngineEvent::TrackUpdated(id));
    Ok(())
}

/// A completed mutation paired with its inverse.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Command {
    pub forward: EngineOp,
    pub inverse: EngineOp,
}

impl Command {
    /// Flip occlusion and record the inverse from the pre-state.
    pub fn set_occluded(
        collection: &mut TrackCollection,
        id: TrackId,
        value: bool,
    ) -> Option<Command> {
        let track = collection.get(id)?;
        let frame = track.cur_frame();
        let previous = track.interpolate(frame).position.occluded;
        let had_key = track.journal().contains(frame);
        collection.set_occluded(id, value).then_some(Command {
            forward: EngineOp::SetOccluded { track: id, frame, value },
            // a write on a non-key frame materializes a keyframe; the
            // inverse removes it rather than writing the old flag back
            inverse: if had_key {
                EngineOp::SetOccluded {
                    track: id,
                    frame,
                    value: previous,
                }
            } else {
                EngineOp::RemoveKeyframe { track: id, frame }
            },
        })
    }

    /// Flip the outside flag and record the inverse from the pre-state.
    pub fn set_outside(
        collection: &mut TrackCollection,
        id: TrackId,
        value: bool,
    ) -> Option<Command> {
        let track = collection.get(id)?;
        let frame = track.cur_frame();
        let previous = track.interpolate(frame).position.outsided;
        let had_key = track.journal().contains(frame);
        collection.set_outside(id, value).then_some(Command {
            forward: EngineOp::SetOutside { track: id, frame, value },
            inverse: if had_key {
                EngineOp::SetOutside {
                    track: id,
                    frame,
                    value: previous,
                }
            } else {
                EngineOp::RemoveKeyframe { track: id, frame }
            },
        })
    }

    /// Toggle a keyframe and record the inverse; removals capture enough
    /// state to put back geometry and attribute entries.
    pub fn set_key_frame(
        collection: &mut TrackCollection,
        id: TrackId,
        enable: bool,
    ) -> Option<Command> {
        match collection.set_key_frame(id, enable) {
            KeyframeToggle::Unchanged => None,
            KeyframeToggle::Inserted { frame } => Some(Command {
                forward: EngineOp::InsertKeyframe { track: id, frame },
                inverse: EngineOp::RemoveKeyframe { track: id, frame },
            }),
            KeyframeToggle::Removed {
                frame,
                keyframe,
                attribute_entries,
            } => Some(Command {
                forward: EngineOp::RemoveKeyframe { track: id, frame },
                inverse: EngineOp::RestoreKeyframe {
                    track: id,
                    frame,
                    keyframe,
                    attribute_entries,
                },
            }),
        }
    }

    /// Record an attribute value and the inverse restoring the pre-state.
    pub fn record_attribute(
        collection: &mut TrackCollection,
        id: TrackId,
        attr: AttributeId,
        value: AttributeValue,
        registry: &LabelRegistry,
    ) -> AnnotrackResult<Option<Command>> {
        let had_key = collection
            .get(id)
            .is_some_and(|t| t.journal().contains(t.cur_frame()));
        let write = collection.record_attribute(id, attr, value.clone(), registry)?;
        Ok(match write {
            AttributeWrite::Blocked => None,
            AttributeWrite::Immutable { previous } => Some(Command {
                forward: EngineOp::RecordAttribute {
                    track: id,
                    frame: collection.cur_frame(),
                    attribute: attr,
                    value,
                },
                inverse: EngineOp::RestoreImmutableAttribute {
                    track: id,
                    attribute: attr,
                    previous,
                },
            }),
            AttributeWrite::Mutable { frame, previous } => Some(Command {
                forward: EngineOp::RecordAttribute {
                    track: id,
                    frame,
                    attribute: attr,
                    value,
                },
                // removing the keyframe the write materialized also drops
                // the timeline entry recorded with it
                inverse: if had_key {
                    EngineOp::RestoreMutableAttribute {
                        track: id,
                        frame,
                        attribute: attr,
                        previous,
                    }
                } else {
                    EngineOp::RemoveKeyframe { track: id, frame }
                },
            }),
        })
    }

    /// Soft-delete a track with its restore inverse.
    pub fn remove_track(collection: &mut TrackCollection, id: TrackId) -> Option<Command> {
        collection.remove(id).then_some(Command {
            forward: EngineOp::RemoveTrack { track: id },
            inverse: EngineOp::RestoreTrack { track: id },
        })
    }
}

/// Linear undo/redo stacks of completed commands.
#[derive(Clone, Debug, Default)]
pub struct History {
    undo: Vec<Command>,
    redo: Vec<Command>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Push a freshly completed command. Any redo tail is discarded.
    pub fn push(&mut self, command: Command) {
        self.undo.push(command);
        self.redo.clear();
    }

    /// Revert the most recent command. Returns whether anything was undone.
    pub fn undo(
        &mut self,
        collection: &mut TrackCollection,
        registry: &LabelRegistry,
    ) -> AnnotrackResult<bool> {
        let Some(command) = self.undo.pop() else {
            return Ok(false);
        };
        command.inverse.execute(collection, registry)?;
        self.redo.push(command);
        Ok(true)
    }

    /// Re-apply the most recently undone command.
    pub fn redo(
        &mut self,
        collection: &mut TrackCollection,
        registry: &LabelRegistry,
    ) -> AnnotrackResult<bool> {
        let Some(command) = self.redo.pop() else {
            return Ok(false);
        };
        command.forward.execute(collection, registry)?;
        self.undo.push(command);
        Ok(true)
    }
}
