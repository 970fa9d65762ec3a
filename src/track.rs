use std::collections::BTreeMap;

use crate::{
    foundation::core::{AttributeId, FrameIndex, JobBounds, LabelId, TrackId},
    foundation::error::{AnnotrackError, AnnotrackResult},
    journal::{InterpolatedBox, Keyframe, PositionJournal},
    schema::{AttributeValue, LabelRegistry},
};

/// Geometry kind of a track. Only rectangular boxes are implemented;
/// requesting any other kind is a validation error at import.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Box,
}

/// Classification derived from the journal's visible frame count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    /// Visible on at most one frame: a plain labeled shape.
    Annotation,
    /// Visible across a span of frames: an interpolated track.
    Interpolation,
}

/// Independent boolean flags with priority rules enforced by the setters:
/// `removed` suppresses all mutation, `lock` suppresses geometry and
/// attribute mutation, `active_aam` implies `active` and blocks the plain
/// outside and lock setters while the navigator owns the track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrackFlags {
    pub lock: bool,
    pub removed: bool,
    pub hidden: bool,
    pub hidden_label: bool,
    pub active: bool,
    pub merge: bool,
    pub selected: bool,
    pub active_aam: bool,
}

/// Everything a renderer needs at one frame: the reconstructed box and the
/// attribute values in force.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackState {
    pub position: Keyframe,
    pub key_frame: bool,
    pub attributes: BTreeMap<AttributeId, AttributeValue>,
}

/// Outcome of a keyframe toggle, with enough detail to invert it.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyframeToggle {
    Unchanged,
    Inserted {
        frame: FrameIndex,
    },
    Removed {
        frame: FrameIndex,
        keyframe: Keyframe,
        /// Mutable timeline entries that were recorded at exactly this frame
        /// and deleted along with it.
        attribute_entries: Vec<(AttributeId, AttributeValue)>,
    },
}

/// Outcome of an attribute write, with the pre-state needed to invert it.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeWrite {
    /// Guarded no-op on a locked or removed track.
    Blocked,
    Immutable {
        previous: AttributeValue,
    },
    Mutable {
        frame: FrameIndex,
        previous: Option<AttributeValue>,
    },
}

/// One attribute assignment inside an export record.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AttributeRecord {
    pub id: AttributeId,
    pub value: AttributeValue,
}

/// A single labeled shape: an Annotation-type track at its one visible frame.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShapeRecord {
    pub id: TrackId,
    pub label: LabelId,
    pub shape: ShapeKind,
    pub frame: FrameIndex,
    pub xtl: f64,
    pub ytl: f64,
    pub xbr: f64,
    pub ybr: f64,
    pub occluded: bool,
    /// Immutable attributes plus mutable values recorded exactly at `frame`.
    pub attributes: Vec<AttributeRecord>,
}

/// One journal key of an Interpolation-type track.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoxRecord {
    pub frame: FrameIndex,
    pub xtl: f64,
    pub ytl: f64,
    pub xbr: f64,
    pub ybr: f64,
    pub outsided: bool,
    pub occluded: bool,
    /// Mutable attribute values in force at this key.
    pub attributes: Vec<AttributeRecord>,
}

/// An interpolated track: one box per journal key plus track-level
/// immutable attributes.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InterpolationRecord {
    pub id: TrackId,
    pub label: LabelId,
    pub shape: ShapeKind,
    pub attributes: Vec<AttributeRecord>,
    pub boxes: Vec<BoxRecord>,
}

/// Server-shaped persistence record for one track.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackRecord {
    Annotation(ShapeRecord),
    Interpolation(InterpolationRecord),
}

/// One annotated object: a position journal plus two attribute timelines.
#[derive(Clone, Debug)]
pub struct Track {
    id: TrackId,
    label: LabelId,
    shape_kind: ShapeKind,
    bounds: JobBounds,
    journal: PositionJournal,
    /// One value for the track's whole lifetime.
    immutable: BTreeMap<AttributeId, AttributeValue>,
    /// Step functions: the value in force at frame F is the value at the
    /// greatest key <= F, falling back to the earliest entry. Every timeline
    /// holds at least one entry.
    mutable: BTreeMap<AttributeId, BTreeMap<FrameIndex, AttributeValue>>,
    cur_frame: FrameIndex,
    first_frame: Option<FrameIndex>,
    flags: TrackFlags,
}

impl Track {
    /// Create a track from a finished user-drawn shape: one initial keyframe
    /// plus schema-default attribute timelines.
    pub fn from_drawn_shape(
        id: TrackId,
        label: LabelId,
        frame: FrameIndex,
        keyframe: Keyframe,
        registry: &LabelRegistry,
        bounds: JobBounds,
    ) -> AnnotrackResult<Self> {
        if !bounds.contains(frame) {
            return Err(AnnotrackError::validation(format!(
                "shape frame {} outside job bounds [{}, {}]",
                frame.0, bounds.start.0, bounds.stop.0
            )));
        }
        let mut track = Self {
            id,
            label,
            shape_kind: ShapeKind::Box,
            bounds,
            journal: PositionJournal::new(frame, keyframe),
            immutable: BTreeMap::new(),
            mutable: BTreeMap::new(),
            cur_frame: frame,
            first_frame: None,
            flags: TrackFlags::default(),
        };
        track.first_frame = track.journal.first_visible_frame();
        track.init_default_attributes(registry)?;
        Ok(track)
    }

    /// Rebuild a track from a persistence record.
    ///
    /// Every attribute id in the record is validated against the label
    /// schema; a reference to an unknown attribute is a schema error, never
    /// guessed at or silently dropped.
    pub fn from_record(
        record: &TrackRecord,
        registry: &LabelRegistry,
        bounds: JobBounds,
    ) -> AnnotrackResult<Self> {
        match record {
            TrackRecord::Annotation(shape) => {
                let keyframe = Keyframe {
                    xtl: shape.xtl,
                    ytl: shape.ytl,
                    xbr: shape.xbr,
                    ybr: shape.ybr,
                    outsided: false,
                    occluded: shape.occluded,
                };
                let mut track = Self::from_drawn_shape(
                    shape.id,
                    shape.label,
                    shape.frame,
                    keyframe,
                    registry,
                    bounds,
                )?;
                for attr in &shape.attributes {
                    let schema = registry.attribute(shape.label, attr.id)?;
                    if schema.mutable {
                        track
                            .mutable
                            .entry(attr.id)
                            .or_default()
                            .insert(shape.frame, attr.value.clone());
                    } else {
                        track.immutable.insert(attr.id, attr.value.clone());
                    }
                }
                Ok(track)
            }
            TrackRecord::Interpolation(interp) => {
                if interp.boxes.is_empty() {
                    return Err(AnnotrackError::validation(
                        "interpolation record must contain at least one box",
                    ));
                }
                for b in &interp.boxes {
                    if !bounds.contains(b.frame) {
                        return Err(AnnotrackError::validation(format!(
                            "box frame {} outside job bounds [{}, {}]",
                            b.frame.0, bounds.start.0, bounds.stop.0
                        )));
                    }
                }
                let journal = PositionJournal::from_keys(interp.boxes.iter().map(|b| {
                    (
                        b.frame,
                        Keyframe {
                            xtl: b.xtl,
                            ytl: b.ytl,
                            xbr: b.xbr,
                            ybr: b.ybr,
                            outsided: b.outsided,
                            occluded: b.occluded,
                        },
                    )
                }))?;
                let cur_frame = bounds.clamp(journal.earliest());
                let mut track = Self {
                    id: interp.id,
                    label: interp.label,
                    shape_kind: interp.shape,
                    bounds,
                    journal,
                    immutable: BTreeMap::new(),
                    mutable: BTreeMap::new(),
                    cur_frame,
                    first_frame: None,
                    flags: TrackFlags::default(),
                };
                track.first_frame = track.journal.first_visible_frame();
                track.init_default_attributes(registry)?;
                for attr in &interp.attributes {
                    let schema = registry.attribute(interp.label, attr.id)?;
                    if schema.mutable {
                        return Err(AnnotrackError::schema(format!(
                            "mutable attribute {} in track-level attribute list",
                            attr.id.0
                        )));
                    }
                    track.immutable.insert(attr.id, attr.value.clone());
                }
                for b in &interp.boxes {
                    for attr in &b.attributes {
                        let schema = registry.attribute(interp.label, attr.id)?;
                        if !schema.mutable {
                            return Err(AnnotrackError::schema(format!(
                                "immutable attribute {} in per-box attribute list",
                                attr.id.0
                            )));
                        }
                        track
                            .mutable
                            .entry(attr.id)
                            .or_default()
                            .insert(b.frame, attr.value.clone());
                    }
                }
                Ok(track)
            }
        }
    }

    fn init_default_attributes(&mut self, registry: &LabelRegistry) -> AnnotrackResult<()> {
        let anchor = self.anchor_frame();
        let schema = registry.label(self.label)?;
        self.immutable.clear();
        self.mutable.clear();
        for attr in &schema.attributes {
            if attr.mutable {
                let mut timeline = BTreeMap::new();
                timeline.insert(anchor, attr.default.clone());
                self.mutable.insert(attr.id, timeline);
            } else {
                self.immutable.insert(attr.id, attr.default.clone());
            }
        }
        Ok(())
    }

    /// Anchor for mutable attribute timelines: the first visible frame, or
    /// the earliest journal key when every key is outsided.
    fn anchor_frame(&self) -> FrameIndex {
        self.first_frame.unwrap_or_else(|| self.journal.earliest())
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn label(&self) -> LabelId {
        self.label
    }

    pub fn shape_kind(&self) -> ShapeKind {
        self.shape_kind
    }

    pub fn bounds(&self) -> JobBounds {
        self.bounds
    }

    pub fn cur_frame(&self) -> FrameIndex {
        self.cur_frame
    }

    /// Frame the track becomes visible, recomputed after every mutation.
    pub fn first_frame(&self) -> Option<FrameIndex> {
        self.first_frame
    }

    pub fn journal(&self) -> &PositionJournal {
        &self.journal
    }

    pub fn flags(&self) -> TrackFlags {
        self.flags
    }

    /// Annotation when visible on at most one frame, Interpolation otherwise.
    pub fn kind(&self) -> TrackKind {
        if self.journal.visible_frame_count(self.bounds.stop) <= 1 {
            TrackKind::Annotation
        } else {
            TrackKind::Interpolation
        }
    }

    /// Assign the transient current frame. Out-of-bounds is a fatal error.
    pub fn set_cur_frame(&mut self, frame: FrameIndex) -> AnnotrackResult<()> {
        if !self.bounds.contains(frame) {
            return Err(AnnotrackError::validation(format!(
                "cur_frame {} outside job bounds [{}, {}]",
                frame.0, self.bounds.start.0, self.bounds.stop.0
            )));
        }
        self.cur_frame = frame;
        Ok(())
    }

    // -- flag setters ------------------------------------------------------

    /// Locked tracks reject geometry and attribute mutation. Blocked while
    /// the navigator holds the track.
    pub fn set_lock(&mut self, value: bool) -> bool {
        if self.flags.removed || self.flags.active_aam {
            return false;
        }
        self.flags.lock = value;
        true
    }

    pub fn set_hidden(&mut self, value: bool) -> bool {
        if self.flags.removed {
            return false;
        }
        self.flags.hidden = value;
        true
    }

    pub fn set_hidden_label(&mut self, value: bool) -> bool {
        if self.flags.removed {
            return false;
        }
        self.flags.hidden_label = value;
        true
    }

    pub fn set_active(&mut self, value: bool) -> bool {
        if self.flags.removed {
            return false;
        }
        self.flags.active = value;
        true
    }

    pub fn set_selected(&mut self, value: bool) -> bool {
        if self.flags.removed {
            return false;
        }
        self.flags.selected = value;
        true
    }

    pub fn set_merge(&mut self, value: bool) -> bool {
        if self.flags.removed {
            return false;
        }
        self.flags.merge = value;
        true
    }

    /// Navigator focus flag; implies `active` while held.
    pub fn set_active_aam(&mut self, value: bool) -> bool {
        if self.flags.removed {
            return false;
        }
        self.flags.active_aam = value;
        self.flags.active = value;
        true
    }

    pub(crate) fn mark_removed(&mut self, value: bool) {
        self.flags.removed = value;
    }

    // -- reads -------------------------------------------------------------

    /// The single read entry point for rendering: reconstructed box plus the
    /// attribute values in force at `frame`.
    pub fn interpolate(&self, frame: FrameIndex) -> TrackState {
        let sampled = self.interpolated_box(frame);
        let mut attributes = self.immutable.clone();
        for (id, timeline) in &self.mutable {
            attributes.insert(*id, step_value(timeline, frame));
        }
        TrackState {
            position: sampled.position,
            key_frame: sampled.key_frame,
            attributes,
        }
    }

    fn interpolated_box(&self, frame: FrameIndex) -> InterpolatedBox {
        self.journal.interpolate(frame, self.first_frame)
    }

    /// Value of one mutable attribute in force at `frame`, when recorded.
    pub fn mutable_value_at(&self, attr: AttributeId, frame: FrameIndex) -> Option<AttributeValue> {
        self.mutable.get(&attr).map(|t| step_value(t, frame))
    }

    /// Nearest stored key strictly before the current frame, clamped so
    /// keyboard navigation never jumps before the track's first frame.
    pub fn prev_key_frame(&self) -> Option<FrameIndex> {
        let (prev, _) = self.journal.prev_next(self.cur_frame);
        match (prev, self.first_frame) {
            (Some(p), Some(first)) if p.0 < first.0 => Some(first),
            _ => prev,
        }
    }

    /// Nearest stored key strictly after the current frame.
    pub fn next_key_frame(&self) -> Option<FrameIndex> {
        self.journal.prev_next(self.cur_frame).1
    }

    // -- geometry mutation -------------------------------------------------

    /// Upsert the journal at `frame` and recompute derived state. Callers
    /// decide when a frame becomes a true keyframe vs. a scratch update.
    pub fn record_position(&mut self, keyframe: Keyframe, frame: FrameIndex) -> bool {
        if self.flags.removed || self.flags.lock {
            return false;
        }
        self.journal.record(frame, keyframe);
        self.first_frame = self.journal.first_visible_frame();
        true
    }

    /// Flip the occlusion flag at the current frame, keeping geometry as
    /// currently interpolated.
    pub fn set_occluded(&mut self, value: bool) -> bool {
        if self.flags.removed || self.flags.lock {
            return false;
        }
        let mut kf = self.interpolated_box(self.cur_frame).position;
        kf.occluded = value;
        self.record_position(kf, self.cur_frame)
    }

    /// Flip the outside flag at the current frame. Blocked while the
    /// navigator holds the track: navigation owns visibility in that mode.
    pub fn set_outside(&mut self, value: bool) -> bool {
        if self.flags.removed || self.flags.lock || self.flags.active_aam {
            return false;
        }
        let mut kf = self.interpolated_box(self.cur_frame).position;
        kf.outsided = value;
        self.record_position(kf, self.cur_frame)
    }

    /// Toggle keyframe storage at the current frame.
    ///
    /// Removing a keyframe also drops mutable timeline entries recorded at
    /// that exact frame (never an attribute's last entry). After any toggle
    /// the first frame is recomputed and timeline entries keyed at the old
    /// first frame are relocated to the new one, keeping the earliest
    /// recorded value in force when the track's effective start moves.
    pub fn set_key_frame(&mut self, enable: bool) -> KeyframeToggle {
        if self.flags.removed || self.flags.lock {
            return KeyframeToggle::Unchanged;
        }
        let frame = self.cur_frame;
        let old_first = self.first_frame;
        if enable {
            if !self.journal.set_key_frame(true, frame, self.first_frame) {
                return KeyframeToggle::Unchanged;
            }
            self.renormalize_timelines(old_first);
            KeyframeToggle::Inserted { frame }
        } else {
            let Some(keyframe) = self.journal.get(frame).copied() else {
                return KeyframeToggle::Unchanged;
            };
            if !self.journal.set_key_frame(false, frame, self.first_frame) {
                // last remaining keyframe is protected
                return KeyframeToggle::Unchanged;
            }
            let mut attribute_entries = Vec::new();
            for (attr, timeline) in self.mutable.iter_mut() {
                if timeline.len() > 1 {
                    if let Some(value) = timeline.remove(&frame) {
                        attribute_entries.push((*attr, value));
                    }
                }
            }
            self.renormalize_timelines(old_first);
            tracing::debug!(track = self.id.0, frame = frame.0, "keyframe removed");
            KeyframeToggle::Removed {
                frame,
                keyframe,
                attribute_entries,
            }
        }
    }

    fn renormalize_timelines(&mut self, old_first: Option<FrameIndex>) {
        self.first_frame = self.journal.first_visible_frame();
        let (Some(old), Some(new)) = (old_first, self.first_frame) else {
            return;
        };
        if old == new {
            return;
        }
        for timeline in self.mutable.values_mut() {
            if let Some(value) = timeline.remove(&old) {
                // an explicitly recorded entry at the new anchor wins
                timeline.entry(new).or_insert(value);
            }
        }
    }

    // -- attribute mutation ------------------------------------------------

    /// Record an attribute value at the current frame.
    ///
    /// Mutable attributes also re-assert the geometric keyframe at the
    /// current frame: attribute and geometry timelines share keyframe
    /// granularity. Immutable attributes overwrite their single scalar with
    /// no geometry side effect.
    pub fn record_attribute_and_keyframe(
        &mut self,
        attr: AttributeId,
        value: AttributeValue,
        registry: &LabelRegistry,
    ) -> AnnotrackResult<AttributeWrite> {
        if self.flags.removed || self.flags.lock {
            return Ok(AttributeWrite::Blocked);
        }
        let schema = registry.attribute(self.label, attr)?;
        if schema.mutable {
            let frame = self.cur_frame;
            let kf = self.interpolated_box(frame).position;
            let previous = self.mutable.entry(attr).or_default().insert(frame, value);
            self.record_position(kf, frame);
            Ok(AttributeWrite::Mutable { frame, previous })
        } else {
            let previous = self
                .immutable
                .insert(attr, value)
                .unwrap_or(AttributeValue::Unset);
            Ok(AttributeWrite::Immutable { previous })
        }
    }

    /// Replace attribute timelines with fresh schema defaults for a new
    /// label, leaving geometry untouched. Used on merge/relabel.
    pub fn reinitialize(&mut self, new_label: LabelId, registry: &LabelRegistry) -> AnnotrackResult<()> {
        if self.flags.removed {
            return Ok(());
        }
        registry.label(new_label)?;
        self.label = new_label;
        self.init_default_attributes(registry)
    }

    // -- history support ---------------------------------------------------

    /// Put back a keyframe removed by `set_key_frame(false)`, including the
    /// mutable timeline entries that were deleted with it.
    pub fn restore_keyframe(
        &mut self,
        frame: FrameIndex,
        keyframe: Keyframe,
        attribute_entries: &[(AttributeId, AttributeValue)],
    ) {
        self.journal.record(frame, keyframe);
        for (attr, value) in attribute_entries {
            self.mutable
                .entry(*attr)
                .or_default()
                .insert(frame, value.clone());
        }
        self.first_frame = self.journal.first_visible_frame();
    }

    /// Put back the pre-write state of one mutable timeline entry.
    /// `previous = None` removes the entry unless it is the timeline's last.
    pub fn restore_mutable_attribute(
        &mut self,
        attr: AttributeId,
        frame: FrameIndex,
        previous: Option<AttributeValue>,
    ) {
        let Some(timeline) = self.mutable.get_mut(&attr) else {
            return;
        };
        match previous {
            Some(value) => {
                timeline.insert(frame, value);
            }
            None => {
                if timeline.len() > 1 {
                    timeline.remove(&frame);
                }
            }
        }
    }

    /// Put back the pre-write value of an immutable attribute.
    pub fn restore_immutable_attribute(&mut self, attr: AttributeId, value: AttributeValue) {
        self.immutable.insert(attr, value);
    }

    // -- export ------------------------------------------------------------

    /// Emit the server-shaped persistence record for this track.
    ///
    /// A track with no visible key has no single shape that can stand for
    /// it, so it keeps the boxed form even when its frame count classifies
    /// it as an annotation. The outside flags survive reimport that way.
    #[tracing::instrument(skip(self), fields(track = self.id.0))]
    pub fn export(&self) -> TrackRecord {
        match self.kind() {
            TrackKind::Annotation if self.first_frame.is_some() => {
                let frame = self.anchor_frame();
                let kf = self
                    .journal
                    .get(frame)
                    .copied()
                    .unwrap_or_else(|| self.interpolated_box(frame).position);
                let mut attributes: Vec<AttributeRecord> = self
                    .immutable
                    .iter()
                    .map(|(id, value)| AttributeRecord {
                        id: *id,
                        value: value.clone(),
                    })
                    .collect();
                for (id, timeline) in &self.mutable {
                    if let Some(value) = timeline.get(&frame) {
                        attributes.push(AttributeRecord {
                            id: *id,
                            value: value.clone(),
                        });
                    }
                }
                attributes.sort_by_key(|a| a.id);
                TrackRecord::Annotation(ShapeRecord {
                    id: self.id,
                    label: self.label,
                    shape: self.shape_kind,
                    frame,
                    xtl: kf.xtl,
                    ytl: kf.ytl,
                    xbr: kf.xbr,
                    ybr: kf.ybr,
                    occluded: kf.occluded,
                    attributes,
                })
            }
            TrackKind::Annotation | TrackKind::Interpolation => {
                let boxes = self
                    .journal
                    .iter()
                    .map(|(frame, kf)| {
                        let mut attributes: Vec<AttributeRecord> = self
                            .mutable
                            .iter()
                            .map(|(id, timeline)| AttributeRecord {
                                id: *id,
                                value: step_value(timeline, frame),
                            })
                            .collect();
                        attributes.sort_by_key(|a| a.id);
                        BoxRecord {
                            frame,
                            xtl: kf.xtl,
                            ytl: kf.ytl,
                            xbr: kf.xbr,
                            ybr: kf.ybr,
                            outsided: kf.outsided,
                            occluded: kf.occluded,
                            attributes,
                        }
                    })
                    .collect();
                let attributes = self
                    .immutable
                    .iter()
                    .map(|(id, value)| AttributeRecord {
                        id: *id,
                        value: value.clone(),
                    })
                    .collect();
                TrackRecord::Interpolation(InterpolationRecord {
                    id: self.id,
                    label: self.label,
                    shape: self.shape_kind,
                    attributes,
                    boxes,
                })
            }
        }
    }
}

/// Step-function read: the value at the greatest key <= `frame`, falling
/// back to the earliest entry for frames before the first recorded change.
fn step_value(timeline: &BTreeMap<FrameIndex, AttributeValue>, frame: FrameIndex) -> AttributeValue {
    timeline
        .range(..=frame)
        .next_back()
        .or_else(|| timeline.iter().next())
        .map(|(_, v)| v.clone())
        .unwrap_or(AttributeValue::Unset)
}
