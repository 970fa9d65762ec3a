use std::collections::BTreeMap;

use crate::{
    collection::{EngineEvent, TrackCollection},
    foundation::core::{FrameIndex, LabelId, TrackId},
    foundation::error::AnnotrackResult,
    schema::{AttributeKind, LabelRegistry},
};

/// Viewport rectangle for auto-zoom onto the focused track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FocusBox {
    pub xtl: f64,
    pub ytl: f64,
    pub xbr: f64,
    pub ybr: f64,
}

/// Keyboard-driven traversal over the live tracks of the current frame and
/// their attributes, in a fixed deterministic order.
///
/// The navigator never mutates geometry; it only writes visibility and focus
/// flags on tracks and records attribute values through the collection. Every
/// operation silently no-ops while disabled or when the track set is empty.
#[derive(Clone, Debug)]
pub struct AttributeNavigator {
    enabled: bool,
    /// Snapshot of live track ids, refreshed on every collection change.
    current_tracks: Vec<TrackId>,
    active_index: Option<usize>,
    /// Attribute cursor per label; `None` for labels without attributes,
    /// which still participate in track-level navigation.
    cursor_by_label: BTreeMap<LabelId, Option<usize>>,
    zoom_margin: f64,
}

impl AttributeNavigator {
    pub fn new(zoom_margin: f64) -> Self {
        Self {
            enabled: false,
            current_tracks: Vec::new(),
            active_index: None,
            cursor_by_label: BTreeMap::new(),
            zoom_margin,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Id of the track currently holding navigator focus.
    pub fn active_track(&self) -> Option<TrackId> {
        self.active_index
            .and_then(|i| self.current_tracks.get(i).copied())
    }

    /// Attribute cursor position for a label.
    pub fn attribute_cursor(&self, label: LabelId) -> Option<usize> {
        self.cursor_by_label.get(&label).copied().flatten()
    }

    /// Enter attribute-annotation mode: hide everything except the focused
    /// track, mark it as navigator-owned, and point the cursor at the first
    /// attribute of its label.
    pub fn enable(&mut self, collection: &mut TrackCollection, registry: &LabelRegistry) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        self.current_tracks = collection.live_ids();
        self.active_index = if self.current_tracks.is_empty() {
            None
        } else {
            Some(0)
        };
        if let Some(id) = self.active_track() {
            if let Some(track) = collection.get(id) {
                self.reset_cursor(track.label(), registry);
            }
        }
        self.apply_focus(collection, registry);
        collection.push_event(EngineEvent::NavigatorUpdated);
    }

    /// Leave attribute-annotation mode: clear focus flags and un-hide all
    /// tracks.
    pub fn disable(&mut self, collection: &mut TrackCollection) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        for id in collection.live_ids() {
            if let Some(track) = collection.get_mut(id) {
                track.set_active_aam(false);
                track.set_hidden(false);
            }
        }
        self.active_index = None;
        self.current_tracks.clear();
        collection.push_event(EngineEvent::NavigatorUpdated);
    }

    /// Move focus to the next (`+1`) or previous (`-1`) track with
    /// wraparound, resetting the attribute cursor for the new track's label.
    pub fn next_track(
        &mut self,
        direction: i32,
        collection: &mut TrackCollection,
        registry: &LabelRegistry,
    ) {
        if !self.enabled || self.current_tracks.is_empty() {
            return;
        }
        let len = self.current_tracks.len() as i64;
        let idx = self.active_index.unwrap_or(0) as i64;
        let step = i64::from(direction.signum());
        let new = (idx + step).rem_euclid(len) as usize;
        self.active_index = Some(new);
        if let Some(id) = self.active_track() {
            if let Some(track) = collection.get(id) {
                self.reset_cursor(track.label(), registry);
            }
        }
        self.apply_focus(collection, registry);
        collection.push_event(EngineEvent::NavigatorUpdated);
    }

    /// Move the attribute cursor with wraparound. Labels with fewer than two
    /// attributes never advance.
    pub fn next_attribute(
        &mut self,
        direction: i32,
        collection: &mut TrackCollection,
        registry: &LabelRegistry,
    ) {
        if !self.enabled {
            return;
        }
        let Some(id) = self.active_track() else {
            return;
        };
        let Some(track) = collection.get(id) else {
            return;
        };
        let label = track.label();
        let Ok(schema) = registry.label(label) else {
            return;
        };
        let count = schema.attributes.len();
        if count < 2 {
            return;
        }
        let cursor = self.attribute_cursor(label).unwrap_or(0) as i64;
        let step = i64::from(direction.signum());
        let new = (cursor + step).rem_euclid(count as i64) as usize;
        self.cursor_by_label.insert(label, Some(new));
        collection.push_event(EngineEvent::NavigatorUpdated);
    }

    /// Map a single keypress (ordinal 0–9) to the Nth legal value of the
    /// attribute under the cursor and record it on the focused track.
    ///
    /// Checkboxes materialize their boolean negation as the second legal
    /// value on first use. Text and number attributes ignore ordinal input
    /// entirely. Returns whether a value was recorded.
    pub fn assign_by_ordinal(
        &mut self,
        ordinal: usize,
        collection: &mut TrackCollection,
        registry: &mut LabelRegistry,
    ) -> AnnotrackResult<bool> {
        if !self.enabled {
            return Ok(false);
        }
        let Some(id) = self.active_track() else {
            return Ok(false);
        };
        let Some(track) = collection.get(id) else {
            return Ok(false);
        };
        let label = track.label();
        let Some(cursor) = self.attribute_cursor(label) else {
            return Ok(false);
        };
        let (attr, kind, selected) = {
            let Some(attr_schema) = registry.label(label)?.attributes.get(cursor) else {
                return Ok(false);
            };
            (
                attr_schema.id,
                attr_schema.kind,
                attr_schema.values.get(ordinal).cloned(),
            )
        };
        let value = match kind {
            AttributeKind::Text | AttributeKind::Number => return Ok(false),
            AttributeKind::Checkbox => {
                if ordinal >= 2 {
                    return Ok(false);
                }
                if ordinal == 1 {
                    registry.materialize_checkbox_negation(label, attr)?;
                }
                match registry.attribute(label, attr)?.values.get(ordinal) {
                    Some(v) => v.clone(),
                    None => return Ok(false),
                }
            }
            AttributeKind::Select | AttributeKind::Radio => match selected {
                Some(v) if !v.is_unset() => v,
                _ => return Ok(false),
            },
        };
        tracing::debug!(track = id.0, attr = attr.0, ordinal, "ordinal value assigned");
        collection.record_attribute(id, attr, value, registry)?;
        collection.push_event(EngineEvent::NavigatorUpdated);
        Ok(true)
    }

    /// Re-sync with the externally-owned track set after any collection
    /// change: re-snapshot live tracks, preserve the active index when the
    /// focused track survives, and shift focus down (never wrapping below 0)
    /// when the focused track itself was removed.
    pub fn refresh(&mut self, collection: &mut TrackCollection, registry: &LabelRegistry) {
        if !self.enabled {
            return;
        }
        let focused = self.active_track();
        let fresh = collection.live_ids();
        self.active_index = match focused {
            Some(id) => match fresh.iter().position(|t| *t == id) {
                Some(pos) => Some(pos),
                None => {
                    if fresh.is_empty() {
                        None
                    } else {
                        let old = self.active_index.unwrap_or(0);
                        Some(old.saturating_sub(1).min(fresh.len() - 1))
                    }
                }
            },
            None => {
                if fresh.is_empty() {
                    None
                } else {
                    Some(0)
                }
            }
        };
        self.current_tracks = fresh;
        self.apply_focus(collection, registry);
        collection.push_event(EngineEvent::NavigatorUpdated);
    }

    /// Interpolated bounding box of the focused track at the current frame,
    /// inflated by the zoom margin, for the external viewport. `None` when
    /// nothing is focused or the object is outside on this frame.
    pub fn focus_box(&self, collection: &TrackCollection) -> Option<FocusBox> {
        let id = self.active_track()?;
        let track = collection.get(id)?;
        let state = track.interpolate(self.frame_of(collection));
        if state.position.outsided {
            return None;
        }
        Some(FocusBox {
            xtl: state.position.xtl - self.zoom_margin,
            ytl: state.position.ytl - self.zoom_margin,
            xbr: state.position.xbr + self.zoom_margin,
            ybr: state.position.ybr + self.zoom_margin,
        })
    }

    fn frame_of(&self, collection: &TrackCollection) -> FrameIndex {
        collection.cur_frame()
    }

    fn reset_cursor(&mut self, label: LabelId, registry: &LabelRegistry) {
        let cursor = match registry.label(label) {
            Ok(schema) if !schema.attributes.is_empty() => Some(0),
            _ => None,
        };
        self.cursor_by_label.insert(label, cursor);
    }

    /// Re-apply hidden/focus flags across the live set so exactly the
    /// focused track is visible and navigator-owned.
    fn apply_focus(&mut self, collection: &mut TrackCollection, registry: &LabelRegistry) {
        let active = self.active_track();
        for id in collection.live_ids() {
            let focused = active == Some(id);
            if let Some(track) = collection.get_mut(id) {
                track.set_active_aam(focused);
                track.set_hidden(!focused);
                if focused && !self.cursor_by_label.contains_key(&track.label()) {
                    let label = track.label();
                    self.reset_cursor(label, registry);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        foundation::core::{AttributeId, JobBounds},
        journal::Keyframe,
        schema::{AttributeSchema, AttributeValue, LabelSchema},
        track::Track,
    };

    fn registry() -> LabelRegistry {
        LabelRegistry::new([
            LabelSchema {
                id: LabelId(1),
                name: "person".to_string(),
                attributes: vec![
                    AttributeSchema::select(
                        AttributeId(10),
                        "action",
                        true,
                        vec![
                            AttributeValue::Choice("standing".to_string()),
                            AttributeValue::Choice("walking".to_string()),
                        ],
                    ),
                    AttributeSchema::checkbox(AttributeId(11), "occludes", true, false),
                ],
            },
            LabelSchema {
                id: LabelId(2),
                name: "marker".to_string(),
                attributes: vec![],
            },
        ])
    }

    fn setup(n: usize) -> (TrackCollection, Vec<TrackId>, LabelRegistry) {
        let bounds = JobBounds::new(FrameIndex(0), FrameIndex(20)).unwrap();
        let reg = registry();
        let mut col = TrackCollection::new(bounds);
        let mut ids = Vec::new();
        for i in 0..n {
            let id = col.allocate_id();
            let track = Track::from_drawn_shape(
                id,
                LabelId(1),
                FrameIndex(0),
                Keyframe::visible(i as f64 * 20.0, 0.0, i as f64 * 20.0 + 10.0, 10.0),
                &reg,
                bounds,
            )
            .unwrap();
            col.add(track).unwrap();
            ids.push(id);
        }
        col.drain_events();
        (col, ids, reg)
    }

    #[test]
    fn enable_focuses_first_track_and_hides_the_rest() {
        let (mut col, ids, reg) = setup(3);
        let mut nav = AttributeNavigator::new(0.0);
        nav.enable(&mut col, &reg);
        assert!(nav.is_enabled());
        assert_eq!(nav.active_track(), Some(ids[0]));
        assert!(col.get(ids[0]).unwrap().flags().active_aam);
        assert!(!col.get(ids[0]).unwrap().flags().hidden);
        assert!(col.get(ids[1]).unwrap().flags().hidden);
        assert!(col.get(ids[2]).unwrap().flags().hidden);
        assert_eq!(nav.attribute_cursor(LabelId(1)), Some(0));
    }

    #[test]
    fn disable_unhides_and_clears_focus() {
        let (mut col, ids, reg) = setup(2);
        let mut nav = AttributeNavigator::new(0.0);
        nav.enable(&mut col, &reg);
        nav.disable(&mut col);
        assert!(!nav.is_enabled());
        assert_eq!(nav.active_track(), None);
        for id in ids {
            let flags = col.get(id).unwrap().flags();
            assert!(!flags.hidden);
            assert!(!flags.active_aam);
            assert!(!flags.active);
        }
    }

    #[test]
    fn next_track_wraps_in_both_directions() {
        let (mut col, ids, reg) = setup(3);
        let mut nav = AttributeNavigator::new(0.0);
        nav.enable(&mut col, &reg);

        nav.next_track(1, &mut col, &reg);
        assert_eq!(nav.active_track(), Some(ids[1]));
        nav.next_track(1, &mut col, &reg);
        nav.next_track(1, &mut col, &reg);
        assert_eq!(nav.active_track(), Some(ids[0]));

        nav.next_track(-1, &mut col, &reg);
        assert_eq!(nav.active_track(), Some(ids[2]));
    }

    #[test]
    fn operations_noop_when_disabled_or_empty() {
        let (mut col, _, reg) = setup(0);
        let mut nav = AttributeNavigator::new(0.0);
        nav.next_track(1, &mut col, &reg);
        assert_eq!(nav.active_track(), None);

        let mut reg_mut = registry();
        nav.enable(&mut col, &reg);
        assert_eq!(nav.active_track(), None);
        assert!(!nav.assign_by_ordinal(0, &mut col, &mut reg_mut).unwrap());
    }

    #[test]
    fn attribute_cursor_wraps_and_respects_minimum() {
        let (mut col, _, reg) = setup(1);
        let mut nav = AttributeNavigator::new(0.0);
        nav.enable(&mut col, &reg);
        nav.next_attribute(1, &mut col, &reg);
        assert_eq!(nav.attribute_cursor(LabelId(1)), Some(1));
        nav.next_attribute(1, &mut col, &reg);
        assert_eq!(nav.attribute_cursor(LabelId(1)), Some(0));
        nav.next_attribute(-1, &mut col, &reg);
        assert_eq!(nav.attribute_cursor(LabelId(1)), Some(1));
    }

    #[test]
    fn ordinal_assignment_writes_through_the_collection() {
        let (mut col, ids, reg) = setup(1);
        let mut reg = reg;
        let mut nav = AttributeNavigator::new(0.0);
        nav.enable(&mut col, &reg.clone());
        let assigned = nav.assign_by_ordinal(1, &mut col, &mut reg).unwrap();
        assert!(assigned);
        let state = col.get(ids[0]).unwrap().interpolate(FrameIndex(0));
        assert_eq!(
            state.attributes[&AttributeId(10)],
            AttributeValue::Choice("walking".to_string())
        );
        // out-of-range ordinal is ignored
        assert!(!nav.assign_by_ordinal(7, &mut col, &mut reg).unwrap());
    }

    #[test]
    fn checkbox_negation_materializes_on_second_ordinal() {
        let (mut col, ids, reg) = setup(1);
        let mut reg = reg;
        let mut nav = AttributeNavigator::new(0.0);
        nav.enable(&mut col, &reg.clone());
        nav.next_attribute(1, &mut col, &reg.clone());
        let assigned = nav.assign_by_ordinal(1, &mut col, &mut reg).unwrap();
        assert!(assigned);
        let state = col.get(ids[0]).unwrap().interpolate(FrameIndex(0));
        assert_eq!(state.attributes[&AttributeId(11)], AttributeValue::Bool(true));
        assert_eq!(
            reg.attribute(LabelId(1), AttributeId(11)).unwrap().values.len(),
            2
        );
    }

    #[test]
    fn removing_the_focused_track_shifts_focus_down() {
        let (mut col, ids, reg) = setup(3);
        let mut nav = AttributeNavigator::new(0.0);
        nav.enable(&mut col, &reg);
        nav.next_track(1, &mut col, &reg);
        assert_eq!(nav.active_track(), Some(ids[1]));

        col.remove(ids[1]);
        nav.refresh(&mut col, &reg);
        assert_eq!(nav.active_track(), Some(ids[0]));

        col.remove(ids[0]);
        nav.refresh(&mut col, &reg);
        assert_eq!(nav.active_track(), Some(ids[2]));

        col.remove(ids[2]);
        nav.refresh(&mut col, &reg);
        assert_eq!(nav.active_track(), None);
    }

    #[test]
    fn refresh_preserves_focus_when_another_track_is_removed() {
        let (mut col, ids, reg) = setup(3);
        let mut nav = AttributeNavigator::new(0.0);
        nav.enable(&mut col, &reg);
        nav.next_track(1, &mut col, &reg);
        nav.next_track(1, &mut col, &reg);
        assert_eq!(nav.active_track(), Some(ids[2]));

        col.remove(ids[0]);
        nav.refresh(&mut col, &reg);
        assert_eq!(nav.active_track(), Some(ids[2]));
    }

    #[test]
    fn focus_box_inflates_by_margin() {
        let (mut col, _, reg) = setup(1);
        let mut nav = AttributeNavigator::new(5.0);
        nav.enable(&mut col, &reg);
        let fb = nav.focus_box(&col).unwrap();
        assert_eq!(fb.xtl, -5.0);
        assert_eq!(fb.ytl, -5.0);
        assert_eq!(fb.xbr, 15.0);
        assert_eq!(fb.ybr, 15.0);
    }

    #[test]
    fn labels_without_attributes_have_null_cursor_but_navigate() {
        let bounds = JobBounds::new(FrameIndex(0), FrameIndex(20)).unwrap();
        let reg = registry();
        let mut col = TrackCollection::new(bounds);
        let a = col.allocate_id();
        col.add(
            Track::from_drawn_shape(
                a,
                LabelId(1),
                FrameIndex(0),
                Keyframe::visible(0.0, 0.0, 10.0, 10.0),
                &reg,
                bounds,
            )
            .unwrap(),
        )
        .unwrap();
        let b = col.allocate_id();
        col.add(
            Track::from_drawn_shape(
                b,
                LabelId(2),
                FrameIndex(0),
                Keyframe::visible(20.0, 0.0, 30.0, 10.0),
                &reg,
                bounds,
            )
            .unwrap(),
        )
        .unwrap();

        let mut nav = AttributeNavigator::new(0.0);
        nav.enable(&mut col, &reg);
        nav.next_track(1, &mut col, &reg);
        assert_eq!(nav.active_track(), Some(b));
        assert_eq!(nav.attribute_cursor(LabelId(2)), None);
        // attribute navigation on an attribute-less label is a no-op
        nav.next_attribute(1, &mut col, &reg);
        assert_eq!(nav.attribute_cursor(LabelId(2)), None);

        let mut reg_mut = registry();
        assert!(!nav.assign_by_ordinal(0, &mut col, &mut reg_mut).unwrap());
    }
}
