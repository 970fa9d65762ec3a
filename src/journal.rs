use std::collections::BTreeMap;

use crate::foundation::{
    core::FrameIndex,
    error::{AnnotrackError, AnnotrackResult},
};

/// Stored geometry and visibility at one explicitly annotated frame.
///
/// Coordinates are in track-local space. `xtl <= xbr` / `ytl <= ybr` is not
/// enforced here and degenerate (zero-area) boxes are permitted as data;
/// rendering thresholds are an external concern.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keyframe {
    pub xtl: f64,
    pub ytl: f64,
    pub xbr: f64,
    pub ybr: f64,
    /// The object is tracked but not present on this frame.
    pub outsided: bool,
    /// The object is present but partially hidden. Not interpolated; carried
    /// forward from the nearest preceding keyframe.
    pub occluded: bool,
}

impl Keyframe {
    /// A visible, unoccluded box.
    pub fn visible(xtl: f64, ytl: f64, xbr: f64, ybr: f64) -> Self {
        Self {
            xtl,
            ytl,
            xbr,
            ybr,
            outsided: false,
            occluded: false,
        }
    }
}

/// Result of sampling a journal at a frame: the reconstructed box plus
/// whether that frame is an explicitly stored keyframe.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InterpolatedBox {
    pub position: Keyframe,
    pub key_frame: bool,
}

/// Ordered sparse map from frame number to stored keyframe.
///
/// At least one keyframe exists at all times; removing the last remaining
/// keyframe is rejected. Keys are kept in ascending numeric order, which is
/// what interpolation scans rely on.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionJournal {
    keys: BTreeMap<FrameIndex, Keyframe>,
}

impl PositionJournal {
    /// Journal seeded with a single keyframe.
    pub fn new(frame: FrameIndex, keyframe: Keyframe) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(frame, keyframe);
        Self { keys }
    }

    /// Journal built from imported keyframes. Empty input is rejected.
    pub fn from_keys(
        keys: impl IntoIterator<Item = (FrameIndex, Keyframe)>,
    ) -> AnnotrackResult<Self> {
        let keys: BTreeMap<_, _> = keys.into_iter().collect();
        if keys.is_empty() {
            return Err(AnnotrackError::validation(
                "PositionJournal must hold at least one keyframe",
            ));
        }
        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, frame: FrameIndex) -> bool {
        self.keys.contains_key(&frame)
    }

    pub fn get(&self, frame: FrameIndex) -> Option<&Keyframe> {
        self.keys.get(&frame)
    }

    /// Ascending iteration over stored keyframes.
    pub fn iter(&self) -> impl Iterator<Item = (FrameIndex, &Keyframe)> {
        self.keys.iter().map(|(f, kf)| (*f, kf))
    }

    /// Smallest stored key.
    pub fn earliest(&self) -> FrameIndex {
        self.keys
            .keys()
            .next()
            .copied()
            .unwrap_or(FrameIndex(0)) // unreachable: journal is never empty
    }

    /// Upsert a keyframe at `frame`.
    pub fn record(&mut self, frame: FrameIndex, keyframe: Keyframe) {
        self.keys.insert(frame, keyframe);
    }

    /// Reconstruct the box at `frame`.
    ///
    /// `first_visible` is the track's derived first visible frame; a frame at
    /// or matching a stored key reads back exactly with `key_frame = true`.
    /// Frames before the earliest key are forced `outsided` (the object is
    /// not yet visible). A frame after the last key, or past an `outsided`
    /// key, holds that key's state unchanged. Everything else is a linear
    /// blend of the two neighbors, with `occluded` pinned to the left key.
    pub fn interpolate(&self, frame: FrameIndex, first_visible: Option<FrameIndex>) -> InterpolatedBox {
        if first_visible == Some(frame) || self.keys.contains_key(&frame) {
            if let Some(kf) = self.keys.get(&frame) {
                return InterpolatedBox {
                    position: *kf,
                    key_frame: true,
                };
            }
        }

        let left = self.keys.range(..frame).next_back();
        let right = self.keys.range(frame..).next();

        match (left, right) {
            (None, Some((_, r))) => {
                let mut position = *r;
                position.outsided = true;
                InterpolatedBox {
                    position,
                    key_frame: false,
                }
            }
            (Some((_, l)), None) => InterpolatedBox {
                position: *l,
                key_frame: false,
            },
            (Some((lk, l)), Some((rk, r))) => {
                if l.outsided {
                    return InterpolatedBox {
                        position: *l,
                        key_frame: false,
                    };
                }
                let t = (frame.0 - lk.0) as f64 / (rk.0 - lk.0) as f64;
                InterpolatedBox {
                    position: Keyframe {
                        xtl: l.xtl + (r.xtl - l.xtl) * t,
                        ytl: l.ytl + (r.ytl - l.ytl) * t,
                        xbr: l.xbr + (r.xbr - l.xbr) * t,
                        ybr: l.ybr + (r.ybr - l.ybr) * t,
                        outsided: false,
                        occluded: l.occluded,
                    },
                    key_frame: false,
                }
            }
            (None, None) => unreachable!("PositionJournal is never empty"),
        }
    }

    /// Toggle keyframe storage at `frame`. Returns whether anything changed.
    ///
    /// Enabling an absent frame stores the current interpolated value there.
    /// Disabling a present frame removes it unless it is the last remaining
    /// keyframe, which is a guarded no-op. Other combinations are no-ops.
    pub fn set_key_frame(
        &mut self,
        enable: bool,
        frame: FrameIndex,
        first_visible: Option<FrameIndex>,
    ) -> bool {
        match (enable, self.keys.contains_key(&frame)) {
            (true, false) => {
                let value = self.interpolate(frame, first_visible).position;
                self.keys.insert(frame, value);
                true
            }
            (false, true) => {
                if self.keys.len() == 1 {
                    return false;
                }
                self.keys.remove(&frame);
                true
            }
            _ => false,
        }
    }

    /// Smallest key whose keyframe is not `outsided`: the frame the track
    /// becomes visible, and the anchor for mutable attribute timelines.
    pub fn first_visible_frame(&self) -> Option<FrameIndex> {
        self.keys
            .iter()
            .find(|(_, kf)| !kf.outsided)
            .map(|(f, _)| *f)
    }

    /// Total number of frames on which the object is genuinely visible.
    ///
    /// Sums spans between a visible-entering key and the next `outsided` key;
    /// a visible span still open at the end of the journal extends through
    /// `stop` inclusive. This count, not journal length, drives the
    /// Annotation-vs-Interpolation classification.
    pub fn visible_frame_count(&self, stop: FrameIndex) -> u64 {
        let mut count = 0u64;
        let mut visible_since: Option<FrameIndex> = None;
        for (frame, kf) in &self.keys {
            match (visible_since, kf.outsided) {
                (None, false) => visible_since = Some(*frame),
                (Some(since), true) => {
                    count += frame.0 - since.0;
                    visible_since = None;
                }
                _ => {}
            }
        }
        if let Some(since) = visible_since {
            count += stop.0.saturating_sub(since.0) + 1;
        }
        count
    }

    /// Nearest stored keys strictly before and after `cur`.
    pub fn prev_next(&self, cur: FrameIndex) -> (Option<FrameIndex>, Option<FrameIndex>) {
        let prev = self.keys.range(..cur).next_back().map(|(f, _)| *f);
        let next = self
            .keys
            .range(FrameIndex(cur.0 + 1)..)
            .next()
            .map(|(f, _)| *f);
        (prev, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn journal(keys: &[(u64, Keyframe)]) -> PositionJournal {
        PositionJournal::from_keys(keys.iter().map(|(f, kf)| (FrameIndex(*f), *kf))).unwrap()
    }

    fn boxed(v: f64) -> Keyframe {
        Keyframe::visible(v, v, v + 10.0, v + 10.0)
    }

    #[test]
    fn stored_keys_read_back_exactly() {
        let j = journal(&[(0, boxed(0.0)), (10, boxed(100.0))]);
        let at0 = j.interpolate(FrameIndex(0), Some(FrameIndex(0)));
        assert!(at0.key_frame);
        assert_eq!(at0.position, boxed(0.0));
        let at10 = j.interpolate(FrameIndex(10), Some(FrameIndex(0)));
        assert!(at10.key_frame);
        assert_eq!(at10.position, boxed(100.0));
    }

    #[test]
    fn midpoint_is_linear_blend() {
        let j = journal(&[(0, boxed(0.0)), (10, boxed(100.0))]);
        let mid = j.interpolate(FrameIndex(5), Some(FrameIndex(0)));
        assert!(!mid.key_frame);
        assert!((mid.position.xtl - 50.0).abs() < 1e-9);
        assert!((mid.position.xbr - 60.0).abs() < 1e-9);
        assert!(!mid.position.outsided);
    }

    #[test]
    fn frames_before_first_key_are_outsided() {
        let j = journal(&[(5, boxed(50.0))]);
        let early = j.interpolate(FrameIndex(2), Some(FrameIndex(5)));
        assert!(early.position.outsided);
        assert!(!early.key_frame);
        assert_eq!(early.position.xtl, 50.0);
    }

    #[test]
    fn frames_after_last_key_hold_state() {
        let j = journal(&[(0, boxed(0.0))]);
        let late = j.interpolate(FrameIndex(100), Some(FrameIndex(0)));
        assert_eq!(late.position, boxed(0.0));
        assert!(!late.key_frame);
    }

    #[test]
    fn outsided_left_key_holds_until_next_key() {
        let mut out = boxed(0.0);
        out.outsided = true;
        let j = journal(&[(0, out), (10, boxed(100.0))]);
        let held = j.interpolate(FrameIndex(5), None);
        assert!(held.position.outsided);
        assert_eq!(held.position.xtl, 0.0);
    }

    #[test]
    fn occlusion_is_pinned_to_left_key() {
        let mut occ = boxed(0.0);
        occ.occluded = true;
        let j = journal(&[(0, occ), (10, boxed(100.0))]);
        assert!(j.interpolate(FrameIndex(9), Some(FrameIndex(0))).position.occluded);
        assert!(!j.interpolate(FrameIndex(10), Some(FrameIndex(0))).position.occluded);
    }

    #[test]
    fn set_key_frame_inserts_interpolated_value() {
        let mut j = journal(&[(0, boxed(0.0)), (10, boxed(100.0))]);
        assert!(j.set_key_frame(true, FrameIndex(5), Some(FrameIndex(0))));
        let stored = j.get(FrameIndex(5)).unwrap();
        assert!((stored.xtl - 50.0).abs() < 1e-9);
        // enabling an already-present frame is a no-op
        assert!(!j.set_key_frame(true, FrameIndex(5), Some(FrameIndex(0))));
    }

    #[test]
    fn last_keyframe_cannot_be_removed() {
        let mut j = journal(&[(3, boxed(1.0))]);
        assert!(!j.set_key_frame(false, FrameIndex(3), Some(FrameIndex(3))));
        assert_eq!(j.len(), 1);
        assert!(j.contains(FrameIndex(3)));
    }

    #[test]
    fn first_visible_frame_skips_outsided_keys() {
        let mut out = boxed(0.0);
        out.outsided = true;
        let j = journal(&[(0, out), (4, boxed(1.0))]);
        assert_eq!(j.first_visible_frame(), Some(FrameIndex(4)));

        let all_out = journal(&[(0, out)]);
        assert_eq!(all_out.first_visible_frame(), None);
    }

    #[test]
    fn visible_frame_count_sums_spans() {
        let mut out = boxed(0.0);
        out.outsided = true;
        // visible [0,10), then outside to the end
        let j = journal(&[(0, boxed(0.0)), (10, out)]);
        assert_eq!(j.visible_frame_count(FrameIndex(20)), 10);

        // open span extends through stop inclusive
        let open = journal(&[(5, boxed(0.0))]);
        assert_eq!(open.visible_frame_count(FrameIndex(20)), 16);

        // key at the stop frame counts a single visible frame
        let tail = journal(&[(20, boxed(0.0))]);
        assert_eq!(tail.visible_frame_count(FrameIndex(20)), 1);
    }

    #[test]
    fn prev_next_are_strict_neighbors() {
        let j = journal(&[(0, boxed(0.0)), (5, boxed(1.0)), (10, boxed(2.0))]);
        assert_eq!(j.prev_next(FrameIndex(5)), (Some(FrameIndex(0)), Some(FrameIndex(10))));
        assert_eq!(j.prev_next(FrameIndex(7)), (Some(FrameIndex(5)), Some(FrameIndex(10))));
        assert_eq!(j.prev_next(FrameIndex(0)), (None, Some(FrameIndex(5))));
        assert_eq!(j.prev_next(FrameIndex(10)), (Some(FrameIndex(5)), None));
    }

    #[test]
    fn from_keys_rejects_empty_input() {
        assert!(PositionJournal::from_keys(std::iter::empty()).is_err());
    }
}
