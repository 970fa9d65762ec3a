use crate::foundation::error::{AnnotrackError, AnnotrackResult};

/// Absolute 0-based frame number in job timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Stable identifier of a track within a job.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TrackId(pub u64);

/// Identifier of a label in the annotation schema.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct LabelId(pub u64);

/// Identifier of an attribute in the annotation schema.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct AttributeId(pub u64);

/// Inclusive frame range `[start, stop]` of the owning job.
///
/// Every `cur_frame` assignment in the engine is validated against these
/// bounds; an out-of-range assignment is a fatal error, not recovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JobBounds {
    /// First frame of the job, inclusive.
    pub start: FrameIndex,
    /// Last frame of the job, inclusive.
    pub stop: FrameIndex,
}

impl JobBounds {
    /// Create validated bounds with `start <= stop`.
    pub fn new(start: FrameIndex, stop: FrameIndex) -> AnnotrackResult<Self> {
        if start.0 > stop.0 {
            return Err(AnnotrackError::validation("JobBounds start must be <= stop"));
        }
        Ok(Self { start, stop })
    }

    /// Return `true` when `f` is inside `[start, stop]`.
    pub fn contains(self, f: FrameIndex) -> bool {
        self.start.0 <= f.0 && f.0 <= self.stop.0
    }

    /// Clamp a frame index into this range.
    pub fn clamp(self, f: FrameIndex) -> FrameIndex {
        FrameIndex(f.0.clamp(self.start.0, self.stop.0))
    }

    /// Number of frames contained in the range.
    pub fn len_frames(self) -> u64 {
        self.stop.0 - self.start.0 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_reject_inverted_range() {
        assert!(JobBounds::new(FrameIndex(5), FrameIndex(4)).is_err());
        assert!(JobBounds::new(FrameIndex(5), FrameIndex(5)).is_ok());
    }

    #[test]
    fn bounds_contains_is_inclusive() {
        let b = JobBounds::new(FrameIndex(2), FrameIndex(8)).unwrap();
        assert!(b.contains(FrameIndex(2)));
        assert!(b.contains(FrameIndex(8)));
        assert!(!b.contains(FrameIndex(1)));
        assert!(!b.contains(FrameIndex(9)));
        assert_eq!(b.len_frames(), 7);
    }

    #[test]
    fn bounds_clamp() {
        let b = JobBounds::new(FrameIndex(2), FrameIndex(8)).unwrap();
        assert_eq!(b.clamp(FrameIndex(0)), FrameIndex(2));
        assert_eq!(b.clamp(FrameIndex(5)), FrameIndex(5));
        assert_eq!(b.clamp(FrameIndex(100)), FrameIndex(8));
    }
}
