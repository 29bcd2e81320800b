//! Segment arithmetic.
//!
//! Frames are numbered from 1 to the total frame count. Segment `k` covers
//! frames `k * F + 1 ..= (k + 1) * F` for a segment size `F`; the last
//! segment is shortened when the total is not a multiple of `F`.

use std::ops::Range;

use serde::Serialize;

use crate::error::StitchError;
use crate::naming::ArtifactClass;

/// The frames covered by one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentRange {
    /// Segment index, starting at 0.
    pub index: u64,
    /// First frame of the segment (inclusive, 1-based).
    pub first_frame: u64,
    /// Last frame of the segment (inclusive).
    pub last_frame: u64,
    /// Whether this is the final segment of the run.
    pub is_last: bool,
}

impl SegmentRange {
    /// Number of frames in the segment.
    pub fn frame_count(&self) -> u64 {
        self.last_frame - self.first_frame + 1
    }

    /// One past the last frame.
    pub fn end_exclusive(&self) -> u64 {
        self.last_frame + 1
    }

    /// The frames of `class` that cleanup may delete once this segment is on
    /// disk.
    ///
    /// The upscaler's numbering ends one frame earlier than the other classes
    /// for the run as a whole, so when `trim_final_upscaled` is set the final
    /// segment's upscaled range stops one index short. Every other segment and
    /// class uses the full range.
    pub fn purge_range(&self, class: ArtifactClass, trim_final_upscaled: bool) -> Range<u64> {
        let end = if self.is_last && trim_final_upscaled && class == ArtifactClass::Upscaled {
            self.last_frame
        } else {
            self.end_exclusive()
        };
        self.first_frame..end
    }
}

/// Splits `total_frames` into consecutive segments of `frames_per_segment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    total_frames: u64,
    frames_per_segment: u64,
}

impl SegmentPlan {
    /// Create a plan.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::Configuration`] if either value is zero.
    pub fn new(total_frames: u64, frames_per_segment: u64) -> Result<Self, StitchError> {
        if total_frames == 0 {
            return Err(StitchError::Configuration(
                "total frame count must be greater than zero".to_string(),
            ));
        }
        if frames_per_segment == 0 {
            return Err(StitchError::Configuration(
                "frames per segment must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            total_frames,
            frames_per_segment,
        })
    }

    /// Total frames in the run.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Frames in every segment except possibly the last.
    pub fn frames_per_segment(&self) -> u64 {
        self.frames_per_segment
    }

    /// Number of segments, `ceil(total / per_segment)`.
    pub fn segment_count(&self) -> u64 {
        self.total_frames.div_ceil(self.frames_per_segment)
    }

    /// The range of segment `index`, or `None` past the end of the plan.
    pub fn segment(&self, index: u64) -> Option<SegmentRange> {
        let count = self.segment_count();
        if index >= count {
            return None;
        }
        let first_frame = index * self.frames_per_segment + 1;
        let last_frame = ((index + 1) * self.frames_per_segment).min(self.total_frames);
        Some(SegmentRange {
            index,
            first_frame,
            last_frame,
            is_last: index + 1 == count,
        })
    }

    /// Iterate over all segments in increasing index order.
    pub fn segments(&self) -> impl Iterator<Item = SegmentRange> + '_ {
        (0..self.segment_count()).filter_map(|index| self.segment(index))
    }
}
