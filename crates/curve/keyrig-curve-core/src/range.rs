//! Inclusive frame range shared by every curve of a scene.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{CurveError, Result};

/// Inclusive `[start, end]` range of animated frames.
///
/// Curves size their caches from the range, so it is handed to each curve
/// explicitly instead of living in shared global state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: i32,
    pub end: i32,
}

impl Default for FrameRange {
    fn default() -> Self {
        Self { start: 1, end: 250 }
    }
}

impl FrameRange {
    pub fn new(start: i32, end: i32) -> Result<Self> {
        if start > end {
            return Err(CurveError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Number of frames covered, `end - start + 1` (zero for an inverted range).
    #[inline]
    pub fn frame_count(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start) as usize + 1
        }
    }

    #[inline]
    pub fn contains(&self, frame: i32) -> bool {
        frame >= self.start && frame <= self.end
    }

    /// Cache slot of `frame`, if it lies inside the range.
    #[inline]
    pub fn slot(&self, frame: i32) -> Option<usize> {
        self.contains(frame).then(|| (frame - self.start) as usize)
    }

    #[inline]
    pub fn clamp(&self, frame: i32) -> i32 {
        frame.clamp(self.start, self.end.max(self.start))
    }

    #[inline]
    pub fn frames(&self) -> RangeInclusive<i32> {
        self.start..=self.end
    }

    pub fn check(&self, frame: i32) -> Result<()> {
        if self.contains(frame) {
            Ok(())
        } else {
            Err(CurveError::FrameOutOfRange {
                frame,
                start: self.start,
                end: self.end,
            })
        }
    }
}
