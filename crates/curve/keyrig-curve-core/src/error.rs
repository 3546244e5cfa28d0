//! Error types for curve editing and evaluation.

use crate::property::AnimatableProperty;

/// Errors raised by curve and animation-set operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CurveError {
    /// Frame range whose start lies after its end
    #[error("Invalid frame range: start {start} is after end {end}")]
    InvalidRange { start: i32, end: i32 },

    /// Frame outside the active range
    #[error("Frame {frame} is out of range [{start}, {end}]")]
    FrameOutOfRange { frame: i32, start: i32, end: i32 },

    /// Operation needs at least one key
    #[error("Curve {property:?} has no keys")]
    EmptyCurve { property: AnimatableProperty },

    /// No key stored at the requested frame
    #[error("No key at frame {frame} on curve {property:?}")]
    KeyNotFound {
        property: AnimatableProperty,
        frame: i32,
    },

    /// Key index past the end of the key list
    #[error("Key index {index} is out of bounds on curve {property:?} ({len} keys)")]
    KeyIndexOutOfBounds {
        property: AnimatableProperty,
        index: usize,
        len: usize,
    },

    /// Animation set does not own a curve for the property
    #[error("Animation set has no {property:?} curve")]
    MissingCurve { property: AnimatableProperty },

    /// Serialization error
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },
}

impl CurveError {
    /// Get error category for logging
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidRange { .. } | Self::FrameOutOfRange { .. } => "range",
            Self::EmptyCurve { .. }
            | Self::KeyNotFound { .. }
            | Self::KeyIndexOutOfBounds { .. }
            | Self::MissingCurve { .. } => "data",
            Self::Serialization { .. } => "serialization",
        }
    }
}

impl From<serde_json::Error> for CurveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

/// Result alias for curve operations.
pub type Result<T> = core::result::Result<T, CurveError>;
