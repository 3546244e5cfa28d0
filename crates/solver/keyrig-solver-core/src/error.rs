//! Error types for the solvers.

use keyrig_curve_core::{AnimatableProperty, CurveError};

use crate::manipulation::CurveEditMode;
use crate::phase::SolverPhase;

/// Failures of a box-constrained QP solve.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum QpError {
    #[error("Dimension mismatch: {what} has {actual} entries, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Infeasible bounds at index {index}: lower {lower} > upper {upper}")]
    InfeasibleBounds { index: usize, lower: f64, upper: f64 },

    #[error("Non-finite value in {what}")]
    NonFinite { what: &'static str },

    #[error("Reduced system is not positive definite")]
    NotPositiveDefinite,
}

/// Errors raised by solver sessions and drag manipulation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SolverError {
    #[error("Rig has no joints")]
    EmptyRig,

    #[error("Frame {frame} is not strictly inside window [{start}, {end}]")]
    FrameOutsideWindow { frame: i32, start: i32, end: i32 },

    #[error("Joint {joint} curve {property:?} has no key at frame {frame}")]
    MissingWindowKey {
        joint: usize,
        property: AnimatableProperty,
        frame: i32,
    },

    #[error("Joint {joint} curve {property:?} has keys inside window ({start}, {end})")]
    KeysInsideWindow {
        joint: usize,
        property: AnimatableProperty,
        start: i32,
        end: i32,
    },

    #[error("Joint {joint} has no {property:?} curve")]
    MissingCurve {
        joint: usize,
        property: AnimatableProperty,
    },

    #[error("Keys of joint {joint} curve {property:?} changed during the session")]
    StaleSession {
        joint: usize,
        property: AnimatableProperty,
    },

    #[error("Solver step out of order: expected {expected:?}, session is in {actual:?}")]
    InvalidPhase {
        expected: SolverPhase,
        actual: SolverPhase,
    },

    #[error("Jacobian job ended without a result")]
    JacobianJobLost,

    #[error("Transform of joint {joint} is not invertible")]
    SingularTransform { joint: usize },

    #[error("Edit mode {mode:?} is not supported here")]
    UnsupportedMode { mode: CurveEditMode },

    #[error("Invalid solver config: {reason}")]
    InvalidConfig { reason: String },

    #[error(transparent)]
    Qp(#[from] QpError),

    #[error(transparent)]
    Curve(#[from] CurveError),
}

impl SolverError {
    /// Get error category for logging
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::EmptyRig
            | Self::FrameOutsideWindow { .. }
            | Self::MissingWindowKey { .. }
            | Self::KeysInsideWindow { .. }
            | Self::MissingCurve { .. }
            | Self::UnsupportedMode { .. } => "setup",
            Self::StaleSession { .. } | Self::InvalidPhase { .. } => "session",
            Self::JacobianJobLost => "jacobian",
            Self::SingularTransform { .. } => "transform",
            Self::InvalidConfig { .. } => "config",
            Self::Qp(_) => "qp",
            Self::Curve(_) => "curve",
        }
    }
}

impl From<serde_json::Error> for SolverError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig {
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = core::result::Result<T, SolverError>;
