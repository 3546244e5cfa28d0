//! Keyrig curve core
//!
//! Keyframe curves for editor-side animation:
//! - sorted keys with constant, linear and cubic-Bezier segments
//! - a per-frame cache with incremental, windowed recomputation after edits
//! - zone and tangent-segment drag helpers
//! - per-entity `AnimationSet`s that rebuild TRS matrices from Euler curves

pub mod animation_set;
pub mod bezier;
pub mod curve;
pub mod error;
pub mod euler;
pub mod keyframe;
pub mod property;
pub mod range;
pub mod transform;

pub use animation_set::{
    chain_matrix, AnimationSet, AnimationSetData, CurveData, LocalTransform,
};
pub use bezier::{BezierSegment, FRAME_TOLERANCE, MAX_BISECTION_ITERATIONS};
pub use curve::{Curve, ZoneChanges};
pub use error::{CurveError, Result};
pub use euler::{delta_angle, euler_to_quaternion, lerp_angle, quaternion_to_euler};
pub use keyframe::{Interpolation, Keyframe, Vec2};
pub use property::{AnimatableProperty, EntityKind};
pub use range::FrameRange;
pub use transform::{decompose, transform_point, trs, Pose};
