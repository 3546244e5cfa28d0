//! Keyframes and their tangent handles.

use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// 2D offset in `(frame, value)` space, used for tangent handles.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit vector in the same direction, or zero for a (near) zero vector.
    #[inline]
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > 1e-5 {
            self / len
        } else {
            Self::ZERO
        }
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    #[inline]
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    #[inline]
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    #[inline]
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f32> for Vec2 {
    type Output = Vec2;
    #[inline]
    fn div(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    #[inline]
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// How the segment that starts at a key is interpolated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interpolation {
    Constant,
    Linear,
    #[default]
    Bezier,
}

/// A single key on a scalar curve.
///
/// `out_tangent` is the offset from the key to the first control point of the
/// following segment. `in_tangent` is the offset from the preceding segment's
/// second control point to the key, so that control point sits at
/// `key - in_tangent`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub frame: i32,
    pub value: f32,
    #[serde(default)]
    pub interpolation: Interpolation,
    #[serde(default, rename = "inTangent")]
    pub in_tangent: Vec2,
    #[serde(default, rename = "outTangent")]
    pub out_tangent: Vec2,
}

impl Keyframe {
    /// Bezier key with zero tangents (auto tangents are computed on insert).
    pub fn new(frame: i32, value: f32) -> Self {
        Self {
            frame,
            value,
            interpolation: Interpolation::Bezier,
            in_tangent: Vec2::ZERO,
            out_tangent: Vec2::ZERO,
        }
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_tangents(mut self, in_tangent: Vec2, out_tangent: Vec2) -> Self {
        self.in_tangent = in_tangent;
        self.out_tangent = out_tangent;
        self
    }

    /// The key as a point in `(frame, value)` space.
    #[inline]
    pub fn point(&self) -> Vec2 {
        Vec2::new(self.frame as f32, self.value)
    }
}
