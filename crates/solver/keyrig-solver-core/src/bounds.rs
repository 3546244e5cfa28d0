//! Box bounds and continuity weights for tangent-handle steps.
//!
//! Each solved curve contributes eight parameters, the handles of the two
//! keys framing the edited segment:
//!
//! | index | handle            |
//! |-------|-------------------|
//! | 0, 1  | `prev.in  (x, y)` |
//! | 2, 3  | `prev.out (x, y)` |
//! | 4, 5  | `next.in  (x, y)` |
//! | 6, 7  | `next.out (x, y)` |
//!
//! Bounds are on the step, so zero is always inside them. X handles stay
//! within their own segment so each segment remains monotone in frame.

use keyrig_curve_core::{BezierSegment, Interpolation, Keyframe, Vec2};
use nalgebra::DMatrix;

pub const TANGENT_PARAMS: usize = 8;

/// Smallest continuity weight a segment relaxes to near its limits.
const MIN_CONTINUITY: f64 = 0.001;

/// Allowed value range of a limited channel (degrees for rotations).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AngleLimits {
    pub min: f64,
    pub max: f64,
}

/// The edited segment `prev -> next` with its outer neighbours.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowKeys {
    pub before: Option<Keyframe>,
    pub prev: Keyframe,
    pub next: Keyframe,
    pub after: Option<Keyframe>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurveBounds {
    pub lower: [f64; TANGENT_PARAMS],
    pub upper: [f64; TANGENT_PARAMS],
    /// Weights of the continuity blocks on `prev` and `next`.
    pub continuity: [f64; 2],
}

/// Current handle values in parameter order.
pub fn tangent_theta(prev: &Keyframe, next: &Keyframe) -> [f64; TANGENT_PARAMS] {
    [
        prev.in_tangent.x,
        prev.in_tangent.y,
        prev.out_tangent.x,
        prev.out_tangent.y,
        next.in_tangent.x,
        next.in_tangent.y,
        next.out_tangent.x,
        next.out_tangent.y,
    ]
    .map(f64::from)
}

/// Copies of `prev` and `next` carrying the handles in `theta`.
pub fn keys_with_theta(prev: &Keyframe, next: &Keyframe, theta: &[f64]) -> (Keyframe, Keyframe) {
    let at = |i: usize| theta.get(i).copied().unwrap_or_default() as f32;
    let prev = Keyframe {
        in_tangent: Vec2::new(at(0), at(1)),
        out_tangent: Vec2::new(at(2), at(3)),
        ..*prev
    };
    let next = Keyframe {
        in_tangent: Vec2::new(at(4), at(5)),
        out_tangent: Vec2::new(at(6), at(7)),
        ..*next
    };
    (prev, next)
}

/// Value range covered by the segment `from -> to`; a missing neighbour
/// collapses it to `anchor`'s value.
fn envelope(from: Option<&Keyframe>, to: Option<&Keyframe>, anchor: &Keyframe) -> (f64, f64) {
    match (from, to) {
        (Some(a), Some(b)) if a.interpolation == Interpolation::Bezier => {
            let (lo, hi) = BezierSegment::between(a, b).value_range();
            (f64::from(lo), f64::from(hi))
        }
        (Some(a), Some(b)) => {
            let (lo, hi) = (a.value.min(b.value), a.value.max(b.value));
            (f64::from(lo), f64::from(hi))
        }
        _ => (f64::from(anchor.value), f64::from(anchor.value)),
    }
}

fn relaxed(headroom: f64, limit: f64) -> f64 {
    if limit == 0.0 {
        0.0
    } else {
        (headroom / limit).clamp(MIN_CONTINUITY, 1.0)
    }
}

/// Bounds for one curve's handle step.
///
/// Without `limits` the y handles move within `+/- tangent_box`. Handles of
/// a missing outer neighbour are pinned.
pub fn tangent_bounds(keys: &WindowKeys, limits: Option<AngleLimits>, tangent_box: f64) -> CurveBounds {
    let WindowKeys {
        before,
        prev,
        next,
        after,
    } = keys;
    let theta = tangent_theta(prev, next);
    let mut lower = [0.0; TANGENT_PARAMS];
    let mut upper = [0.0; TANGENT_PARAMS];

    let span = f64::from(next.frame - prev.frame);
    lower[2] = -theta[2];
    upper[2] = span - theta[2];
    lower[4] = -theta[4];
    upper[4] = span - theta[4];
    if let Some(before) = before {
        lower[0] = -theta[0];
        upper[0] = f64::from(prev.frame - before.frame) - theta[0];
    }
    if let Some(after) = after {
        lower[6] = -theta[6];
        upper[6] = f64::from(after.frame - next.frame) - theta[6];
    }

    let mut continuity = [1.0, 1.0];
    match limits {
        None => {
            for i in [1, 3, 5, 7] {
                lower[i] = -tangent_box;
                upper[i] = tangent_box;
            }
        }
        Some(AngleLimits { min, max }) => {
            let (pmin, pmax) = envelope(before.as_ref(), Some(prev), prev);
            let (nmin, nmax) = envelope(Some(next), after.as_ref(), next);
            let prev_mid = f64::from(prev.value) + 0.75 * theta[3];
            let next_mid = f64::from(next.value) - 0.75 * theta[5];

            lower[1] = -(max - pmax).max(0.0);
            upper[1] = -(min - pmin).min(0.0);
            lower[3] = (4.0 / 3.0 * (min - prev_mid)).min(0.0);
            upper[3] = (4.0 / 3.0 * (max - prev_mid)).max(0.0);
            lower[5] = (-4.0 / 3.0 * (max - next_mid)).min(0.0);
            upper[5] = (-4.0 / 3.0 * (min - next_mid)).max(0.0);
            lower[7] = (min - nmin).min(0.0);
            upper[7] = (max - nmax).max(0.0);

            continuity[0] = if theta[3] <= 0.0 {
                relaxed(-lower[1], max)
            } else {
                relaxed(-upper[1], min)
            };
            continuity[1] = if theta[5] >= 0.0 {
                relaxed(upper[7], max)
            } else {
                relaxed(lower[7], min)
            };
        }
    }

    if before.is_none() {
        lower[1] = 0.0;
        upper[1] = 0.0;
    }
    if after.is_none() {
        lower[7] = 0.0;
        upper[7] = 0.0;
    }

    CurveBounds {
        lower,
        upper,
        continuity,
    }
}

/// Add the `c * [[1, -1], [-1, 1]]` blocks tying each key's in and out
/// handles, for the curve whose parameters start at `offset`.
pub fn add_continuity_blocks(t: &mut DMatrix<f64>, offset: usize, weights: [f64; 2]) {
    for (k, c) in weights.iter().enumerate() {
        let base = offset + 4 * k;
        for (a, b) in [(base, base + 2), (base + 1, base + 3)] {
            t[(a, a)] += c;
            t[(b, b)] += c;
            t[(a, b)] -= c;
            t[(b, a)] -= c;
        }
    }
}
