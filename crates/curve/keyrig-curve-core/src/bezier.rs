//! Cubic Bezier helpers for keyframe segments:
//! - `cubic_bezier` / `cubic_bezier_derivative` on one coordinate
//! - `BezierSegment` built from two adjacent keys
//! - frame -> parameter inversion by bisection
//! - value envelope of a segment through the derivative roots

use crate::keyframe::{Keyframe, Vec2};

/// Upper bound on bisection steps when inverting `x(t)`.
pub const MAX_BISECTION_ITERATIONS: usize = 64;

/// Bisection stops once `|x(t) - frame|` drops below this many frames.
pub const FRAME_TOLERANCE: f32 = 0.1;

#[inline]
pub fn cubic_bezier(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let u = 1.0 - t;
    u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
}

#[inline]
pub fn cubic_bezier_derivative(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let u = 1.0 - t;
    3.0 * u * u * (p1 - p0) + 6.0 * u * t * (p2 - p1) + 3.0 * t * t * (p3 - p2)
}

/// The four control points of the segment between two keys.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BezierSegment {
    pub a: Vec2,
    pub b: Vec2,
    pub c: Vec2,
    pub d: Vec2,
}

impl BezierSegment {
    /// `A = k0`, `B = k0 + k0.out`, `C = k1 - k1.in`, `D = k1`.
    pub fn between(k0: &Keyframe, k1: &Keyframe) -> Self {
        let a = k0.point();
        let d = k1.point();
        Self {
            a,
            b: a + k0.out_tangent,
            c: d - k1.in_tangent,
            d,
        }
    }

    #[inline]
    pub fn point(&self, t: f32) -> Vec2 {
        Vec2::new(
            cubic_bezier(self.a.x, self.b.x, self.c.x, self.d.x, t),
            cubic_bezier(self.a.y, self.b.y, self.c.y, self.d.y, t),
        )
    }

    /// Curve parameter whose x lands on `frame`.
    ///
    /// Terminates within `MAX_BISECTION_ITERATIONS` even when the handles
    /// make x non-monotone or the segment is degenerate.
    pub fn solve_t(&self, frame: f32) -> f32 {
        if frame <= self.a.x {
            return 0.0;
        }
        if frame >= self.d.x {
            return 1.0;
        }
        let mut lo = 0.0f32;
        let mut hi = 1.0f32;
        let mut t = 0.5f32;
        for _ in 0..MAX_BISECTION_ITERATIONS {
            let x = cubic_bezier(self.a.x, self.b.x, self.c.x, self.d.x, t);
            if (x - frame).abs() < FRAME_TOLERANCE {
                break;
            }
            if x < frame {
                lo = t;
            } else {
                hi = t;
            }
            t = 0.5 * (lo + hi);
        }
        t
    }

    /// Curve value at `frame`.
    #[inline]
    pub fn value_at(&self, frame: f32) -> f32 {
        let t = self.solve_t(frame);
        cubic_bezier(self.a.y, self.b.y, self.c.y, self.d.y, t)
    }

    /// Minimum and maximum value reached over `t` in `[0, 1]`.
    pub fn value_range(&self) -> (f32, f32) {
        let (p0, p1, p2, p3) = (self.a.y, self.b.y, self.c.y, self.d.y);
        let mut min = p0.min(p3);
        let mut max = p0.max(p3);
        for t in derivative_roots(p0, p1, p2, p3).into_iter().flatten() {
            let v = cubic_bezier(p0, p1, p2, p3, t);
            min = min.min(v);
            max = max.max(v);
        }
        (min, max)
    }
}

/// Roots in `(0, 1)` of the derivative of a 1D cubic Bezier.
fn derivative_roots(p0: f32, p1: f32, p2: f32, p3: f32) -> [Option<f32>; 2] {
    // d/dt / 3 = qa t^2 + qb t + qc
    let (a0, a1, a2) = (p1 - p0, p2 - p1, p3 - p2);
    let qa = a0 - 2.0 * a1 + a2;
    let qb = 2.0 * (a1 - a0);
    let qc = a0;
    let inside = |t: f32| (t > 0.0 && t < 1.0).then_some(t);

    if qa.abs() < 1e-7 {
        if qb.abs() < 1e-7 {
            return [None, None];
        }
        return [inside(-qc / qb), None];
    }
    let disc = qb * qb - 4.0 * qa * qc;
    if disc < 0.0 {
        return [None, None];
    }
    let sq = disc.sqrt();
    [
        inside((-qb + sq) / (2.0 * qa)),
        inside((-qb - sq) / (2.0 * qa)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(k0: Keyframe, k1: Keyframe) -> BezierSegment {
        BezierSegment::between(&k0, &k1)
    }

    #[test]
    fn endpoints_match_keys() {
        let s = segment(
            Keyframe::new(0, 1.0).with_tangents(Vec2::ZERO, Vec2::new(2.0, 3.0)),
            Keyframe::new(9, 4.0).with_tangents(Vec2::new(2.0, -1.0), Vec2::ZERO),
        );
        assert_eq!(s.point(0.0), Vec2::new(0.0, 1.0));
        assert_eq!(s.point(1.0), Vec2::new(9.0, 4.0));
        assert_eq!(s.c, Vec2::new(7.0, 5.0));
    }

    #[test]
    fn straight_handles_are_linear() {
        let s = segment(
            Keyframe::new(0, 0.0).with_tangents(Vec2::ZERO, Vec2::new(1.0, 1.0)),
            Keyframe::new(3, 3.0).with_tangents(Vec2::new(1.0, 1.0), Vec2::ZERO),
        );
        for frame in 0..=3 {
            assert!((s.value_at(frame as f32) - frame as f32).abs() < FRAME_TOLERANCE);
        }
    }

    #[test]
    fn degenerate_segment_terminates() {
        // x collapses to a point, bisection must still stop
        let s = segment(
            Keyframe::new(5, 0.0).with_tangents(Vec2::ZERO, Vec2::new(0.0, 10.0)),
            Keyframe::new(5, 2.0).with_tangents(Vec2::new(0.0, -10.0), Vec2::ZERO),
        );
        let v = s.value_at(5.0);
        assert!(v.is_finite());
        // backwards handles fold x over itself
        let s = segment(
            Keyframe::new(0, 0.0).with_tangents(Vec2::ZERO, Vec2::new(30.0, 5.0)),
            Keyframe::new(10, 1.0).with_tangents(Vec2::new(-30.0, 5.0), Vec2::ZERO),
        );
        assert!(s.value_at(4.0).is_finite());
    }

    #[test]
    fn value_range_includes_overshoot() {
        let s = segment(
            Keyframe::new(0, 0.0).with_tangents(Vec2::ZERO, Vec2::new(3.0, 10.0)),
            Keyframe::new(10, 0.0).with_tangents(Vec2::new(3.0, 10.0), Vec2::ZERO),
        );
        let (min, max) = s.value_range();
        assert!(min < 0.0);
        assert!(max > 0.0);
        let mut sampled_max = f32::MIN;
        for i in 0..=1000 {
            sampled_max = sampled_max.max(s.point(i as f32 / 1000.0).y);
        }
        assert!((sampled_max - max).abs() < 1e-3);
    }
}
