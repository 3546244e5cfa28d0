//! Euler angle helpers (degrees).
//!
//! Rotations compose as `q = Ry(y) * Rx(x) * Rz(z)`: z is applied first,
//! then x, then y. Extraction inverts that order and pins z to zero in
//! gimbal lock.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

/// `|m12|` above which x is treated as +/-90 degrees.
const GIMBAL_THRESHOLD: f32 = 0.99999;

/// Quaternion for Euler angles given in degrees.
pub fn euler_to_quaternion(degrees: &Vector3<f32>) -> UnitQuaternion<f32> {
    let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), degrees.x.to_radians());
    let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), degrees.y.to_radians());
    let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), degrees.z.to_radians());
    ry * rx * rz
}

/// Euler angles in degrees, each in `(-180, 180]`.
pub fn quaternion_to_euler(rotation: &UnitQuaternion<f32>) -> Vector3<f32> {
    let m: Matrix3<f32> = rotation.to_rotation_matrix().into_inner();
    let sin_x = (-m[(1, 2)]).clamp(-1.0, 1.0);
    let x = sin_x.asin();
    let (y, z) = if sin_x.abs() < GIMBAL_THRESHOLD {
        (m[(0, 2)].atan2(m[(2, 2)]), m[(1, 0)].atan2(m[(1, 1)]))
    } else {
        ((-m[(2, 0)]).atan2(m[(0, 0)]), 0.0)
    };
    Vector3::new(
        wrap_degrees(x.to_degrees()),
        wrap_degrees(y.to_degrees()),
        wrap_degrees(z.to_degrees()),
    )
}

/// Map an angle to `(-180, 180]`.
#[inline]
pub fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Shortest signed difference from `current` to `target`, in degrees.
#[inline]
pub fn delta_angle(current: f32, target: f32) -> f32 {
    wrap_degrees(target - current)
}

/// Interpolate along the shortest arc; `t` is clamped to `[0, 1]`.
#[inline]
pub fn lerp_angle(a: f32, b: f32, t: f32) -> f32 {
    a + delta_angle(a, b) * t.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn round_trip_away_from_gimbal() {
        let angles = Vector3::new(20.0, -35.0, 110.0);
        let back = quaternion_to_euler(&euler_to_quaternion(&angles));
        assert_relative_eq!(back, angles, epsilon = 1e-3);
    }

    #[test]
    fn composition_order_is_y_x_z() {
        // z first: x axis goes to y, then y rotation leaves y untouched
        let q = euler_to_quaternion(&Vector3::new(0.0, 90.0, 90.0));
        let v = q * Vector3::x();
        assert_relative_eq!(v, Vector3::y(), epsilon = 1e-5);
    }

    #[test]
    fn gimbal_lock_pins_z() {
        let q = euler_to_quaternion(&Vector3::new(90.0, 30.0, 0.0));
        let e = quaternion_to_euler(&q);
        assert_relative_eq!(e.x, 90.0, epsilon = 1e-2);
        assert_eq!(e.z, 0.0);
        let again = euler_to_quaternion(&e);
        assert!(again.angle_to(&q) < 1e-3);
    }

    #[test]
    fn delta_angle_wraps() {
        assert_relative_eq!(delta_angle(170.0, -170.0), 20.0);
        assert_relative_eq!(delta_angle(-170.0, 170.0), -20.0);
        assert_relative_eq!(delta_angle(0.0, 540.0), 180.0);
        assert_relative_eq!(lerp_angle(350.0, 10.0, 0.5), 360.0);
    }
}
