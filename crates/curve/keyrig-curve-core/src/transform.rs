//! TRS matrices and world-space poses.

use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3, Vector4};

/// Compose `T * R * S`.
pub fn trs(
    translation: &Vector3<f32>,
    rotation: &UnitQuaternion<f32>,
    scale: &Vector3<f32>,
) -> Matrix4<f32> {
    Matrix4::new_translation(translation)
        * rotation.to_homogeneous()
        * Matrix4::new_nonuniform_scaling(scale)
}

/// Split an affine matrix into translation, rotation and (positive) scale.
pub fn decompose(matrix: &Matrix4<f32>) -> (Vector3<f32>, UnitQuaternion<f32>, Vector3<f32>) {
    let translation = matrix.fixed_view::<3, 1>(0, 3).into_owned();
    let linear: Matrix3<f32> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
    let scale = Vector3::new(
        linear.column(0).norm(),
        linear.column(1).norm(),
        linear.column(2).norm(),
    );
    let mut unscaled = linear;
    for (i, s) in scale.iter().enumerate() {
        if *s > f32::EPSILON {
            unscaled.column_mut(i).unscale_mut(*s);
        }
    }
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(&unscaled));
    (translation, rotation, scale)
}

/// Transform a point by an affine matrix.
#[inline]
pub fn transform_point(matrix: &Matrix4<f32>, point: &Vector3<f32>) -> Vector3<f32> {
    let p = matrix * Vector4::new(point.x, point.y, point.z, 1.0);
    Vector3::new(p.x, p.y, p.z)
}

/// World-space position and orientation of an entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }
}

impl Pose {
    pub fn new(position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self { position, rotation }
    }

    pub fn from_matrix(matrix: &Matrix4<f32>) -> Self {
        let (position, rotation, _) = decompose(matrix);
        Self { position, rotation }
    }

    /// `(px, py, pz, qx, qy, qz, qw)`.
    pub fn components(&self) -> [f32; 7] {
        let q = self.rotation.coords;
        [
            self.position.x,
            self.position.y,
            self.position.z,
            q.x,
            q.y,
            q.z,
            q.w,
        ]
    }

    /// Components with the quaternion flipped onto the hemisphere of `reference`.
    pub fn components_aligned(&self, reference: &UnitQuaternion<f32>) -> [f32; 7] {
        let mut c = self.components();
        if self.rotation.coords.dot(&reference.coords) < 0.0 {
            for v in &mut c[3..] {
                *v = -*v;
            }
        }
        c
    }
}
