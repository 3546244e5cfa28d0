//! Finite-difference Jacobian of an effector pose.
//!
//! - `PoseModel` maps a parameter vector to a world pose
//! - `estimate_jacobian` differences each parameter on the rayon pool
//! - `JacobianJob` runs an estimate in the background until joined

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use keyrig_curve_core::Pose;
use nalgebra::{DMatrix, DVector, UnitQuaternion};
use rayon::prelude::*;

use crate::config::DifferenceScheme;
use crate::error::{Result, SolverError};

/// Rows of a pose Jacobian: `px, py, pz, qx, qy, qz, qw`.
pub const POSE_DIM: usize = 7;

/// Parameterized evaluation of an effector pose.
///
/// Implementations own snapshots of whatever they read, so they can be
/// evaluated from worker threads while the caller keeps editing.
pub trait PoseModel: Send + Sync {
    fn parameter_count(&self) -> usize;

    /// Finite-difference step for parameter `index`.
    fn step_size(&self, index: usize) -> f64;

    fn pose(&self, theta: &[f64]) -> Pose;
}

/// Pose as a 7-vector with the quaternion on the hemisphere of `reference`.
pub fn pose_vector(pose: &Pose, reference: &UnitQuaternion<f32>) -> DVector<f64> {
    DVector::from_iterator(
        POSE_DIM,
        pose.components_aligned(reference).iter().map(|&c| c as f64),
    )
}

/// `target - current`, with the target quaternion flipped onto the current
/// quaternion's hemisphere.
pub fn pose_delta(current: &Pose, target: &Pose) -> DVector<f64> {
    pose_vector(target, &current.rotation) - pose_vector(current, &current.rotation)
}

/// `7 x P` Jacobian of `model` at `theta`.
pub fn estimate_jacobian<M>(model: &M, theta: &[f64], scheme: DifferenceScheme) -> DMatrix<f64>
where
    M: PoseModel + ?Sized,
{
    let base = model.pose(theta);
    let base_vector = pose_vector(&base, &base.rotation);
    let count = model.parameter_count().min(theta.len());

    let columns: Vec<DVector<f64>> = (0..count)
        .into_par_iter()
        .map(|index| {
            let step = model.step_size(index);
            let shifted = |delta: f64| {
                let mut perturbed = theta.to_vec();
                perturbed[index] += delta;
                pose_vector(&model.pose(&perturbed), &base.rotation)
            };
            match scheme {
                DifferenceScheme::Forward => (shifted(step) - &base_vector) / step,
                DifferenceScheme::Central => (shifted(step) - shifted(-step)) / (2.0 * step),
            }
        })
        .collect();

    if columns.is_empty() {
        return DMatrix::zeros(POSE_DIM, 0);
    }
    DMatrix::from_columns(&columns)
}

/// Jacobian estimate scheduled on the rayon pool.
///
/// Dropping an un-joined job waits for the worker and discards its result,
/// so no estimate outlives the session that started it.
pub struct JacobianJob {
    receiver: Option<Receiver<DMatrix<f64>>>,
}

impl JacobianJob {
    pub fn spawn<M>(model: Arc<M>, theta: Vec<f64>, scheme: DifferenceScheme) -> Self
    where
        M: PoseModel + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(1);
        rayon::spawn(move || {
            let jacobian = estimate_jacobian(model.as_ref(), &theta, scheme);
            // receiver gone means the job was cancelled
            let _ = sender.send(jacobian);
        });
        Self {
            receiver: Some(receiver),
        }
    }

    /// Block until the estimate is ready.
    pub fn join(mut self) -> Result<DMatrix<f64>> {
        self.receiver
            .take()
            .ok_or(SolverError::JacobianJobLost)?
            .recv()
            .map_err(|_| SolverError::JacobianJobLost)
    }

    /// Wait for the worker and drop its result.
    pub fn cancel(mut self) {
        self.wait_and_discard();
    }

    fn wait_and_discard(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            let _ = receiver.recv();
        }
    }
}

impl Drop for JacobianJob {
    fn drop(&mut self) {
        self.wait_and_discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    /// Point at `(a, b^2, 0)` rotated about z by `c` radians.
    struct Toy;

    impl PoseModel for Toy {
        fn parameter_count(&self) -> usize {
            3
        }

        fn step_size(&self, _index: usize) -> f64 {
            1e-3
        }

        fn pose(&self, theta: &[f64]) -> Pose {
            Pose::new(
                Vector3::new(theta[0] as f32, (theta[1] * theta[1]) as f32, 0.0),
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), theta[2] as f32),
            )
        }
    }

    #[test]
    fn central_differences_match_analytic_columns() {
        let j = estimate_jacobian(&Toy, &[1.0, 2.0, 0.0], DifferenceScheme::Central);
        assert_eq!(j.shape(), (POSE_DIM, 3));
        assert_relative_eq!(j[(0, 0)], 1.0, epsilon = 1e-3);
        assert_relative_eq!(j[(1, 1)], 4.0, epsilon = 1e-2);
        // d qz / d angle = cos(0) / 2
        assert_relative_eq!(j[(5, 2)], 0.5, epsilon = 1e-3);
        assert_relative_eq!(j[(1, 0)], 0.0);
    }

    #[test]
    fn background_job_matches_direct_estimate() {
        let theta = vec![0.5, -1.0, 0.3];
        let direct = estimate_jacobian(&Toy, &theta, DifferenceScheme::Forward);
        let job = JacobianJob::spawn(Arc::new(Toy), theta, DifferenceScheme::Forward);
        let joined = job.join().unwrap();
        assert_relative_eq!(joined, direct);
    }

    #[test]
    fn cancelled_job_is_joined() {
        let job = JacobianJob::spawn(Arc::new(Toy), vec![0.0; 3], DifferenceScheme::Central);
        job.cancel();
    }

    #[test]
    fn delta_flips_target_hemisphere() {
        let current = Pose::default();
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.2);
        let flipped = Pose::new(Vector3::x(), UnitQuaternion::new_unchecked(-q.into_inner()));
        let delta = pose_delta(&current, &flipped);
        assert_relative_eq!(delta[0], 1.0);
        // w stays near 1, so the delta on w is small instead of about -2
        assert!(delta[6].abs() < 0.1);
    }
}
