//! Pose solver: keys a whole chain so its end effector reaches a target.
//!
//! Chains of one or two joints, or any chain in forward-kinematics mode, are
//! solved directly. Longer chains in inverse-kinematics mode take one
//! constrained Gauss-Newton step on joint-local Euler deltas plus the root
//! translation, through the same `Setup -> Compute -> Apply` phases as the
//! tangent solver.

use std::sync::Arc;

use keyrig_curve_core::{
    decompose, euler_to_quaternion, quaternion_to_euler, transform_point, trs, AnimatableProperty,
    Keyframe, LocalTransform, Pose,
};
use nalgebra::{DVector, Matrix4, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SolverConfig;
use crate::edit::KeyframeEdit;
use crate::error::{Result, SolverError};
use crate::jacobian::{pose_delta, JacobianJob, PoseModel};
use crate::objective::{assemble, ObjectiveWeights};
use crate::phase::{expect_phase, SolverPhase};
use crate::qp::{ActiveSetQp, BoxQpSolver};
use crate::rig::Rig;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoseMode {
    /// Swing the effector's parent towards the target, then orient the effector.
    ForwardKinematics,
    #[default]
    InverseKinematics,
}

/// Rotation carrying direction `from` onto direction `to`.
///
/// Zero-length inputs give the identity; opposite directions turn half way
/// around an axis perpendicular to `from`.
pub fn from_to_rotation(from: &Vector3<f32>, to: &Vector3<f32>) -> UnitQuaternion<f32> {
    const EPS: f32 = 1e-6;
    if from.norm() < EPS || to.norm() < EPS {
        return UnitQuaternion::identity();
    }
    if let Some(rotation) = UnitQuaternion::rotation_between(from, to) {
        return rotation;
    }
    let helper = if from.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let axis = nalgebra::Unit::new_normalize(from.cross(&helper));
    UnitQuaternion::from_axis_angle(&axis, std::f32::consts::PI)
}

/// Joint-local angle per axis, `2 * atan(q_axis / q_w)` in degrees.
fn axis_angles(rotation: &UnitQuaternion<f32>) -> [f64; 3] {
    let mut q = rotation.coords;
    if q.w < 0.0 {
        q = -q;
    }
    [q.x, q.y, q.z].map(|c| f64::from(2.0 * c.atan2(q.w)).to_degrees())
}

/// Owned copy of the chain's local transforms at one frame.
struct ChainModel {
    parent: Matrix4<f32>,
    locals: Vec<LocalTransform>,
    rotation_step: f64,
    translation_step: f64,
}

impl ChainModel {
    /// Locals after applying the step `theta`: rotations first, three per
    /// joint, then the root translation.
    fn stepped(&self, theta: &[f64]) -> Vec<(Vector3<f32>, UnitQuaternion<f32>, Vector3<f32>)> {
        let at = |i: usize| theta.get(i).copied().unwrap_or_default() as f32;
        let root = 3 * self.locals.len();
        self.locals
            .iter()
            .enumerate()
            .map(|(j, local)| {
                let delta = Vector3::new(at(3 * j), at(3 * j + 1), at(3 * j + 2));
                let rotation = euler_to_quaternion(&local.rotation) * euler_to_quaternion(&delta);
                let mut position = local.position;
                if j == 0 {
                    position += Vector3::new(at(root), at(root + 1), at(root + 2));
                }
                (position, rotation, local.scale)
            })
            .collect()
    }
}

impl PoseModel for ChainModel {
    fn parameter_count(&self) -> usize {
        3 * self.locals.len() + 3
    }

    fn step_size(&self, index: usize) -> f64 {
        if index < 3 * self.locals.len() {
            self.rotation_step
        } else {
            self.translation_step
        }
    }

    fn pose(&self, theta: &[f64]) -> Pose {
        let world = self
            .stepped(theta)
            .iter()
            .fold(self.parent, |acc, (t, r, s)| acc * trs(t, r, s));
        Pose::from_matrix(&world)
    }
}

/// New local channels produced by Compute.
#[derive(Clone, Debug, Default)]
struct PoseUpdate {
    /// Euler degrees per joint; `None` leaves the joint alone.
    rotations: Vec<Option<Vector3<f32>>>,
    root_position: Option<Vector3<f32>>,
}

struct Prepared {
    model: Arc<ChainModel>,
    job: Option<JacobianJob>,
    lower: DVector<f64>,
    upper: DVector<f64>,
    stiffness: Vec<f64>,
}

pub struct PoseSolver {
    mode: PoseMode,
    target: Pose,
    frame: i32,
    config: SolverConfig,
    qp: Arc<dyn BoxQpSolver>,
    phase: SolverPhase,
    prepared: Option<Prepared>,
    update: Option<PoseUpdate>,
    aborted: bool,
    edits: Vec<KeyframeEdit>,
}

impl PoseSolver {
    pub fn new(mode: PoseMode, target: Pose, frame: i32, config: SolverConfig) -> Self {
        let qp: Arc<dyn BoxQpSolver> = Arc::new(ActiveSetQp::from_config(&config));
        Self {
            mode,
            target,
            frame,
            config,
            qp,
            phase: SolverPhase::Setup,
            prepared: None,
            update: None,
            aborted: false,
            edits: Vec::new(),
        }
    }

    pub fn with_qp_solver(mut self, qp: Arc<dyn BoxQpSolver>) -> Self {
        self.qp = qp;
        self
    }

    #[inline]
    pub fn phase(&self) -> SolverPhase {
        self.phase
    }

    #[inline]
    pub fn mode(&self) -> PoseMode {
        self.mode
    }

    #[inline]
    pub fn was_aborted(&self) -> bool {
        self.aborted
    }

    pub fn edits(&self) -> &[KeyframeEdit] {
        &self.edits
    }

    pub fn take_edits(&mut self) -> Vec<KeyframeEdit> {
        std::mem::take(&mut self.edits)
    }

    fn is_direct(&self, rig: &Rig) -> bool {
        self.mode == PoseMode::ForwardKinematics || rig.len() <= 2
    }

    pub fn setup(&mut self, rig: &Rig) -> Result<()> {
        expect_phase(self.phase, SolverPhase::Setup)?;
        if rig.is_empty() {
            return Err(SolverError::EmptyRig);
        }
        if self.is_direct(rig) {
            // closed form, nothing to estimate
            self.update = Some(self.direct_update(rig)?);
            debug!(joints = rig.len(), frame = self.frame, "direct pose solve");
            self.phase = SolverPhase::Compute;
            return Ok(());
        }

        let locals: Vec<LocalTransform> = rig
            .joints
            .iter()
            .map(|j| j.animation.local_transform(self.frame))
            .collect();
        let n = 3 * locals.len() + 3;
        let mut lower = Vec::with_capacity(n);
        let mut upper = Vec::with_capacity(n);
        let mut stiffness = Vec::with_capacity(n);
        let effector = rig.effector_index();
        for (index, (joint, local)) in rig.joints.iter().zip(&locals).enumerate() {
            let angles = axis_angles(&euler_to_quaternion(&local.rotation));
            let c = &joint.constraints;
            // effector rotations are unpenalized
            let joint_stiffness = if index == effector { 0.0 } else { f64::from(c.stiffness) };
            for axis in 0..3 {
                lower.push((f64::from(c.lower_angle_bound[axis]) - angles[axis]).min(0.0));
                upper.push((f64::from(c.upper_angle_bound[axis]) - angles[axis]).max(0.0));
                stiffness.push(joint_stiffness);
            }
        }
        let limit = self.config.root_translation_limit;
        let root_stiffness = f64::from(rig.joints[0].constraints.stiffness);
        for _ in 0..3 {
            lower.push(-limit);
            upper.push(limit);
            stiffness.push(root_stiffness);
        }

        let model = Arc::new(ChainModel {
            parent: rig.parent,
            locals,
            rotation_step: self.config.rotation_step_degrees,
            translation_step: self.config.translation_step,
        });
        let job = JacobianJob::spawn(Arc::clone(&model), vec![0.0; n], self.config.difference_scheme);
        debug!(joints = rig.len(), frame = self.frame, parameters = n, "pose session set up");
        self.prepared = Some(Prepared {
            model,
            job: Some(job),
            lower: DVector::from_vec(lower),
            upper: DVector::from_vec(upper),
            stiffness,
        });
        self.phase = SolverPhase::Compute;
        Ok(())
    }

    /// Closed-form update for short chains and forward-kinematics mode.
    fn direct_update(&self, rig: &Rig) -> Result<PoseUpdate> {
        let n = rig.len();
        let mut update = PoseUpdate {
            rotations: vec![None; n],
            root_position: None,
        };

        if n == 1 {
            let inverse = rig
                .parent
                .try_inverse()
                .ok_or(SolverError::SingularTransform { joint: 0 })?;
            let (_, parent_rotation, _) = decompose(&rig.parent);
            let position = transform_point(&inverse, &self.target.position);
            let rotation = parent_rotation.inverse() * self.target.rotation;
            update.rotations[0] = Some(quaternion_to_euler(&rotation));
            update.root_position = Some(position);
            return Ok(update);
        }

        let pivot_index = n - 2;
        let effector = rig.effector_index();
        let local = rig.joints[pivot_index].animation.local_transform(self.frame);
        let pivot = rig.parent_matrix_of(pivot_index, self.frame) * Matrix4::new_translation(&local.position);
        let pivot_inverse = pivot
            .try_inverse()
            .ok_or(SolverError::SingularTransform { joint: pivot_index })?;

        let effector_world = rig.effector_pose(self.frame).position;
        let from = transform_point(&pivot_inverse, &effector_world);
        let to = transform_point(&pivot_inverse, &self.target.position);
        let swung = from_to_rotation(&from, &to) * euler_to_quaternion(&local.rotation);

        let pivot_world = pivot * trs(&Vector3::zeros(), &swung, &local.scale);
        let (_, pivot_world_rotation, _) = decompose(&pivot_world);
        let effector_rotation = pivot_world_rotation.inverse() * self.target.rotation;

        update.rotations[pivot_index] = Some(quaternion_to_euler(&swung));
        update.rotations[effector] = Some(quaternion_to_euler(&effector_rotation));
        Ok(update)
    }

    pub fn compute(&mut self) -> Result<()> {
        expect_phase(self.phase, SolverPhase::Compute)?;
        self.phase = SolverPhase::Apply;
        let Some(prepared) = self.prepared.as_mut() else {
            // direct solves finish in setup
            return Ok(());
        };
        let jacobian = prepared
            .job
            .take()
            .ok_or(SolverError::JacobianJobLost)?
            .join()?;
        let n = prepared.model.parameter_count();
        let current = prepared.model.pose(&vec![0.0; n]);
        let delta = pose_delta(&current, &self.target);
        let weights = ObjectiveWeights {
            target: self.config.target_weight,
            stiffness: self.config.stiffness_weight,
            continuity: 0.0,
            regularization: self.config.regularization,
        };
        let solved = assemble(&jacobian, &delta, &prepared.stiffness, None, &weights)
            .and_then(|(q, b)| self.qp.solve(&q, &b, &prepared.lower, &prepared.upper));

        let step = match solved {
            Ok(step) if step.iter().all(|v| v.is_finite()) => step,
            Ok(_) => {
                warn!(frame = self.frame, "pose step is not finite, skipping apply");
                self.aborted = true;
                return Ok(());
            }
            Err(err) => {
                warn!(frame = self.frame, error = %err, "pose QP failed, skipping apply");
                self.aborted = true;
                return Ok(());
            }
        };
        debug!(error = delta.norm(), step = step.norm(), "pose step computed");

        let stepped = prepared.model.stepped(step.as_slice());
        self.update = Some(PoseUpdate {
            rotations: stepped
                .iter()
                .map(|(_, rotation, _)| Some(quaternion_to_euler(rotation)))
                .collect(),
            root_position: stepped.first().map(|(position, _, _)| *position),
        });
        Ok(())
    }

    /// Key the solved channels at the session frame.
    pub fn apply(&mut self, rig: &mut Rig) -> Result<()> {
        expect_phase(self.phase, SolverPhase::Apply)?;
        self.phase = SolverPhase::Done;
        self.prepared = None;
        let Some(update) = self.update.take() else {
            return Ok(());
        };
        if self.aborted {
            return Ok(());
        }

        let mut writes = Vec::new();
        for (joint, rotation) in update.rotations.iter().enumerate() {
            if let Some(rotation) = rotation {
                writes.extend(
                    AnimatableProperty::ROTATION
                        .iter()
                        .zip(rotation.iter())
                        .map(|(&p, &v)| (joint, p, v)),
                );
            }
        }
        if let Some(position) = update.root_position {
            writes.extend(
                AnimatableProperty::POSITION
                    .iter()
                    .zip(position.iter())
                    .map(|(&p, &v)| (0, p, v)),
            );
        }

        for (joint, property, value) in writes {
            let animation = &mut rig
                .joints
                .get_mut(joint)
                .ok_or(SolverError::EmptyRig)?
                .animation;
            let before = animation
                .curve(property)
                .and_then(|c| c.find_key(self.frame))
                .copied();
            let key = Keyframe::new(self.frame, value);
            let index = animation.add_filtered_key(property, key)?;
            let written = animation.curve(property).and_then(|c| c.key(index)).copied();
            self.edits.push(KeyframeEdit {
                joint,
                property,
                before: before.into_iter().collect(),
                after: written.into_iter().collect(),
            });
        }
        debug!(keys = self.edits.len(), frame = self.frame, "pose keys written");
        Ok(())
    }

    pub fn next_step(&mut self, rig: &mut Rig) -> Result<bool> {
        match self.phase {
            SolverPhase::Setup => self.setup(rig)?,
            SolverPhase::Compute => self.compute()?,
            SolverPhase::Apply => self.apply(rig)?,
            SolverPhase::Done => {}
        }
        Ok(!self.phase.is_done())
    }

    pub fn run(&mut self, rig: &mut Rig) -> Result<()> {
        while self.next_step(rig)? {}
        Ok(())
    }

    pub fn cancel(&mut self) {
        if let Some(job) = self.prepared.take().and_then(|mut p| p.job.take()) {
            job.cancel();
        }
        self.update = None;
        self.phase = SolverPhase::Done;
    }
}
