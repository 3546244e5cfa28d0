//! Tangent-retargeting solver.
//!
//! Reshapes the Bezier handles of the keys framing `[start, end]` so the end
//! effector reaches a target pose at `frame`, without adding keys. A session
//! runs `Setup -> Compute -> Apply`:
//!
//! - Setup validates the window, snapshots the keys into an owned model,
//!   builds bounds, stiffness and continuity terms and spawns the Jacobian
//! - Compute joins the Jacobian and solves the box-constrained QP
//! - Apply writes the new handles, unless Compute aborted

use std::sync::Arc;

use keyrig_curve_core::{
    AnimatableProperty, BezierSegment, Interpolation, Keyframe, LocalTransform, Pose,
};
use nalgebra::{DMatrix, DVector, Matrix4};
use tracing::{debug, warn};

use crate::bounds::{
    add_continuity_blocks, keys_with_theta, tangent_bounds, tangent_theta, AngleLimits,
    WindowKeys, TANGENT_PARAMS,
};
use crate::config::SolverConfig;
use crate::edit::KeyframeEdit;
use crate::error::{Result, SolverError};
use crate::jacobian::{pose_delta, JacobianJob, PoseModel};
use crate::objective::{assemble, ContinuityTerm, ObjectiveWeights};
use crate::phase::{expect_phase, SolverPhase};
use crate::qp::{ActiveSetQp, BoxQpSolver};
use crate::rig::Rig;

/// Which curves a tangent session reshapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TangentVariant {
    /// Position and rotation curves of the end effector.
    Object,
    /// Rotation curves of every joint plus the root position curves.
    Rig,
}

impl TangentVariant {
    /// `(joint, channel)` pairs solved for on `rig`.
    pub fn channels(self, rig: &Rig) -> Vec<(usize, AnimatableProperty)> {
        match self {
            Self::Object => {
                let effector = rig.effector_index();
                AnimatableProperty::POSITION
                    .iter()
                    .chain(AnimatableProperty::ROTATION.iter())
                    .map(|&p| (effector, p))
                    .collect()
            }
            Self::Rig => {
                let mut channels: Vec<_> = (0..rig.len())
                    .flat_map(|joint| AnimatableProperty::ROTATION.iter().map(move |&p| (joint, p)))
                    .collect();
                channels.extend(AnimatableProperty::POSITION.iter().map(|&p| (0, p)));
                channels
            }
        }
    }
}

/// One solved curve.
#[derive(Clone, Copy, Debug)]
struct Segment {
    joint: usize,
    property: AnimatableProperty,
    prev_index: usize,
    key_count: usize,
    keys: WindowKeys,
}

/// Owned snapshot of the rig at `frame`, evaluated with trial handles.
struct TangentModel {
    parent: Matrix4<f32>,
    frame: i32,
    locals: Vec<LocalTransform>,
    segments: Vec<Segment>,
    step: f64,
}

impl PoseModel for TangentModel {
    fn parameter_count(&self) -> usize {
        self.segments.len() * TANGENT_PARAMS
    }

    fn step_size(&self, _index: usize) -> f64 {
        self.step
    }

    fn pose(&self, theta: &[f64]) -> Pose {
        let mut locals = self.locals.clone();
        for (i, segment) in self.segments.iter().enumerate() {
            let Some(handles) = theta.get(i * TANGENT_PARAMS..(i + 1) * TANGENT_PARAMS) else {
                continue;
            };
            let (prev, next) = keys_with_theta(&segment.keys.prev, &segment.keys.next, handles);
            let value = BezierSegment::between(&prev, &next).value_at(self.frame as f32);
            locals[segment.joint].set_channel(segment.property, value);
        }
        let world = locals.iter().fold(self.parent, |acc, l| acc * l.matrix());
        Pose::from_matrix(&world)
    }
}

/// Everything Setup builds for Compute and Apply.
struct Prepared {
    model: Arc<TangentModel>,
    job: Option<JacobianJob>,
    theta0: DVector<f64>,
    lower: DVector<f64>,
    upper: DVector<f64>,
    stiffness: Vec<f64>,
    continuity: DMatrix<f64>,
}

pub struct TangentSolver {
    variant: TangentVariant,
    target: Pose,
    frame: i32,
    start: i32,
    end: i32,
    config: SolverConfig,
    qp: Arc<dyn BoxQpSolver>,
    phase: SolverPhase,
    prepared: Option<Prepared>,
    delta: Option<DVector<f64>>,
    aborted: bool,
    edits: Vec<KeyframeEdit>,
}

impl TangentSolver {
    /// Session editing the segment `window = (start, end)` so the effector
    /// reaches `target` at `frame`.
    pub fn new(
        variant: TangentVariant,
        target: Pose,
        frame: i32,
        window: (i32, i32),
        config: SolverConfig,
    ) -> Self {
        let qp: Arc<dyn BoxQpSolver> = Arc::new(ActiveSetQp::from_config(&config));
        Self {
            variant,
            target,
            frame,
            start: window.0,
            end: window.1,
            config,
            qp,
            phase: SolverPhase::Setup,
            prepared: None,
            delta: None,
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
    pub fn variant(&self) -> TangentVariant {
        self.variant
    }

    #[inline]
    pub fn window(&self) -> (i32, i32) {
        (self.start, self.end)
    }

    /// True when Compute gave up and Apply left the curves alone.
    #[inline]
    pub fn was_aborted(&self) -> bool {
        self.aborted
    }

    /// Handle step found by Compute.
    pub fn delta(&self) -> Option<&DVector<f64>> {
        self.delta.as_ref()
    }

    pub fn edits(&self) -> &[KeyframeEdit] {
        &self.edits
    }

    pub fn take_edits(&mut self) -> Vec<KeyframeEdit> {
        std::mem::take(&mut self.edits)
    }

    fn weights(&self) -> ObjectiveWeights {
        let target = match self.variant {
            TangentVariant::Object => self.config.object_target_weight,
            TangentVariant::Rig => self.config.target_weight,
        };
        ObjectiveWeights {
            target,
            stiffness: self.config.stiffness_weight,
            continuity: self.config.continuity_weight,
            regularization: self.config.regularization,
        }
    }

    fn limits(&self, rig: &Rig, joint: usize, property: AnimatableProperty) -> Option<AngleLimits> {
        if self.variant == TangentVariant::Object || !property.is_rotation() {
            return None;
        }
        let axis = property.axis()?;
        let constraints = &rig.joints[joint].constraints;
        Some(AngleLimits {
            min: f64::from(constraints.lower_angle_bound[axis]),
            max: f64::from(constraints.upper_angle_bound[axis]),
        })
    }

    fn stiffness(&self, rig: &Rig, joint: usize, property: AnimatableProperty) -> f64 {
        match self.variant {
            TangentVariant::Object => 0.0,
            TangentVariant::Rig if property.is_position() => f64::from(rig.joints[0].constraints.stiffness),
            TangentVariant::Rig if joint == rig.effector_index() => 0.0,
            TangentVariant::Rig => f64::from(rig.joints[joint].constraints.stiffness),
        }
    }

    fn window_keys(&self, rig: &Rig, joint: usize, property: AnimatableProperty) -> Result<Segment> {
        let curve = rig.joints[joint]
            .animation
            .curve(property)
            .ok_or(SolverError::MissingCurve { joint, property })?;
        let missing = |frame| SolverError::MissingWindowKey {
            joint,
            property,
            frame,
        };
        let prev_index = curve.key_index(self.start).ok_or_else(|| missing(self.start))?;
        let next_index = curve.key_index(self.end).ok_or_else(|| missing(self.end))?;
        if next_index != prev_index + 1 {
            return Err(SolverError::KeysInsideWindow {
                joint,
                property,
                start: self.start,
                end: self.end,
            });
        }
        let keys = curve.keys();
        Ok(Segment {
            joint,
            property,
            prev_index,
            key_count: keys.len(),
            keys: WindowKeys {
                before: prev_index.checked_sub(1).map(|i| keys[i]),
                prev: keys[prev_index],
                next: keys[next_index],
                after: keys.get(next_index + 1).copied(),
            },
        })
    }

    /// Validate the window, snapshot the keys and start the Jacobian.
    pub fn setup(&mut self, rig: &Rig) -> Result<()> {
        expect_phase(self.phase, SolverPhase::Setup)?;
        if !(self.start < self.frame && self.frame < self.end) {
            return Err(SolverError::FrameOutsideWindow {
                frame: self.frame,
                start: self.start,
                end: self.end,
            });
        }

        let channels = self.variant.channels(rig);
        let n = channels.len() * TANGENT_PARAMS;
        let mut segments = Vec::with_capacity(channels.len());
        let mut theta0 = Vec::with_capacity(n);
        let mut lower = Vec::with_capacity(n);
        let mut upper = Vec::with_capacity(n);
        let mut stiffness = Vec::with_capacity(n);
        let mut continuity = DMatrix::zeros(n, n);

        for (i, &(joint, property)) in channels.iter().enumerate() {
            let segment = self.window_keys(rig, joint, property)?;
            let limits = self.limits(rig, joint, property);
            let bounds = tangent_bounds(&segment.keys, limits, self.config.tangent_box);
            theta0.extend(tangent_theta(&segment.keys.prev, &segment.keys.next));
            lower.extend(bounds.lower);
            upper.extend(bounds.upper);
            stiffness.extend([self.stiffness(rig, joint, property); TANGENT_PARAMS]);
            add_continuity_blocks(&mut continuity, i * TANGENT_PARAMS, bounds.continuity);
            segments.push(segment);
        }

        let model = Arc::new(TangentModel {
            parent: rig.parent,
            frame: self.frame,
            locals: rig
                .joints
                .iter()
                .map(|j| j.animation.local_transform(self.frame))
                .collect(),
            segments,
            step: self.config.tangent_step,
        });
        let job = JacobianJob::spawn(Arc::clone(&model), theta0.clone(), self.config.difference_scheme);
        debug!(
            variant = ?self.variant,
            frame = self.frame,
            start = self.start,
            end = self.end,
            parameters = n,
            "tangent session set up"
        );

        self.prepared = Some(Prepared {
            model,
            job: Some(job),
            theta0: DVector::from_vec(theta0),
            lower: DVector::from_vec(lower),
            upper: DVector::from_vec(upper),
            stiffness,
            continuity,
        });
        self.phase = SolverPhase::Compute;
        Ok(())
    }

    /// Join the Jacobian and solve for the handle step.
    pub fn compute(&mut self) -> Result<()> {
        expect_phase(self.phase, SolverPhase::Compute)?;
        let weights = self.weights();
        let prepared = self.prepared.as_mut().ok_or(SolverError::JacobianJobLost)?;
        let jacobian = prepared
            .job
            .take()
            .ok_or(SolverError::JacobianJobLost)?
            .join()?;

        let theta0: Vec<f64> = prepared.theta0.iter().copied().collect();
        let current = prepared.model.pose(&theta0);
        let delta = pose_delta(&current, &self.target);
        let continuity = ContinuityTerm {
            matrix: &prepared.continuity,
            theta0: &prepared.theta0,
        };
        let solved = assemble(&jacobian, &delta, &prepared.stiffness, Some(continuity), &weights)
            .and_then(|(q, b)| self.qp.solve(&q, &b, &prepared.lower, &prepared.upper));

        match solved {
            Ok(step) if step.iter().all(|v| v.is_finite()) => {
                debug!(
                    error = delta.norm(),
                    step = step.norm(),
                    "tangent step computed"
                );
                self.delta = Some(step);
            }
            Ok(_) => {
                warn!(frame = self.frame, "tangent step is not finite, skipping apply");
                self.aborted = true;
            }
            Err(err) => {
                warn!(frame = self.frame, error = %err, "tangent QP failed, skipping apply");
                self.aborted = true;
            }
        }
        self.phase = SolverPhase::Apply;
        Ok(())
    }

    /// Write `theta0 + delta` into the window keys of every solved curve.
    pub fn apply(&mut self, rig: &mut Rig) -> Result<()> {
        expect_phase(self.phase, SolverPhase::Apply)?;
        self.phase = SolverPhase::Done;
        let (Some(prepared), Some(delta)) = (self.prepared.take(), self.delta.as_ref()) else {
            return Ok(());
        };
        if self.aborted {
            return Ok(());
        }

        // check every curve before touching any of them
        for segment in &prepared.model.segments {
            let stale = || SolverError::StaleSession {
                joint: segment.joint,
                property: segment.property,
            };
            let curve = rig
                .joints
                .get(segment.joint)
                .and_then(|j| j.animation.curve(segment.property))
                .ok_or_else(stale)?;
            let unchanged = curve.len() == segment.key_count
                && curve.key(segment.prev_index).map(|k| k.frame) == Some(self.start)
                && curve.key(segment.prev_index + 1).map(|k| k.frame) == Some(self.end);
            if !unchanged {
                return Err(stale());
            }
        }

        let theta = &prepared.theta0 + delta;
        for (i, segment) in prepared.model.segments.iter().enumerate() {
            let handles = theta.rows(i * TANGENT_PARAMS, TANGENT_PARAMS);
            let handles: Vec<f64> = handles.iter().copied().collect();
            let (prev, next) = keys_with_theta(&segment.keys.prev, &segment.keys.next, &handles);
            let curve = rig.joints[segment.joint]
                .animation
                .require_curve_mut(segment.property)?;
            if prev.interpolation != Interpolation::Bezier {
                curve.add_key(prev.with_interpolation(Interpolation::Bezier), true);
            }
            curve.set_tangents(segment.prev_index, prev.in_tangent, prev.out_tangent)?;
            curve.set_tangents(segment.prev_index + 1, next.in_tangent, next.out_tangent)?;
            self.edits.push(KeyframeEdit {
                joint: segment.joint,
                property: segment.property,
                before: vec![segment.keys.prev, segment.keys.next],
                after: vec![
                    Keyframe {
                        interpolation: Interpolation::Bezier,
                        ..prev
                    },
                    next,
                ],
            });
        }
        debug!(curves = self.edits.len(), "tangent step applied");
        Ok(())
    }

    /// Run the next phase. Returns whether phases remain.
    pub fn next_step(&mut self, rig: &mut Rig) -> Result<bool> {
        match self.phase {
            SolverPhase::Setup => self.setup(rig)?,
            SolverPhase::Compute => self.compute()?,
            SolverPhase::Apply => self.apply(rig)?,
            SolverPhase::Done => {}
        }
        Ok(!self.phase.is_done())
    }

    /// Run every remaining phase.
    pub fn run(&mut self, rig: &mut Rig) -> Result<()> {
        while self.next_step(rig)? {}
        Ok(())
    }

    /// Stop the session, waiting for any Jacobian still in flight. Curves are
    /// not touched.
    pub fn cancel(&mut self) {
        if let Some(job) = self.prepared.take().and_then(|mut p| p.job.take()) {
            job.cancel();
        }
        if !self.phase.is_done() {
            debug!(phase = ?self.phase, "tangent session cancelled");
        }
        self.delta = None;
        self.phase = SolverPhase::Done;
    }
}
