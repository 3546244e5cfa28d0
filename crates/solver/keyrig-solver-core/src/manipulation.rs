//! Drag gestures that turn controller input into keyframe edits.
//!
//! A gesture starts with `begin`, receives one `drag` per input update and
//! ends with `release`, which reports the edited keys, or `cancel`, which
//! puts the curves back as they were at `begin`.

use std::sync::Arc;

use keyrig_curve_core::{
    decompose, delta_angle, quaternion_to_euler, AnimatableProperty, AnimationSet, Keyframe,
    LocalTransform, Pose,
};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SolverConfig;
use crate::edit::{diff_rig, KeyframeEdit};
use crate::error::{Result, SolverError};
use crate::pose::{PoseMode, PoseSolver};
use crate::qp::{ActiveSetQp, BoxQpSolver};
use crate::rig::Rig;
use crate::tangent::{TangentSolver, TangentVariant};

/// How a drag changes the curves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurveEditMode {
    /// Key the dragged pose at the current frame.
    #[default]
    AddKeyframe,
    /// Key the current frame and fade the offset out over `zone_size` frames.
    Zone,
    /// Clear `frame +/- zone_size` down to one Bezier segment and reshape it.
    Segment,
    /// Reshape the segment between the keys around the current frame.
    Tangents,
}

/// Seed empty curves, then reduce each curve to a single segment over
/// `[start, end]`. Returns the window clamped to the curves' range.
fn prepare_window(
    rig: &mut Rig,
    channels: &[(usize, AnimatableProperty)],
    frame: i32,
    start: i32,
    end: i32,
) -> Result<(i32, i32)> {
    let mut window = (start, end);
    for &(joint, property) in channels {
        let animation = &mut rig.joints[joint].animation;
        let current = animation.value(property, frame);
        let curve = animation.require_curve_mut(property)?;
        if curve.is_empty() {
            let seed = curve.range().clamp(start);
            curve.add_key(Keyframe::new(seed, current), false);
        }
        window = curve.insert_tangent_segment(start, end)?;
    }
    Ok(window)
}

/// Innermost keys around `frame` over all `channels`.
fn surrounding_window(
    rig: &Rig,
    channels: &[(usize, AnimatableProperty)],
    frame: i32,
) -> Result<(i32, i32)> {
    let mut start: Option<i32> = None;
    let mut end: Option<i32> = None;
    for &(joint, property) in channels {
        let Some(curve) = rig.joints[joint].animation.curve(property) else {
            continue;
        };
        if curve.has_key_at(frame) {
            return Err(SolverError::KeysInsideWindow {
                joint,
                property,
                start: frame,
                end: frame,
            });
        }
        if let Some(f) = curve.previous_key_frame(frame) {
            start = Some(start.map_or(f, |s| s.max(f)));
        }
        if let Some(f) = curve.next_key_frame(frame) {
            end = Some(end.map_or(f, |e| e.min(f)));
        }
    }
    match (start, end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(SolverError::FrameOutsideWindow {
            frame,
            start: start.unwrap_or(frame),
            end: end.unwrap_or(frame),
        }),
    }
}

fn edit_window(
    rig: &mut Rig,
    variant: TangentVariant,
    mode: CurveEditMode,
    frame: i32,
    zone_size: i32,
) -> Result<Option<(i32, i32)>> {
    let channels = variant.channels(rig);
    let window = match mode {
        CurveEditMode::Segment => {
            prepare_window(rig, &channels, frame, frame - zone_size, frame + zone_size)?
        }
        CurveEditMode::Tangents => {
            let (start, end) = surrounding_window(rig, &channels, frame)?;
            prepare_window(rig, &channels, frame, start, end)?
        }
        CurveEditMode::AddKeyframe | CurveEditMode::Zone => return Ok(None),
    };
    Ok(Some(window))
}

/// `edit_window`, putting `snapshot` back when any channel fails part way.
fn begin_window(
    rig: &mut Rig,
    snapshot: &[AnimationSet],
    variant: TangentVariant,
    mode: CurveEditMode,
    frame: i32,
    zone_size: i32,
) -> Result<Option<(i32, i32)>> {
    edit_window(rig, variant, mode, frame, zone_size).map_err(|err| {
        warn!(?mode, frame, error = %err, "edit window preparation failed, curves restored");
        rig.restore(snapshot.to_vec());
        err
    })
}

fn check_frame(rig: &Rig, frame: i32) -> Result<()> {
    rig.range().ok_or(SolverError::EmptyRig)?.check(frame)?;
    Ok(())
}

/// Drag of a single animated object, the end effector of `rig`.
pub struct ObjectDrag {
    frame: i32,
    mode: CurveEditMode,
    zone_size: i32,
    config: SolverConfig,
    qp: Arc<dyn BoxQpSolver>,
    snapshot: Vec<AnimationSet>,
    window: Option<(i32, i32)>,
}

impl ObjectDrag {
    pub fn begin(
        rig: &mut Rig,
        frame: i32,
        mode: CurveEditMode,
        zone_size: i32,
        config: SolverConfig,
    ) -> Result<Self> {
        config.validate()?;
        check_frame(rig, frame)?;
        let snapshot = rig.snapshot();
        let window = begin_window(rig, &snapshot, TangentVariant::Object, mode, frame, zone_size)?;
        debug!(?mode, frame, zone_size, ?window, "object drag started");
        Ok(Self {
            frame,
            mode,
            zone_size,
            qp: Arc::new(ActiveSetQp::from_config(&config)),
            config,
            snapshot,
            window,
        })
    }

    pub fn with_qp_solver(mut self, qp: Arc<dyn BoxQpSolver>) -> Self {
        self.qp = qp;
        self
    }

    #[inline]
    pub fn mode(&self) -> CurveEditMode {
        self.mode
    }

    #[inline]
    pub fn frame(&self) -> i32 {
        self.frame
    }

    /// Segment being reshaped in `Segment` and `Tangents` modes.
    #[inline]
    pub fn window(&self) -> Option<(i32, i32)> {
        self.window
    }

    /// `target` expressed in the effector's parent space.
    fn local_target(&self, rig: &Rig, target: &Matrix4<f32>) -> Result<LocalTransform> {
        let effector = rig.effector_index();
        let parent = rig.parent_matrix_of(effector, self.frame);
        let inverse = parent
            .try_inverse()
            .ok_or(SolverError::SingularTransform { joint: effector })?;
        let (position, rotation, scale) = decompose(&(inverse * target));
        Ok(LocalTransform {
            position,
            rotation: quaternion_to_euler(&rotation),
            scale,
        })
    }

    /// Move the object to the world matrix `target`.
    pub fn drag(&mut self, rig: &mut Rig, target: &Matrix4<f32>) -> Result<()> {
        match self.mode {
            CurveEditMode::AddKeyframe => {
                let local = self.local_target(rig, target)?;
                let effector = rig.effector_index();
                let animation = &mut rig.joints[effector].animation;
                for &property in animation.kind().properties() {
                    if let Some(value) = local.channel(property) {
                        animation.add_filtered_key(property, Keyframe::new(self.frame, value))?;
                    }
                }
            }
            CurveEditMode::Zone => {
                let local = self.local_target(rig, target)?;
                let effector = rig.effector_index();
                let (start, end) = (self.frame - self.zone_size, self.frame + self.zone_size);
                let animation = &mut rig.joints[effector].animation;
                for &property in animation.kind().properties() {
                    let Some(mut value) = local.channel(property) else {
                        continue;
                    };
                    let curve = animation.require_curve_mut(property)?;
                    match curve.evaluate_uncached(self.frame) {
                        None => {
                            curve.add_key(Keyframe::new(self.frame, value), false);
                        }
                        Some(current) => {
                            if property.is_rotation() {
                                value = current + delta_angle(current, value);
                            }
                            curve.add_zone_key(Keyframe::new(self.frame, value), start, end)?;
                        }
                    }
                }
            }
            CurveEditMode::Segment | CurveEditMode::Tangents => {
                let window = self.window.ok_or(SolverError::UnsupportedMode { mode: self.mode })?;
                let mut solver = TangentSolver::new(
                    TangentVariant::Object,
                    Pose::from_matrix(target),
                    self.frame,
                    window,
                    self.config.clone(),
                )
                .with_qp_solver(Arc::clone(&self.qp));
                solver.run(rig)?;
            }
        }
        Ok(())
    }

    /// Finish the gesture and report every key it changed.
    pub fn release(self, rig: &Rig) -> Vec<KeyframeEdit> {
        let edits = diff_rig(&self.snapshot, rig);
        debug!(edits = edits.len(), "object drag released");
        edits
    }

    /// Undo the gesture.
    pub fn cancel(self, rig: &mut Rig) {
        rig.restore(self.snapshot);
        debug!("object drag cancelled");
    }
}

/// Drag of a rig's end effector.
pub struct RigDrag {
    frame: i32,
    mode: CurveEditMode,
    pose_mode: PoseMode,
    config: SolverConfig,
    qp: Arc<dyn BoxQpSolver>,
    snapshot: Vec<AnimationSet>,
    window: Option<(i32, i32)>,
    session: Option<TangentSolver>,
}

impl RigDrag {
    pub fn begin(
        rig: &mut Rig,
        frame: i32,
        mode: CurveEditMode,
        zone_size: i32,
        config: SolverConfig,
    ) -> Result<Self> {
        if mode == CurveEditMode::Zone {
            return Err(SolverError::UnsupportedMode { mode });
        }
        config.validate()?;
        check_frame(rig, frame)?;
        let snapshot = rig.snapshot();
        let window = begin_window(rig, &snapshot, TangentVariant::Rig, mode, frame, zone_size)?;
        debug!(?mode, frame, joints = rig.len(), ?window, "rig drag started");
        Ok(Self {
            frame,
            mode,
            pose_mode: PoseMode::default(),
            qp: Arc::new(ActiveSetQp::from_config(&config)),
            config,
            snapshot,
            window,
            session: None,
        })
    }

    pub fn with_pose_mode(mut self, pose_mode: PoseMode) -> Self {
        self.pose_mode = pose_mode;
        self
    }

    pub fn with_qp_solver(mut self, qp: Arc<dyn BoxQpSolver>) -> Self {
        self.qp = qp;
        self
    }

    #[inline]
    pub fn mode(&self) -> CurveEditMode {
        self.mode
    }

    #[inline]
    pub fn window(&self) -> Option<(i32, i32)> {
        self.window
    }

    /// Active tangent session, if any.
    pub fn session(&self) -> Option<&TangentSolver> {
        self.session.as_ref()
    }

    /// Pull the effector towards `target`.
    ///
    /// In `AddKeyframe` mode the pose solver runs to completion. In the
    /// tangent modes the current session advances one phase; a finished
    /// session is replaced by a new one aimed at `target`.
    pub fn drag(&mut self, rig: &mut Rig, target: &Pose) -> Result<()> {
        if self.mode == CurveEditMode::AddKeyframe {
            let mut solver = PoseSolver::new(self.pose_mode, *target, self.frame, self.config.clone())
                .with_qp_solver(Arc::clone(&self.qp));
            return solver.run(rig);
        }

        let window = self.window.ok_or(SolverError::UnsupportedMode { mode: self.mode })?;
        let finished = self
            .session
            .as_ref()
            .map_or(true, |session| session.phase().is_done());
        if finished {
            self.session = Some(
                TangentSolver::new(
                    TangentVariant::Rig,
                    *target,
                    self.frame,
                    window,
                    self.config.clone(),
                )
                .with_qp_solver(Arc::clone(&self.qp)),
            );
        }
        if let Some(session) = self.session.as_mut() {
            session.next_step(rig)?;
        }
        Ok(())
    }

    /// Finish the pending session and report every key the gesture changed.
    pub fn release(mut self, rig: &mut Rig) -> Result<Vec<KeyframeEdit>> {
        if let Some(session) = self.session.as_mut() {
            session.run(rig)?;
        }
        let edits = diff_rig(&self.snapshot, rig);
        debug!(edits = edits.len(), "rig drag released");
        Ok(edits)
    }

    /// Stop any pending session and undo the gesture.
    pub fn cancel(mut self, rig: &mut Rig) {
        if let Some(session) = self.session.as_mut() {
            session.cancel();
        }
        rig.restore(self.snapshot);
        debug!("rig drag cancelled");
    }
}
