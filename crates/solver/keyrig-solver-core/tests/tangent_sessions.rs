use std::sync::Arc;

use keyrig_curve_core::{AnimatableProperty, AnimationSet, FrameRange, Keyframe, Pose};
use keyrig_solver_core::{
    BoxQpSolver, CurveEditMode, QpError, Rig, RigDrag, SolverConfig, SolverPhase, TangentSolver,
    TangentVariant,
};
use nalgebra::{DMatrix, DVector, Matrix4, UnitQuaternion, Vector3};

fn init_tracing() {
    let default_filter = "keyrig_solver_core=debug";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Every spatial curve keyed at 1, 10 and 20; `PositionX` rises to 10 then
/// falls back.
fn object() -> Rig {
    let range = FrameRange::new(1, 30).unwrap();
    let mut set = AnimationSet::transform(range);
    for property in AnimatableProperty::POSITION
        .iter()
        .chain(AnimatableProperty::ROTATION.iter())
    {
        let peak = if *property == AnimatableProperty::PositionX { 10.0 } else { 0.0 };
        let curve = set.curve_mut(*property).unwrap();
        curve.add_key(Keyframe::new(1, 0.0), false);
        curve.add_key(Keyframe::new(10, peak), false);
        curve.add_key(Keyframe::new(20, 0.0), false);
    }
    Rig::object("cube", Matrix4::identity(), set)
}

fn target_at(x: f32) -> Pose {
    Pose::new(Vector3::new(x, 0.0, 0.0), UnitQuaternion::identity())
}

fn position_error(rig: &Rig, frame: i32, target: &Pose) -> f32 {
    (rig.effector_pose(frame).position - target.position).norm()
}

fn all_keys(rig: &Rig) -> Vec<Vec<Keyframe>> {
    rig.joints
        .iter()
        .flat_map(|j| j.animation.to_data().curves)
        .map(|c| c.keys)
        .collect()
}

struct NanSolver;

impl BoxQpSolver for NanSolver {
    fn solve(
        &self,
        _q: &DMatrix<f64>,
        b: &DVector<f64>,
        _lower: &DVector<f64>,
        _upper: &DVector<f64>,
    ) -> Result<DVector<f64>, QpError> {
        Ok(DVector::from_element(b.len(), f64::NAN))
    }
}

/// Jumps straight to the upper corner of the box.
struct UpperCorner;

impl BoxQpSolver for UpperCorner {
    fn solve(
        &self,
        _q: &DMatrix<f64>,
        _b: &DVector<f64>,
        _lower: &DVector<f64>,
        upper: &DVector<f64>,
    ) -> Result<DVector<f64>, QpError> {
        Ok(upper.clone())
    }
}

#[test]
fn object_tangent_step_reduces_error() {
    init_tracing();
    let mut rig = object();
    let target = target_at(8.0);
    let before = position_error(&rig, 5, &target);

    let mut solver =
        TangentSolver::new(TangentVariant::Object, target, 5, (1, 10), SolverConfig::default());
    solver.run(&mut rig).unwrap();

    assert!(!solver.was_aborted());
    let after = position_error(&rig, 5, &target);
    assert!(after < 0.5 * before, "error {before} -> {after}");
    // key frames and values never move
    let curve = rig.joints[0].animation.curve(AnimatableProperty::PositionX).unwrap();
    assert_eq!(curve.evaluate(10), Some(10.0));
    assert_eq!(curve.len(), 3);
}

#[test]
fn non_finite_step_leaves_curves_untouched() {
    init_tracing();
    let mut rig = object();
    let original = all_keys(&rig);
    let mut solver =
        TangentSolver::new(TangentVariant::Object, target_at(8.0), 5, (1, 10), SolverConfig::default())
            .with_qp_solver(Arc::new(NanSolver));
    solver.run(&mut rig).unwrap();
    assert!(solver.was_aborted());
    assert!(solver.edits().is_empty());
    assert_eq!(all_keys(&rig), original);
}

#[test]
fn x_handles_stay_within_their_segments() {
    let mut rig = object();
    let mut solver =
        TangentSolver::new(TangentVariant::Object, target_at(8.0), 5, (1, 10), SolverConfig::default())
            .with_qp_solver(Arc::new(UpperCorner));
    solver.run(&mut rig).unwrap();
    assert_eq!(solver.edits().len(), 6);

    for curve in rig.joints[0].animation.curves() {
        let keys = curve.keys();
        for (i, key) in keys.iter().enumerate() {
            if let Some(prev) = i.checked_sub(1).map(|p| keys[p]) {
                let span = (key.frame - prev.frame) as f32;
                assert!(key.in_tangent.x >= -1e-4 && key.in_tangent.x <= span + 1e-4);
            }
            if let Some(next) = keys.get(i + 1) {
                let span = (next.frame - key.frame) as f32;
                assert!(key.out_tangent.x >= -1e-4 && key.out_tangent.x <= span + 1e-4);
            }
        }
        for frame in curve.range().frames() {
            assert!(curve.evaluate(frame).is_some_and(f32::is_finite));
        }
    }
}

#[test]
fn cancelled_session_changes_nothing() {
    let mut rig = object();
    let original = all_keys(&rig);
    let mut solver =
        TangentSolver::new(TangentVariant::Object, target_at(8.0), 5, (1, 10), SolverConfig::default());
    assert!(solver.next_step(&mut rig).unwrap());
    solver.cancel();
    assert_eq!(solver.phase(), SolverPhase::Done);
    assert!(!solver.next_step(&mut rig).unwrap());
    assert_eq!(all_keys(&rig), original);
}

#[test]
fn stale_session_is_detected() {
    let mut rig = object();
    let mut solver =
        TangentSolver::new(TangentVariant::Object, target_at(8.0), 5, (1, 10), SolverConfig::default());
    solver.next_step(&mut rig).unwrap();
    solver.next_step(&mut rig).unwrap();
    rig.joints[0]
        .animation
        .curve_mut(AnimatableProperty::PositionZ)
        .unwrap()
        .add_key(Keyframe::new(25, 1.0), false);
    assert!(matches!(
        solver.next_step(&mut rig),
        Err(keyrig_solver_core::SolverError::StaleSession { .. })
    ));
}

fn arm(config_name: &str) -> (Rig, SolverConfig) {
    let json = keyrig_test_fixtures::rigs::json("arm-3").unwrap();
    let rig = Rig::from_json(&json, FrameRange::new(1, 30).unwrap()).unwrap();
    let config_json = keyrig_test_fixtures::configs::json(config_name).unwrap();
    (rig, SolverConfig::from_json(&config_json).unwrap())
}

#[test]
fn rig_tangent_drag_moves_towards_target() {
    init_tracing();
    let (mut rig, config) = arm("responsive");
    let start = rig.effector_pose(15);
    let target = Pose::new(start.position + Vector3::new(-0.2, 0.2, 0.0), start.rotation);

    let mut drag = RigDrag::begin(&mut rig, 15, CurveEditMode::Tangents, 0, config).unwrap();
    assert_eq!(drag.window(), Some((1, 30)));
    let before = position_error(&rig, 15, &target);
    for _ in 0..3 {
        drag.drag(&mut rig, &target).unwrap();
    }
    let edits = drag.release(&mut rig).unwrap();
    assert!(!edits.is_empty());
    assert!(edits
        .iter()
        .all(|e| e.property.is_rotation() || (e.joint == 0 && e.property.is_position())));
    let after = position_error(&rig, 15, &target);
    assert!(after < before, "error {before} -> {after}");
}

#[test]
fn rig_drag_cancel_restores_curves() {
    let (mut rig, config) = arm("default");
    let original = all_keys(&rig);
    let target = Pose::new(Vector3::new(0.5, 2.5, 0.0), UnitQuaternion::identity());
    let mut drag = RigDrag::begin(&mut rig, 12, CurveEditMode::Segment, 4, config).unwrap();
    drag.drag(&mut rig, &target).unwrap();
    drag.drag(&mut rig, &target).unwrap();
    drag.cancel(&mut rig);
    assert_eq!(all_keys(&rig), original);
}
