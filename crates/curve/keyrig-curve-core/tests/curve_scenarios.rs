use keyrig_curve_core::{
    AnimatableProperty, BezierSegment, Curve, FrameRange, Interpolation, Keyframe, Vec2,
};

fn range() -> FrameRange {
    FrameRange::new(1, 10).unwrap()
}

fn two_keys() -> Curve {
    let mut curve = Curve::new(AnimatableProperty::PositionX, range());
    curve.add_key(Keyframe::new(1, 0.0), false);
    curve.add_key(Keyframe::new(10, 10.0), false);
    curve
}

#[test]
fn bezier_between_two_keys_stays_inside() {
    let curve = two_keys();
    let value = curve.evaluate(5).unwrap();
    assert!(value > 0.0 && value < 10.0, "value {value}");
}

#[test]
fn inserted_key_is_hit_exactly() {
    let mut curve = two_keys();
    curve.add_key(Keyframe::new(5, 5.0), false);
    assert_eq!(curve.evaluate(5), Some(5.0));
    assert_eq!(curve.evaluate(1), Some(0.0));
    assert_eq!(curve.evaluate(10), Some(10.0));
}

#[test]
fn keys_are_exact_for_every_interpolation() {
    for interpolation in [Interpolation::Constant, Interpolation::Linear, Interpolation::Bezier] {
        let keys = vec![
            Keyframe::new(2, 1.5).with_interpolation(interpolation),
            Keyframe::new(6, -3.0).with_interpolation(interpolation),
            Keyframe::new(9, 7.25).with_interpolation(interpolation),
        ];
        let curve = Curve::from_keys(AnimatableProperty::RotationY, range(), keys.clone());
        for key in &keys {
            assert_eq!(curve.evaluate(key.frame), Some(key.value), "{interpolation:?}");
        }
    }
}

#[test]
fn values_outside_the_keys_hold() {
    let curve = Curve::from_keys(
        AnimatableProperty::PositionY,
        range(),
        vec![Keyframe::new(3, 2.0), Keyframe::new(7, 4.0)],
    );
    assert_eq!(curve.evaluate(1), Some(2.0));
    assert_eq!(curve.evaluate(10), Some(4.0));
    assert_eq!(curve.evaluate(11), None);
}

#[test]
fn constant_and_linear_segments() {
    let curve = Curve::from_keys(
        AnimatableProperty::Power,
        range(),
        vec![
            Keyframe::new(1, 0.0).with_interpolation(Interpolation::Linear),
            Keyframe::new(5, 8.0).with_interpolation(Interpolation::Constant),
            Keyframe::new(9, 1.0),
        ],
    );
    assert_eq!(curve.evaluate(3), Some(4.0));
    assert_eq!(curve.evaluate(8), Some(8.0));
}

#[test]
fn empty_curve_evaluates_to_none() {
    let curve = Curve::new(AnimatableProperty::ScaleX, range());
    assert_eq!(curve.evaluate(4), None);
    assert_eq!(curve.evaluate_uncached(4), None);
}

#[test]
fn bisection_terminates_for_wild_handles() {
    let handles = [
        (Vec2::new(-40.0, 5.0), Vec2::new(60.0, -5.0)),
        (Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0)),
        (Vec2::new(1e6, 1e6), Vec2::new(-1e6, 3.0)),
    ];
    for (in_tangent, out_tangent) in handles {
        let k0 = Keyframe::new(1, 0.0).with_tangents(in_tangent, out_tangent);
        let k1 = Keyframe::new(10, 1.0).with_tangents(in_tangent, out_tangent);
        let segment = BezierSegment::between(&k0, &k1);
        for frame in 1..=10 {
            let t = segment.solve_t(frame as f32);
            assert!((0.0..=1.0).contains(&t));
            assert!(segment.value_at(frame as f32).is_finite());
        }
    }
}

#[test]
fn zone_edit_adds_bounds_and_fades_inner_keys() {
    let mut curve = Curve::from_keys(
        AnimatableProperty::PositionZ,
        FrameRange::new(1, 30).unwrap(),
        vec![Keyframe::new(1, 0.0), Keyframe::new(8, 0.0), Keyframe::new(30, 0.0)],
    );
    let changes = curve.add_zone_key(Keyframe::new(10, 4.0), 4, 16).unwrap();
    assert!(curve.has_key_at(4) && curve.has_key_at(16));
    assert_eq!(curve.evaluate(10), Some(4.0));
    // offset falls off over the six frames between the zone start and the key
    let inner = curve.find_key(8).unwrap().value;
    assert!((inner - 4.0 * (1.0 - 2.0 / 6.0)).abs() < 1e-5);
    assert_eq!(changes.before.len(), 1);
    assert_eq!(changes.after.len(), 4);
}

#[test]
fn tangent_segment_clears_the_window() {
    let mut curve = Curve::from_keys(
        AnimatableProperty::PositionX,
        FrameRange::new(1, 30).unwrap(),
        vec![Keyframe::new(1, 0.0), Keyframe::new(12, 3.0), Keyframe::new(30, 0.0)],
    );
    let window = curve.insert_tangent_segment(5, 20).unwrap();
    assert_eq!(window, (5, 20));
    assert_eq!(curve.tangent_keys(6, 19).len(), 0);
    assert_eq!(curve.len(), 4);
}
