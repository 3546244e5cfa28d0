use keyrig_curve_core::{AnimatableProperty, AnimationSet, AnimationSetData, EntityKind, FrameRange};

#[test]
fn bounce_fixture_loads_and_evaluates() {
    let json = keyrig_test_fixtures::animation_sets::json("bounce").unwrap();
    let set = AnimationSet::from_json(&json, FrameRange::new(1, 30).unwrap()).unwrap();
    assert_eq!(set.kind(), EntityKind::Transform);
    assert_eq!(set.value(AnimatableProperty::PositionY, 12), 3.0);
    assert_eq!(set.value(AnimatableProperty::PositionY, 27), 0.0);
    // unanimated channels fall back to rest values
    assert_eq!(set.value(AnimatableProperty::ScaleX, 5), 1.0);
    let rise = set.value(AnimatableProperty::PositionY, 6);
    assert!(rise > 0.0 && rise < 3.0);
}

#[test]
fn light_fixture_has_light_channels() {
    let data: AnimationSetData = keyrig_test_fixtures::animation_sets::load("spot-light").unwrap();
    let set = AnimationSet::from_data(data, FrameRange::new(1, 20).unwrap());
    assert_eq!(set.kind(), EntityKind::Light);
    let power = set.value(AnimatableProperty::Power, 5);
    assert!((power - 800.0 * 4.0 / 9.0).abs() < 1e-3);
    assert!(set.curve(AnimatableProperty::ScaleX).is_none());
}

#[test]
fn every_listed_set_parses() {
    for name in keyrig_test_fixtures::animation_sets::keys() {
        let json = keyrig_test_fixtures::animation_sets::json(&name).unwrap();
        AnimationSet::from_json(&json, FrameRange::default())
            .unwrap_or_else(|e| panic!("{name}: {e}"));
    }
}
