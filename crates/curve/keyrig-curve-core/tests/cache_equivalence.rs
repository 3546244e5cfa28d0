//! Randomized edit sequences: the cache must always agree with direct
//! evaluation and keys must stay strictly ordered.

use keyrig_curve_core::{AnimatableProperty, Curve, FrameRange, Interpolation, Keyframe};

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn assert_consistent(curve: &Curve, step: usize) {
    let keys = curve.keys();
    assert!(
        keys.windows(2).all(|w| w[0].frame < w[1].frame),
        "keys out of order after step {step}"
    );
    for frame in curve.range().frames() {
        assert_eq!(
            curve.evaluate(frame),
            curve.evaluate_uncached(frame),
            "frame {frame} after step {step}"
        );
    }
}

fn random_edits(seed: u64, steps: usize) {
    let range = FrameRange::new(1, 60).unwrap();
    let mut curve = Curve::new(AnimatableProperty::RotationX, range);
    let mut rng = Lcg(seed);
    let modes = [Interpolation::Constant, Interpolation::Linear, Interpolation::Bezier];

    for step in 0..steps {
        let frame = 1 + rng.below(60) as i32;
        match rng.below(4) {
            0 | 1 => {
                let value = rng.below(200) as f32 - 100.0;
                let mode = modes[rng.below(3) as usize];
                let lock = rng.below(5) == 0;
                curve.add_key(Keyframe::new(frame, value).with_interpolation(mode), lock);
            }
            2 => {
                if let Some(key) = curve.keys().get(rng.below(curve.len().max(1) as u64) as usize) {
                    let frame = key.frame;
                    curve.remove_key(frame, false);
                }
            }
            _ => {
                if let Some(key) = curve.keys().first().copied() {
                    curve.move_key(key.frame, frame).unwrap();
                }
            }
        }
        assert_consistent(&curve, step);
    }
}

#[test]
fn random_edit_sequences_keep_cache_consistent() {
    for seed in [1, 7, 42, 1234, 98765] {
        random_edits(seed, 200);
    }
}

#[test]
fn compute_cache_is_idempotent() {
    let mut curve = Curve::from_keys(
        AnimatableProperty::PositionX,
        FrameRange::new(1, 40).unwrap(),
        vec![Keyframe::new(3, 1.0), Keyframe::new(17, -2.0), Keyframe::new(33, 5.0)],
    );
    let first: Vec<_> = curve.range().frames().map(|f| curve.evaluate(f)).collect();
    curve.compute_cache();
    let second: Vec<_> = curve.range().frames().map(|f| curve.evaluate(f)).collect();
    assert_eq!(first, second);
}

#[test]
fn range_change_rebuilds_cache() {
    let mut curve = Curve::from_keys(
        AnimatableProperty::PositionX,
        FrameRange::new(1, 10).unwrap(),
        vec![Keyframe::new(2, 1.0), Keyframe::new(8, 3.0)],
    );
    curve.set_range(FrameRange::new(5, 50).unwrap());
    assert_eq!(curve.evaluate(2), None);
    assert_eq!(curve.evaluate(40), Some(3.0));
    assert_consistent(&curve, 0);
}
