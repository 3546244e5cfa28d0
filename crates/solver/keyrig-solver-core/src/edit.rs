//! Records of keyframe changes made by solvers and drags.

use keyrig_curve_core::{AnimatableProperty, AnimationSet, Curve, Keyframe};
use serde::{Deserialize, Serialize};

use crate::rig::Rig;

/// Keys of one curve before and after an edit.
///
/// `before` holds keys that were replaced or removed, `after` keys that were
/// written or added.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyframeEdit {
    pub joint: usize,
    pub property: AnimatableProperty,
    pub before: Vec<Keyframe>,
    pub after: Vec<Keyframe>,
}

impl KeyframeEdit {
    /// First and last frame touched by the edit.
    pub fn frame_span(&self) -> Option<(i32, i32)> {
        let frames = self.before.iter().chain(&self.after).map(|k| k.frame);
        frames.fold(None, |span, f| match span {
            None => Some((f, f)),
            Some((lo, hi)) => Some((lo.min(f), hi.max(f))),
        })
    }
}

fn diff_curve(joint: usize, old: Option<&Curve>, new: &Curve) -> Option<KeyframeEdit> {
    let old_keys = old.map(Curve::keys).unwrap_or_default();
    let before: Vec<Keyframe> = old_keys
        .iter()
        .filter(|k| new.find_key(k.frame) != Some(*k))
        .copied()
        .collect();
    let after: Vec<Keyframe> = new
        .keys()
        .iter()
        .filter(|k| old.and_then(|c| c.find_key(k.frame)) != Some(*k))
        .copied()
        .collect();
    if before.is_empty() && after.is_empty() {
        return None;
    }
    Some(KeyframeEdit {
        joint,
        property: new.property(),
        before,
        after,
    })
}

/// Every curve of `rig` whose keys differ from `snapshot`, in joint and
/// channel order.
pub fn diff_rig(snapshot: &[AnimationSet], rig: &Rig) -> Vec<KeyframeEdit> {
    let mut edits = Vec::new();
    for (joint, (old, current)) in snapshot.iter().zip(&rig.joints).enumerate() {
        let animation = &current.animation;
        for &property in animation.kind().properties() {
            if let Some(curve) = animation.curve(property) {
                edits.extend(diff_curve(joint, old.curve(property), curve));
            }
        }
    }
    edits
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrig_curve_core::FrameRange;
    use nalgebra::Matrix4;

    #[test]
    fn diff_reports_changed_and_added_keys() {
        let range = FrameRange::new(1, 20).unwrap();
        let mut set = AnimationSet::transform(range);
        set.set_curve(
            AnimatableProperty::PositionX,
            vec![Keyframe::new(1, 0.0), Keyframe::new(10, 1.0)],
        );
        let mut rig = Rig::object("cube", Matrix4::identity(), set);
        let snapshot = rig.snapshot();

        let curve = rig.joints[0]
            .animation
            .curve_mut(AnimatableProperty::PositionY)
            .unwrap();
        curve.add_key(Keyframe::new(5, 2.0), false);

        let edits = diff_rig(&snapshot, &rig);
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].property, AnimatableProperty::PositionY);
        assert!(edits[0].before.is_empty());
        assert_eq!(edits[0].after.len(), 1);
        assert_eq!(edits[0].frame_span(), Some((5, 5)));
    }

    #[test]
    fn unchanged_rig_has_no_edits() {
        let set = AnimationSet::transform(FrameRange::default());
        let rig = Rig::object("empty", Matrix4::identity(), set);
        assert!(diff_rig(&rig.snapshot(), &rig).is_empty());
    }
}
