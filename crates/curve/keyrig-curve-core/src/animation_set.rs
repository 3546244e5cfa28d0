//! Per-entity collection of curves and TRS reconstruction.

use hashbrown::HashMap;
use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};

use crate::curve::Curve;
use crate::error::{CurveError, Result};
use crate::euler::{delta_angle, euler_to_quaternion};
use crate::keyframe::Keyframe;
use crate::property::{AnimatableProperty, EntityKind};
use crate::range::FrameRange;
use crate::transform::trs;

/// Local TRS channels of an entity at one frame (rotation in Euler degrees).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalTransform {
    pub position: Vector3<f32>,
    pub rotation: Vector3<f32>,
    pub scale: Vector3<f32>,
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: Vector3::from_element(1.0),
        }
    }
}

impl LocalTransform {
    pub fn matrix(&self) -> Matrix4<f32> {
        trs(&self.position, &euler_to_quaternion(&self.rotation), &self.scale)
    }

    /// Value of a spatial channel; `None` for non-TRS properties.
    pub fn channel(&self, property: AnimatableProperty) -> Option<f32> {
        let axis = property.axis()?;
        if property.is_position() {
            Some(self.position[axis])
        } else if property.is_rotation() {
            Some(self.rotation[axis])
        } else {
            Some(self.scale[axis])
        }
    }

    /// Overwrite a spatial channel; non-TRS properties are ignored.
    pub fn set_channel(&mut self, property: AnimatableProperty, value: f32) {
        let Some(axis) = property.axis() else {
            return;
        };
        if property.is_position() {
            self.position[axis] = value;
        } else if property.is_rotation() {
            self.rotation[axis] = value;
        } else {
            self.scale[axis] = value;
        }
    }
}

/// Serialized form of one curve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveData {
    pub property: AnimatableProperty,
    #[serde(default)]
    pub keys: Vec<Keyframe>,
}

/// Serialized form of an animation set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationSetData {
    #[serde(default)]
    pub kind: EntityKind,
    #[serde(default)]
    pub curves: Vec<CurveData>,
}

/// All curves animating one entity.
#[derive(Clone, Debug)]
pub struct AnimationSet {
    kind: EntityKind,
    range: FrameRange,
    curves: HashMap<AnimatableProperty, Curve>,
}

impl AnimationSet {
    /// Empty curves for every channel of `kind`.
    pub fn new(kind: EntityKind, range: FrameRange) -> Self {
        let curves = kind
            .properties()
            .iter()
            .map(|&p| (p, Curve::new(p, range)))
            .collect();
        Self {
            kind,
            range,
            curves,
        }
    }

    pub fn transform(range: FrameRange) -> Self {
        Self::new(EntityKind::Transform, range)
    }

    pub fn from_data(data: AnimationSetData, range: FrameRange) -> Self {
        let mut set = Self::new(data.kind, range);
        for curve in data.curves {
            set.set_curve(curve.property, curve.keys);
        }
        set
    }

    pub fn from_json(json: &str, range: FrameRange) -> Result<Self> {
        let data: AnimationSetData = serde_json::from_str(json)?;
        Ok(Self::from_data(data, range))
    }

    pub fn to_data(&self) -> AnimationSetData {
        let mut curves: Vec<CurveData> = self
            .curves
            .values()
            .map(|c| CurveData {
                property: c.property(),
                keys: c.keys().to_vec(),
            })
            .collect();
        curves.sort_by_key(|c| c.property);
        AnimationSetData {
            kind: self.kind,
            curves,
        }
    }

    #[inline]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[inline]
    pub fn range(&self) -> FrameRange {
        self.range
    }

    pub fn curve(&self, property: AnimatableProperty) -> Option<&Curve> {
        self.curves.get(&property)
    }

    pub fn curve_mut(&mut self, property: AnimatableProperty) -> Option<&mut Curve> {
        self.curves.get_mut(&property)
    }

    /// Like `curve_mut` but reports the missing channel as an error.
    pub fn require_curve_mut(&mut self, property: AnimatableProperty) -> Result<&mut Curve> {
        self.curves
            .get_mut(&property)
            .ok_or(CurveError::MissingCurve { property })
    }

    pub fn curves(&self) -> impl Iterator<Item = &Curve> {
        self.curves.values()
    }

    /// Replace the keys of `property`, creating the curve if needed.
    pub fn set_curve(&mut self, property: AnimatableProperty, keys: Vec<Keyframe>) {
        let range = self.range;
        self.curves
            .entry(property)
            .or_insert_with(|| Curve::new(property, range))
            .set_keys(keys);
    }

    /// True when any curve carries at least one key.
    pub fn has_keys(&self) -> bool {
        self.curves.values().any(|c| !c.is_empty())
    }

    pub fn compute_cache(&mut self) {
        for curve in self.curves.values_mut() {
            curve.compute_cache();
        }
    }

    pub fn clear_cache(&mut self) {
        for curve in self.curves.values_mut() {
            curve.clear_cache();
        }
    }

    pub fn set_range(&mut self, range: FrameRange) {
        self.range = range;
        for curve in self.curves.values_mut() {
            curve.set_range(range);
        }
    }

    /// Cached value of a channel, or its rest value when unanimated.
    pub fn value(&self, property: AnimatableProperty, frame: i32) -> f32 {
        self.curves
            .get(&property)
            .and_then(|c| c.evaluate(frame))
            .unwrap_or_else(|| property.rest_value())
    }

    fn vector(&self, properties: [AnimatableProperty; 3], frame: i32) -> Vector3<f32> {
        Vector3::new(
            self.value(properties[0], frame),
            self.value(properties[1], frame),
            self.value(properties[2], frame),
        )
    }

    pub fn local_transform(&self, frame: i32) -> LocalTransform {
        LocalTransform {
            position: self.vector(AnimatableProperty::POSITION, frame),
            rotation: self.vector(AnimatableProperty::ROTATION, frame),
            scale: self.vector(AnimatableProperty::SCALE, frame),
        }
    }

    /// Local TRS matrix at `frame`.
    pub fn trs_matrix(&self, frame: i32) -> Matrix4<f32> {
        self.local_transform(frame).matrix()
    }

    /// Add a key, unwrapping rotation values against the previous key so the
    /// curve never jumps by a full turn.
    pub fn add_filtered_key(&mut self, property: AnimatableProperty, mut key: Keyframe) -> Result<usize> {
        let curve = self.require_curve_mut(property)?;
        if property.is_rotation() {
            if let Some(previous) = curve.previous_key(key.frame) {
                key.value = previous.value + delta_angle(previous.value, key.value);
            }
        }
        Ok(curve.add_key(key, false))
    }
}

/// Compose `parent * set_0(frame) * set_1(frame) * ...`, root first.
pub fn chain_matrix<'a, I>(parent: &Matrix4<f32>, sets: I, frame: i32) -> Matrix4<f32>
where
    I: IntoIterator<Item = &'a AnimationSet>,
{
    sets.into_iter()
        .fold(*parent, |acc, set| acc * set.trs_matrix(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn range() -> FrameRange {
        FrameRange::new(1, 10).unwrap()
    }

    #[test]
    fn empty_set_is_identity() {
        let set = AnimationSet::transform(range());
        assert_relative_eq!(set.trs_matrix(5), Matrix4::identity());
    }

    #[test]
    fn filtered_rotation_unwraps() {
        let mut set = AnimationSet::transform(range());
        set.add_filtered_key(AnimatableProperty::RotationY, Keyframe::new(1, 170.0))
            .unwrap();
        set.add_filtered_key(AnimatableProperty::RotationY, Keyframe::new(5, -170.0))
            .unwrap();
        let curve = set.curve(AnimatableProperty::RotationY).unwrap();
        assert_relative_eq!(curve.keys()[1].value, 190.0);
    }

    #[test]
    fn light_has_no_scale_curve() {
        let mut set = AnimationSet::new(EntityKind::Light, range());
        let err = set
            .add_filtered_key(AnimatableProperty::ScaleX, Keyframe::new(1, 2.0))
            .unwrap_err();
        assert_eq!(
            err,
            CurveError::MissingCurve {
                property: AnimatableProperty::ScaleX
            }
        );
        assert_eq!(set.value(AnimatableProperty::ScaleX, 3), 1.0);
    }

    #[test]
    fn data_round_trip_is_sorted() {
        let mut set = AnimationSet::transform(range());
        set.set_curve(AnimatableProperty::PositionZ, vec![Keyframe::new(2, 1.0)]);
        let data = set.to_data();
        assert_eq!(data.curves.len(), 9);
        assert_eq!(data.curves[0].property, AnimatableProperty::PositionX);
        let back = AnimationSet::from_data(data, range());
        assert_eq!(back.value(AnimatableProperty::PositionZ, 7), 1.0);
    }
}
