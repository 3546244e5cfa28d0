//! Animatable channels and the entity kinds that own them.

use serde::{Deserialize, Serialize};

/// One scalar channel of an animated entity. Rotations are Euler degrees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnimatableProperty {
    PositionX,
    PositionY,
    PositionZ,
    RotationX,
    RotationY,
    RotationZ,
    ScaleX,
    ScaleY,
    ScaleZ,
    Power,
    ColorR,
    ColorG,
    ColorB,
    CameraFocal,
    CameraFocus,
    CameraAperture,
}

impl AnimatableProperty {
    pub const POSITION: [Self; 3] = [Self::PositionX, Self::PositionY, Self::PositionZ];
    pub const ROTATION: [Self; 3] = [Self::RotationX, Self::RotationY, Self::RotationZ];
    pub const SCALE: [Self; 3] = [Self::ScaleX, Self::ScaleY, Self::ScaleZ];

    #[inline]
    pub const fn is_position(self) -> bool {
        matches!(self, Self::PositionX | Self::PositionY | Self::PositionZ)
    }

    #[inline]
    pub const fn is_rotation(self) -> bool {
        matches!(self, Self::RotationX | Self::RotationY | Self::RotationZ)
    }

    #[inline]
    pub const fn is_scale(self) -> bool {
        matches!(self, Self::ScaleX | Self::ScaleY | Self::ScaleZ)
    }

    /// Value used when an entity has no curve (or no key) for the channel.
    pub const fn rest_value(self) -> f32 {
        match self {
            Self::ScaleX | Self::ScaleY | Self::ScaleZ => 1.0,
            Self::ColorR | Self::ColorG | Self::ColorB => 1.0,
            _ => 0.0,
        }
    }

    /// Axis (0 = x, 1 = y, 2 = z) for spatial channels.
    pub const fn axis(self) -> Option<usize> {
        match self {
            Self::PositionX | Self::RotationX | Self::ScaleX => Some(0),
            Self::PositionY | Self::RotationY | Self::ScaleY => Some(1),
            Self::PositionZ | Self::RotationZ | Self::ScaleZ => Some(2),
            _ => None,
        }
    }
}

/// The kind of entity an animation set drives; decides which curves it owns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[default]
    Transform,
    Light,
    Camera,
}

impl EntityKind {
    pub fn properties(self) -> &'static [AnimatableProperty] {
        use AnimatableProperty::*;
        match self {
            Self::Transform => &[
                PositionX, PositionY, PositionZ, RotationX, RotationY, RotationZ, ScaleX, ScaleY,
                ScaleZ,
            ],
            Self::Light => &[
                PositionX, PositionY, PositionZ, RotationX, RotationY, RotationZ, Power, ColorR,
                ColorG, ColorB,
            ],
            Self::Camera => &[
                PositionX,
                PositionY,
                PositionZ,
                RotationX,
                RotationY,
                RotationZ,
                CameraFocal,
                CameraFocus,
                CameraAperture,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_position_and_rotation() {
        for kind in [EntityKind::Transform, EntityKind::Light, EntityKind::Camera] {
            let props = kind.properties();
            for p in AnimatableProperty::POSITION.iter().chain(&AnimatableProperty::ROTATION) {
                assert!(props.contains(p), "{kind:?} misses {p:?}");
            }
        }
        assert!(!EntityKind::Light.properties().contains(&AnimatableProperty::ScaleX));
    }

    #[test]
    fn rest_values() {
        assert_eq!(AnimatableProperty::ScaleY.rest_value(), 1.0);
        assert_eq!(AnimatableProperty::RotationZ.rest_value(), 0.0);
        assert_eq!(AnimatableProperty::RotationZ.axis(), Some(2));
        assert_eq!(AnimatableProperty::Power.axis(), None);
    }
}
