//! Animated joint chains handed to the solvers.
//!
//! A `Rig` is the path from a root joint down to the edited end effector,
//! plus the world matrix of the root's parent. A free-standing object is a
//! one-joint rig.

use keyrig_curve_core::{
    chain_matrix, euler_to_quaternion, trs, AnimationSet, AnimationSetData, FrameRange, Pose,
};
use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::JointConstraints;
use crate::error::{Result, SolverError};

#[derive(Clone, Debug)]
pub struct RigJoint {
    pub name: String,
    pub animation: AnimationSet,
    pub constraints: JointConstraints,
}

impl RigJoint {
    pub fn new(name: impl Into<String>, animation: AnimationSet) -> Self {
        Self {
            name: name.into(),
            animation,
            constraints: JointConstraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: JointConstraints) -> Self {
        self.constraints = constraints;
        self
    }
}

#[derive(Clone, Debug)]
pub struct Rig {
    /// World matrix of the root joint's parent.
    pub parent: Matrix4<f32>,
    /// Root first, end effector last.
    pub joints: Vec<RigJoint>,
}

impl Rig {
    pub fn new(parent: Matrix4<f32>, joints: Vec<RigJoint>) -> Result<Self> {
        if joints.is_empty() {
            return Err(SolverError::EmptyRig);
        }
        Ok(Self { parent, joints })
    }

    /// A single animated object under `parent`.
    pub fn object(name: impl Into<String>, parent: Matrix4<f32>, animation: AnimationSet) -> Self {
        Self {
            parent,
            joints: vec![RigJoint::new(name, animation)],
        }
    }

    pub fn from_data(data: RigData, range: FrameRange) -> Result<Self> {
        let joints = data
            .joints
            .into_iter()
            .map(|j| RigJoint {
                name: j.name,
                animation: AnimationSet::from_data(j.animation, range),
                constraints: j.constraints,
            })
            .collect();
        Self::new(data.parent.matrix(), joints)
    }

    pub fn from_json(json: &str, range: FrameRange) -> Result<Self> {
        let data: RigData = serde_json::from_str(json)?;
        Self::from_data(data, range)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Index of the end effector.
    #[inline]
    pub fn effector_index(&self) -> usize {
        self.joints.len().saturating_sub(1)
    }

    /// Frame range of the root joint's curves.
    pub fn range(&self) -> Option<FrameRange> {
        self.joints.first().map(|j| j.animation.range())
    }

    /// World matrix of the frame that joint `index` is expressed in.
    pub fn parent_matrix_of(&self, index: usize, frame: i32) -> Matrix4<f32> {
        chain_matrix(
            &self.parent,
            self.joints.iter().take(index).map(|j| &j.animation),
            frame,
        )
    }

    /// World matrix of every joint at `frame`, root first.
    pub fn world_matrices(&self, frame: i32) -> Vec<Matrix4<f32>> {
        let mut acc = self.parent;
        self.joints
            .iter()
            .map(|j| {
                acc *= j.animation.trs_matrix(frame);
                acc
            })
            .collect()
    }

    pub fn effector_matrix(&self, frame: i32) -> Matrix4<f32> {
        chain_matrix(&self.parent, self.joints.iter().map(|j| &j.animation), frame)
    }

    pub fn effector_pose(&self, frame: i32) -> Pose {
        Pose::from_matrix(&self.effector_matrix(frame))
    }

    /// Copy of every joint's animation, used to restore or diff after a gesture.
    pub fn snapshot(&self) -> Vec<AnimationSet> {
        self.joints.iter().map(|j| j.animation.clone()).collect()
    }

    /// Put back animations taken with `snapshot`.
    pub fn restore(&mut self, snapshot: Vec<AnimationSet>) {
        for (joint, animation) in self.joints.iter_mut().zip(snapshot) {
            joint.animation = animation;
        }
    }
}

/// Static transform in a rig description (rotation in Euler degrees).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformData {
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for TransformData {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

impl TransformData {
    pub fn matrix(&self) -> Matrix4<f32> {
        trs(
            &Vector3::from(self.position),
            &euler_to_quaternion(&Vector3::from(self.rotation)),
            &Vector3::from(self.scale),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigJointData {
    pub name: String,
    #[serde(default)]
    pub constraints: JointConstraints,
    #[serde(default)]
    pub animation: AnimationSetData,
}

/// Serialized rig: parent transform plus joints root to effector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigData {
    #[serde(default)]
    pub parent: TransformData,
    pub joints: Vec<RigJointData>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use keyrig_curve_core::{AnimatableProperty, Keyframe};

    fn arm() -> Rig {
        let range = FrameRange::new(1, 10).unwrap();
        let mut root = AnimationSet::transform(range);
        root.set_curve(AnimatableProperty::RotationZ, vec![Keyframe::new(1, 90.0)]);
        let mut leaf = AnimationSet::transform(range);
        leaf.set_curve(AnimatableProperty::PositionX, vec![Keyframe::new(1, 2.0)]);
        Rig::new(
            Matrix4::new_translation(&Vector3::new(0.0, 0.0, 1.0)),
            vec![RigJoint::new("root", root), RigJoint::new("leaf", leaf)],
        )
        .unwrap()
    }

    #[test]
    fn empty_rig_is_rejected() {
        assert_eq!(
            Rig::new(Matrix4::identity(), Vec::new()).unwrap_err(),
            SolverError::EmptyRig
        );
    }

    #[test]
    fn effector_pose_composes_parent_and_joints() {
        let rig = arm();
        let pose = rig.effector_pose(5);
        assert_relative_eq!(pose.position, Vector3::new(0.0, 2.0, 1.0), epsilon = 1e-5);
        let worlds = rig.world_matrices(5);
        assert_eq!(worlds.len(), 2);
        assert_relative_eq!(worlds[1], rig.effector_matrix(5), epsilon = 1e-6);
        assert_relative_eq!(rig.parent_matrix_of(1, 5), worlds[0], epsilon = 1e-6);
    }

    #[test]
    fn restore_undoes_edits() {
        let mut rig = arm();
        let snapshot = rig.snapshot();
        rig.joints[1]
            .animation
            .set_curve(AnimatableProperty::PositionX, vec![Keyframe::new(1, 7.0)]);
        rig.restore(snapshot);
        assert_eq!(rig.joints[1].animation.value(AnimatableProperty::PositionX, 3), 2.0);
    }

    #[test]
    fn rig_from_json() {
        let json = r#"{
            "parent": {"position": [1.0, 0.0, 0.0]},
            "joints": [
                {"name": "root", "constraints": {"stiffness": 2.0},
                 "animation": {"curves": [{"property": "PositionY", "keys": [{"frame": 1, "value": 3.0}]}]}}
            ]
        }"#;
        let rig = Rig::from_json(json, FrameRange::new(1, 5).unwrap()).unwrap();
        assert_eq!(rig.joints[0].constraints.stiffness, 2.0);
        assert_relative_eq!(rig.effector_pose(2).position, Vector3::new(1.0, 3.0, 0.0));
    }
}
