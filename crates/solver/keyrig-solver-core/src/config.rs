//! Solver tuning and per-joint constraints.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

/// Finite-difference scheme used by the Jacobian estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DifferenceScheme {
    Forward,
    #[default]
    Central,
}

/// Weights, step sizes and limits shared by the tangent and pose solvers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Weight of the target-pose term for rig solves.
    pub target_weight: f64,
    /// Weight of the target-pose term for single-object tangent solves.
    pub object_target_weight: f64,
    pub stiffness_weight: f64,
    pub continuity_weight: f64,
    /// Added to the QP diagonal.
    pub regularization: f64,

    /// Finite-difference step on tangent handles (frames / value units).
    pub tangent_step: f64,
    /// Finite-difference step on joint rotations, degrees.
    pub rotation_step_degrees: f64,
    /// Finite-difference step on root translation.
    pub translation_step: f64,
    pub difference_scheme: DifferenceScheme,

    /// Box on tangent y-handle deltas for channels without angle limits.
    pub tangent_box: f64,
    /// Box on root translation deltas in pose solves.
    pub root_translation_limit: f64,

    pub qp_max_iterations: usize,
    pub qp_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            target_weight: 20.0,
            object_target_weight: 100.0,
            stiffness_weight: 50.0,
            continuity_weight: 1.0,
            regularization: 1e-6,
            tangent_step: 1.0,
            rotation_step_degrees: 1.0,
            translation_step: 0.1,
            difference_scheme: DifferenceScheme::Central,
            tangent_box: 10.0,
            root_translation_limit: 10.0,
            qp_max_iterations: 200,
            qp_tolerance: 1e-9,
        }
    }
}

impl SolverConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject negative or non-finite weights and non-positive steps.
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("target_weight", self.target_weight),
            ("object_target_weight", self.object_target_weight),
            ("stiffness_weight", self.stiffness_weight),
            ("continuity_weight", self.continuity_weight),
            ("regularization", self.regularization),
            ("tangent_box", self.tangent_box),
            ("root_translation_limit", self.root_translation_limit),
            ("qp_tolerance", self.qp_tolerance),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SolverError::InvalidConfig {
                    reason: format!("{name} must be finite and >= 0, got {value}"),
                });
            }
        }
        let steps = [
            ("tangent_step", self.tangent_step),
            ("rotation_step_degrees", self.rotation_step_degrees),
            ("translation_step", self.translation_step),
        ];
        for (name, value) in steps {
            if !value.is_finite() || value <= 0.0 {
                return Err(SolverError::InvalidConfig {
                    reason: format!("{name} must be finite and > 0, got {value}"),
                });
            }
        }
        if self.qp_max_iterations == 0 {
            return Err(SolverError::InvalidConfig {
                reason: "qp_max_iterations must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Stiffness and local Euler limits (degrees) of one joint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointConstraints {
    pub stiffness: f32,
    pub lower_angle_bound: [f32; 3],
    pub upper_angle_bound: [f32; 3],
}

impl Default for JointConstraints {
    fn default() -> Self {
        Self {
            stiffness: 1.0,
            lower_angle_bound: [-180.0; 3],
            upper_angle_bound: [180.0; 3],
        }
    }
}

impl JointConstraints {
    pub fn with_stiffness(mut self, stiffness: f32) -> Self {
        self.stiffness = stiffness;
        self
    }

    pub fn with_limits(mut self, lower: [f32; 3], upper: [f32; 3]) -> Self {
        self.lower_angle_bound = lower;
        self.upper_angle_bound = upper;
        self
    }
}
