//! Keyrig solver core
//!
//! Solvers that turn a dragged end-effector pose into keyframe edits:
//! - tangent retargeting reshapes the Bezier handles around the edited frame
//! - the pose solver keys joint rotations (and root position) at the frame
//! - a finite-difference Jacobian estimated on the rayon pool
//! - a pluggable box-constrained QP solver
//! - drag sessions for free objects and rigs

pub mod bounds;
pub mod config;
pub mod edit;
pub mod error;
pub mod jacobian;
pub mod manipulation;
pub mod objective;
pub mod phase;
pub mod pose;
pub mod qp;
pub mod rig;
pub mod tangent;

// Re-exports for editor front-ends
pub use bounds::{AngleLimits, CurveBounds, WindowKeys, TANGENT_PARAMS};
pub use config::{DifferenceScheme, JointConstraints, SolverConfig};
pub use edit::{diff_rig, KeyframeEdit};
pub use error::{QpError, Result, SolverError};
pub use jacobian::{estimate_jacobian, pose_delta, JacobianJob, PoseModel, POSE_DIM};
pub use manipulation::{CurveEditMode, ObjectDrag, RigDrag};
pub use phase::SolverPhase;
pub use pose::{from_to_rotation, PoseMode, PoseSolver};
pub use qp::{ActiveSetQp, BoxQpSolver};
pub use rig::{Rig, RigData, RigJoint, RigJointData, TransformData};
pub use tangent::{TangentSolver, TangentVariant};
