//! Quadratic objective shared by the tangent and pose solvers.
//!
//! For a step `d` on the parameters, the solvers minimize
//!
//! ```text
//! w_t * |J d - ds|^2 + w_s * d^T D d + w_c * (theta0 + d)^T T (theta0 + d)
//! ```
//!
//! which expands to `0.5 d^T Q d + b^T d` with
//! `Q = 2 w_t J^T J + 2 w_s D + 2 w_c T + eps I` and
//! `b = -2 w_t J^T ds + 2 w_c T theta0`.

use nalgebra::{DMatrix, DVector};

use crate::error::QpError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObjectiveWeights {
    pub target: f64,
    pub stiffness: f64,
    pub continuity: f64,
    pub regularization: f64,
}

/// Smoothness penalty `(theta0 + d)^T T (theta0 + d)`.
#[derive(Clone, Debug)]
pub struct ContinuityTerm<'a> {
    pub matrix: &'a DMatrix<f64>,
    pub theta0: &'a DVector<f64>,
}

/// Build `(Q, b)` for a step of `stiffness.len()` parameters.
pub fn assemble(
    jacobian: &DMatrix<f64>,
    delta: &DVector<f64>,
    stiffness: &[f64],
    continuity: Option<ContinuityTerm<'_>>,
    weights: &ObjectiveWeights,
) -> Result<(DMatrix<f64>, DVector<f64>), QpError> {
    let n = stiffness.len();
    if jacobian.ncols() != n {
        return Err(QpError::DimensionMismatch {
            what: "jacobian columns",
            expected: n,
            actual: jacobian.ncols(),
        });
    }
    if jacobian.nrows() != delta.len() {
        return Err(QpError::DimensionMismatch {
            what: "pose delta",
            expected: jacobian.nrows(),
            actual: delta.len(),
        });
    }

    let jt = jacobian.transpose();
    let mut q = (&jt * jacobian) * (2.0 * weights.target);
    let mut b = (&jt * delta) * (-2.0 * weights.target);

    for (i, d) in stiffness.iter().enumerate() {
        q[(i, i)] += 2.0 * weights.stiffness * d + weights.regularization;
    }

    if let Some(term) = continuity {
        if term.matrix.nrows() != n || term.matrix.ncols() != n {
            return Err(QpError::DimensionMismatch {
                what: "continuity matrix",
                expected: n,
                actual: term.matrix.nrows().max(term.matrix.ncols()),
            });
        }
        if term.theta0.len() != n {
            return Err(QpError::DimensionMismatch {
                what: "theta0",
                expected: n,
                actual: term.theta0.len(),
            });
        }
        q += term.matrix * (2.0 * weights.continuity);
        b += (term.matrix * term.theta0) * (2.0 * weights.continuity);
    }
    Ok((q, b))
}
