//! Box-constrained convex quadratic programs.
//!
//! Minimize `0.5 * x^T Q x + b^T x` subject to `lower <= x <= upper`.
//! Solvers plug in through `BoxQpSolver`; `ActiveSetQp` is the bundled one.

use nalgebra::{Cholesky, DMatrix, DVector};
use tracing::debug;

use crate::config::SolverConfig;
use crate::error::QpError;

pub trait BoxQpSolver: Send + Sync {
    /// Minimizer of the box-constrained problem. The result always lies
    /// inside the bounds.
    fn solve(
        &self,
        q: &DMatrix<f64>,
        b: &DVector<f64>,
        lower: &DVector<f64>,
        upper: &DVector<f64>,
    ) -> Result<DVector<f64>, QpError>;
}

/// Check shapes, finiteness and bound consistency.
pub fn validate_problem(
    q: &DMatrix<f64>,
    b: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
) -> Result<(), QpError> {
    let n = b.len();
    if q.nrows() != n || q.ncols() != n {
        return Err(QpError::DimensionMismatch {
            what: "Q",
            expected: n,
            actual: q.nrows().max(q.ncols()),
        });
    }
    for (what, v) in [("lower", lower), ("upper", upper)] {
        if v.len() != n {
            return Err(QpError::DimensionMismatch {
                what,
                expected: n,
                actual: v.len(),
            });
        }
    }
    if q.iter().any(|v| !v.is_finite()) {
        return Err(QpError::NonFinite { what: "Q" });
    }
    if b.iter().any(|v| !v.is_finite()) {
        return Err(QpError::NonFinite { what: "b" });
    }
    // infinite bounds are allowed, NaN is not
    if lower.iter().chain(upper.iter()).any(|v| v.is_nan()) {
        return Err(QpError::NonFinite { what: "bounds" });
    }
    for (index, (lo, hi)) in lower.iter().zip(upper.iter()).enumerate() {
        if lo > hi {
            return Err(QpError::InfeasibleBounds {
                index,
                lower: *lo,
                upper: *hi,
            });
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bound {
    Free,
    Lower,
    Upper,
}

/// Primal active-set method.
///
/// Starts from the origin projected onto the box, solves the free
/// subsystem with a Cholesky factorization, adds the first blocking bound
/// along each Newton step and releases the bound whose multiplier has the
/// wrong sign once the subspace minimum is reached.
#[derive(Clone, Debug)]
pub struct ActiveSetQp {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for ActiveSetQp {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-9,
        }
    }
}

impl ActiveSetQp {
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            max_iterations: config.qp_max_iterations,
            tolerance: config.qp_tolerance,
        }
    }
}

impl BoxQpSolver for ActiveSetQp {
    fn solve(
        &self,
        q: &DMatrix<f64>,
        b: &DVector<f64>,
        lower: &DVector<f64>,
        upper: &DVector<f64>,
    ) -> Result<DVector<f64>, QpError> {
        validate_problem(q, b, lower, upper)?;
        let n = b.len();
        if n == 0 {
            return Ok(DVector::zeros(0));
        }
        let mut x = DVector::from_fn(n, |i, _| 0.0f64.clamp(lower[i], upper[i]));
        let mut state: Vec<Bound> = (0..n)
            .map(|i| {
                if lower[i] == upper[i] {
                    Bound::Lower
                } else {
                    Bound::Free
                }
            })
            .collect();

        for iteration in 0..self.max_iterations {
            let free: Vec<usize> = (0..n).filter(|&i| state[i] == Bound::Free).collect();
            let gradient = q * &x + b;

            let mut step = DVector::zeros(n);
            if !free.is_empty() {
                let q_ff = DMatrix::from_fn(free.len(), free.len(), |r, c| q[(free[r], free[c])]);
                let rhs = DVector::from_fn(free.len(), |r, _| -gradient[free[r]]);
                let chol = Cholesky::new(q_ff).ok_or(QpError::NotPositiveDefinite)?;
                let p = chol.solve(&rhs);
                for (r, &i) in free.iter().enumerate() {
                    step[i] = p[r];
                }
            }

            if step.amax() > self.tolerance {
                // longest feasible fraction of the step, and who blocks it
                let mut alpha = 1.0f64;
                let mut blocking = None;
                for &i in &free {
                    let (limit, side) = if step[i] < 0.0 {
                        ((lower[i] - x[i]) / step[i], Bound::Lower)
                    } else if step[i] > 0.0 {
                        ((upper[i] - x[i]) / step[i], Bound::Upper)
                    } else {
                        continue;
                    };
                    if limit < alpha {
                        alpha = limit.max(0.0);
                        blocking = Some((i, side));
                    }
                }
                x.axpy(alpha, &step, 1.0);
                if let Some((i, side)) = blocking {
                    x[i] = if side == Bound::Lower { lower[i] } else { upper[i] };
                    state[i] = side;
                }
                continue;
            }

            // subspace minimum: check multipliers of active bounds
            let gradient = q * &x + b;
            let mut worst: Option<(usize, f64)> = None;
            for i in 0..n {
                let violation = match state[i] {
                    Bound::Lower if lower[i] < upper[i] => -gradient[i],
                    Bound::Upper => gradient[i],
                    _ => continue,
                };
                if violation > self.tolerance && worst.map_or(true, |(_, v)| violation > v) {
                    worst = Some((i, violation));
                }
            }
            match worst {
                Some((i, _)) => state[i] = Bound::Free,
                None => {
                    debug!(iterations = iteration + 1, size = n, "active-set QP converged");
                    return Ok(clamp_to_box(x, lower, upper));
                }
            }
        }

        debug!(
            iterations = self.max_iterations,
            size = n,
            "active-set QP hit its iteration cap"
        );
        Ok(clamp_to_box(x, lower, upper))
    }
}

fn clamp_to_box(mut x: DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>) -> DVector<f64> {
    for i in 0..x.len() {
        x[i] = x[i].clamp(lower[i], upper[i]);
    }
    x
}
