//! Solver session lifecycle.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

/// Where a solver session stands. Each `next_step` call advances one phase:
/// `Setup -> Compute -> Apply -> Done`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverPhase {
    #[default]
    Setup,
    Compute,
    Apply,
    Done,
}

impl SolverPhase {
    #[inline]
    pub fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Fail with `InvalidPhase` unless the session is in `expected`.
pub(crate) fn expect_phase(actual: SolverPhase, expected: SolverPhase) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(SolverError::InvalidPhase { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_check_reports_both_phases() {
        assert!(expect_phase(SolverPhase::Compute, SolverPhase::Compute).is_ok());
        assert_eq!(
            expect_phase(SolverPhase::Done, SolverPhase::Apply),
            Err(SolverError::InvalidPhase {
                expected: SolverPhase::Apply,
                actual: SolverPhase::Done,
            })
        );
    }
}
