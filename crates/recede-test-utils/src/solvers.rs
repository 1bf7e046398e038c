//! QP solver doubles.

use std::sync::{Arc, Mutex, PoisonError};

use nalgebra::DVector;
use recede_core::types::SolverDiagnostics;
use recede_mpc::{HorizonProblem, QpSolver, SolverOutput};

/// Diagnostics a failing [`StubSolver`] reports.
pub fn failure_diagnostics() -> SolverDiagnostics {
    SolverDiagnostics {
        status: "PrimalInfeasible".into(),
        iterations: 17,
        objective: 42.5,
        solve_time_us: 321,
    }
}

// ---------------------------------------------------------------------------
// StubSolver
// ---------------------------------------------------------------------------

/// A solver that never looks at the problem.
#[derive(Debug, Clone)]
pub struct StubSolver {
    output: SolverOutput,
}

impl StubSolver {
    /// Always fails with `diagnostics`.
    pub fn failing(diagnostics: SolverDiagnostics) -> Self {
        Self {
            output: SolverOutput::failed(diagnostics),
        }
    }

    /// Always succeeds with `solution`.
    pub fn succeeding(solution: DVector<f64>) -> Self {
        Self {
            output: SolverOutput {
                solution,
                success: true,
                diagnostics: SolverDiagnostics {
                    status: "Solved".into(),
                    iterations: 1,
                    objective: 0.0,
                    solve_time_us: 0,
                },
            },
        }
    }
}

impl QpSolver for StubSolver {
    fn solve(&mut self, _problem: &HorizonProblem) -> SolverOutput {
        self.output.clone()
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "stub"
    }
}

// ---------------------------------------------------------------------------
// RecordingSolver
// ---------------------------------------------------------------------------

/// Wraps another solver and keeps a copy of every problem it is handed.
///
/// Clones share the record, so a test can keep one handle while the
/// optimizer owns another.
#[derive(Clone)]
pub struct RecordingSolver<S> {
    inner: S,
    problems: Arc<Mutex<Vec<HorizonProblem>>>,
}

impl<S: QpSolver> RecordingSolver<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            problems: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every problem seen so far, oldest first.
    pub fn problems(&self) -> Vec<HorizonProblem> {
        self.problems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<HorizonProblem> {
        self.problems().pop()
    }

    pub fn count(&self) -> usize {
        self.problems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<S: QpSolver> QpSolver for RecordingSolver<S> {
    fn solve(&mut self, problem: &HorizonProblem) -> SolverOutput {
        self.problems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(problem.clone());
        self.inner.solve(problem)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use recede_core::config::LqrConfig;
    use recede_mpc::{ControlProblem, HorizonAssembler, LinearizationSample};

    fn problem() -> HorizonProblem {
        let cp = ControlProblem::from_config(&LqrConfig::default(), 2, 1).unwrap();
        let mut asm = HorizonAssembler::new(cp);
        let sample = LinearizationSample {
            a: DMatrix::identity(2, 2),
            b: DMatrix::zeros(2, 1),
        };
        asm.assemble(sample, &DVector::zeros(2)).clone()
    }

    #[test]
    fn recording_solver_shares_record_between_clones() {
        let recorder = RecordingSolver::new(StubSolver::failing(failure_diagnostics()));
        let mut handle = recorder.clone();
        let out = handle.solve(&problem());

        assert!(!out.success);
        assert_eq!(out.diagnostics, failure_diagnostics());
        assert_eq!(recorder.count(), 1);
        assert_eq!(recorder.last().unwrap().stages().len(), 10);
        assert_eq!(handle.name(), "stub");
    }
}
