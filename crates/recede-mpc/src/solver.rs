//! QP solver seam and the default Clarabel backend.
//!
//! # QP Formulation
//!
//! Decision variables: `z = [z_0, ..., z_{N-1}]`, `z_i = [u_i, x_{i+1}]`.
//!
//! Cost: `sum_i ½ z_iᵀ H_i z_i + f_iᵀ z_i`
//!
//! Subject to:
//! - Dynamics (equality, `nx` rows per stage): `D z_i + C z_{i-1} = c_i`
//! - Box bounds (inequality): `lb_i <= z_i <= ub_i`
//!
//! Clarabel wants `A z + s = b` with `s` in a cone, so equalities go into a
//! zero cone and the two box sides into a nonnegative cone as `z <= ub` and
//! `-z <= -lb`.

use std::time::Instant;

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{self, NonnegativeConeT, ZeroConeT},
};
use nalgebra::{DMatrix, DVector};
use recede_core::config::LqrConfig;
use recede_core::types::{ExecutionStrategy, SolverDiagnostics};

use crate::types::HorizonProblem;

/// Entries at or below this magnitude are left out of the sparse matrices.
const DROP_TOLERANCE: f64 = 1e-15;

// ---------------------------------------------------------------------------
// QpSolver
// ---------------------------------------------------------------------------

/// Result of one solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    /// Stacked stage vectors; empty when the solver produced nothing usable.
    pub solution: DVector<f64>,
    pub success: bool,
    pub diagnostics: SolverDiagnostics,
}

impl SolverOutput {
    /// A failed solve carrying only diagnostics.
    pub fn failed(diagnostics: SolverDiagnostics) -> Self {
        Self {
            solution: DVector::zeros(0),
            success: false,
            diagnostics,
        }
    }
}

/// Anything that can solve a [`HorizonProblem`].
///
/// The call blocks until the solver terminates.
pub trait QpSolver: Send {
    fn solve(&mut self, problem: &HorizonProblem) -> SolverOutput;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// QpMatrices
// ---------------------------------------------------------------------------

/// The horizon problem in Clarabel's standard form.
#[derive(Debug, Clone)]
pub struct QpMatrices {
    /// Upper triangle of the Hessian.
    pub p: CscMatrix<f64>,
    pub q: Vec<f64>,
    pub a: CscMatrix<f64>,
    pub b: Vec<f64>,
    pub n_eq: usize,
    pub n_ineq: usize,
}

impl QpMatrices {
    pub fn build(problem: &HorizonProblem, strategy: ExecutionStrategy) -> Self {
        match strategy {
            ExecutionStrategy::Dense => Self::dense(problem),
            ExecutionStrategy::Sparse => Self::sparse(problem),
        }
    }

    pub fn cones(&self) -> Vec<SupportedConeT<f64>> {
        vec![ZeroConeT(self.n_eq), NonnegativeConeT(self.n_ineq)]
    }

    /// Fill full dense matrices, then compress.
    pub fn dense(problem: &HorizonProblem) -> Self {
        let sig = problem.signature();
        let n = sig.stage_dim();
        let nx = sig.state_dim;
        let n_z = sig.num_variables();
        let n_eq = sig.num_equalities();
        let n_ineq = sig.num_inequalities();

        let mut p = DMatrix::zeros(n_z, n_z);
        let mut q = DVector::zeros(n_z);
        let mut a = DMatrix::zeros(n_eq + n_ineq, n_z);
        let mut b = DVector::zeros(n_eq + n_ineq);

        for (k, stage) in problem.stages().iter().enumerate() {
            let col = k * n;
            p.view_mut((col, col), (n, n)).copy_from(&stage.hessian);
            q.rows_mut(col, n).copy_from(&stage.linear);

            let row = k * nx;
            a.view_mut((row, col), (nx, n)).copy_from(&stage.intra);
            if k > 0 {
                if let Some(c) = &problem.stages()[k - 1].coupling_to_next {
                    a.view_mut((row, col - n), (nx, n)).copy_from(c);
                }
            }
            b.rows_mut(row, nx).copy_from(&stage.rhs);
        }

        // Inequalities: z_k <= ub_k, then -z_k <= -lb_k
        let mut row = n_eq;
        for (k, stage) in problem.stages().iter().enumerate() {
            let col = k * n;
            for i in 0..n {
                a[(row + i, col + i)] = 1.0;
                b[row + i] = stage.upper[i];
                a[(row + n + i, col + i)] = -1.0;
                b[row + n + i] = -stage.lower[i];
            }
            row += 2 * n;
        }

        Self {
            p: dmatrix_to_csc_upper_tri(&p),
            q: q.iter().copied().collect(),
            a: dmatrix_to_csc(&a),
            b: b.iter().copied().collect(),
            n_eq,
            n_ineq,
        }
    }

    /// Emit compressed-column matrices straight from the stage blocks.
    pub fn sparse(problem: &HorizonProblem) -> Self {
        let sig = problem.signature();
        let n = sig.stage_dim();
        let nx = sig.state_dim;
        let n_z = sig.num_variables();
        let n_eq = sig.num_equalities();
        let n_ineq = sig.num_inequalities();
        let stages = problem.stages();

        let mut p = CscBuilder::new(n_z, n_z);
        let mut a = CscBuilder::new(n_eq + n_ineq, n_z);
        let mut q = Vec::with_capacity(n_z);
        let mut b = vec![0.0; n_eq + n_ineq];

        for (k, stage) in stages.iter().enumerate() {
            let col0 = k * n;
            let row0 = k * nx;
            for j in 0..n {
                // Hessian block, upper triangle
                for i in 0..=j {
                    p.push(col0 + i, stage.hessian[(i, j)]);
                }
                p.finish_column();

                // Dynamics rows of this stage, then the coupling into the next
                for i in 0..nx {
                    a.push(row0 + i, stage.intra[(i, j)]);
                }
                if let Some(c) = &stage.coupling_to_next {
                    for i in 0..nx {
                        a.push(row0 + nx + i, c[(i, j)]);
                    }
                }
                let ineq = n_eq + 2 * k * n;
                a.push(ineq + j, 1.0);
                a.push(ineq + n + j, -1.0);
                a.finish_column();
            }

            q.extend(stage.linear.iter().copied());
            b[row0..row0 + nx].copy_from_slice(stage.rhs.as_slice());
            let ineq = n_eq + 2 * k * n;
            for i in 0..n {
                b[ineq + i] = stage.upper[i];
                b[ineq + n + i] = -stage.lower[i];
            }
        }

        Self {
            p: p.build(),
            q,
            a: a.build(),
            b,
            n_eq,
            n_ineq,
        }
    }
}

/// Column-major CSC accumulator; rows must be pushed in increasing order.
struct CscBuilder {
    nrows: usize,
    ncols: usize,
    colptr: Vec<usize>,
    rowval: Vec<usize>,
    nzval: Vec<f64>,
}

impl CscBuilder {
    fn new(nrows: usize, ncols: usize) -> Self {
        let mut colptr = Vec::with_capacity(ncols + 1);
        colptr.push(0);
        Self {
            nrows,
            ncols,
            colptr,
            rowval: Vec::new(),
            nzval: Vec::new(),
        }
    }

    fn push(&mut self, row: usize, value: f64) {
        if value.abs() > DROP_TOLERANCE {
            self.rowval.push(row);
            self.nzval.push(value);
        }
    }

    fn finish_column(&mut self) {
        self.colptr.push(self.rowval.len());
    }

    fn build(self) -> CscMatrix<f64> {
        debug_assert_eq!(self.colptr.len(), self.ncols + 1);
        CscMatrix::new(self.nrows, self.ncols, self.colptr, self.rowval, self.nzval)
    }
}

// ---------------------------------------------------------------------------
// ClarabelSolver
// ---------------------------------------------------------------------------

/// Termination settings forwarded to the QP backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub max_iter: u32,
    /// Used for the absolute and relative gap and the feasibility tolerance.
    pub tolerance: f64,
}

impl From<&LqrConfig> for SolverSettings {
    fn from(config: &LqrConfig) -> Self {
        Self {
            max_iter: config.max_iter,
            tolerance: config.tolerance,
        }
    }
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tolerance: 1e-8,
        }
    }
}

/// Default [`QpSolver`] backed by Clarabel.
#[derive(Debug, Clone)]
pub struct ClarabelSolver {
    settings: SolverSettings,
    strategy: ExecutionStrategy,
}

impl ClarabelSolver {
    pub const fn new(settings: SolverSettings, strategy: ExecutionStrategy) -> Self {
        Self { settings, strategy }
    }

    pub const fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub const fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }
}

impl QpSolver for ClarabelSolver {
    fn solve(&mut self, problem: &HorizonProblem) -> SolverOutput {
        let start = Instant::now();
        let qp = QpMatrices::build(problem, self.strategy);

        let settings = match DefaultSettingsBuilder::default()
            .max_iter(self.settings.max_iter)
            .verbose(false)
            .tol_gap_abs(self.settings.tolerance)
            .tol_gap_rel(self.settings.tolerance)
            .tol_feas(self.settings.tolerance)
            .build()
        {
            Ok(settings) => settings,
            Err(e) => {
                return SolverOutput::failed(SolverDiagnostics::not_started(format!(
                    "InvalidSettings: {e:?}"
                )));
            }
        };

        let cones = qp.cones();
        let mut solver = match DefaultSolver::new(&qp.p, &qp.q, &qp.a, &qp.b, &cones, settings) {
            Ok(solver) => solver,
            Err(e) => {
                return SolverOutput::failed(SolverDiagnostics::not_started(format!(
                    "SetupFailed: {e:?}"
                )));
            }
        };
        solver.solve();
        let sol = &solver.solution;

        let success = matches!(sol.status, SolverStatus::Solved | SolverStatus::AlmostSolved);
        let diagnostics = SolverDiagnostics {
            status: format!("{:?}", sol.status),
            iterations: sol.iterations,
            objective: sol.obj_val,
            solve_time_us: u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
        };

        SolverOutput {
            solution: if success {
                DVector::from_column_slice(&sol.x)
            } else {
                DVector::zeros(0)
            },
            success,
            diagnostics,
        }
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "clarabel"
    }
}

// ---------------------------------------------------------------------------
// Dense -> CSC helpers
// ---------------------------------------------------------------------------

fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut out = CscBuilder::new(nrows, ncols);
    for j in 0..ncols {
        for i in 0..nrows {
            out.push(i, m[(i, j)]);
        }
        out.finish_column();
    }
    out.build()
}

/// Upper triangle of a symmetric matrix.
fn dmatrix_to_csc_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut out = CscBuilder::new(nrows, ncols);
    for j in 0..ncols {
        for i in 0..=j.min(nrows.saturating_sub(1)) {
            out.push(i, m[(i, j)]);
        }
        out.finish_column();
    }
    out.build()
}
