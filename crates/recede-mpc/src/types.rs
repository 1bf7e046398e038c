//! Core types for the horizon QP.
//!
//! Each stage `i = 0..N` owns the stacked vector `z_i = [u_i, x_{i+1}]`
//! (action first, then the state it produces). Stage `i` carries the dynamics
//! row `B u_i - x_{i+1} + A x_i = 0`, split between its own intra-stage
//! matrix `D = [B, -I]` and the previous stage's coupling `C = [0, A]`. The
//! first stage has no predecessor, so `A x_0` moves to its right-hand side.

use nalgebra::{DMatrix, DVector};
use recede_core::config::LqrConfig;
use recede_core::error::{ConfigError, ControlError};
use recede_core::types::ActionBounds;

// ---------------------------------------------------------------------------
// ControlProblem
// ---------------------------------------------------------------------------

/// Dimensions, weights and bounds of the horizon problem.
///
/// Shapes are fixed once built. Only the scalar weights and the action
/// magnitude can change afterwards, and every setter re-validates.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlProblem {
    horizon: usize,
    state_dim: usize,
    action_dim: usize,
    state_weight: f64,
    action_weight: f64,
    action_bounds: ActionBounds,
    state_bound: f64,
}

impl ControlProblem {
    /// Build from an optimizer table and the plant dimensions.
    pub fn from_config(
        config: &LqrConfig,
        state_dim: usize,
        action_dim: usize,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if state_dim == 0 || action_dim == 0 {
            return Err(ConfigError::invalid(
                "dimensions",
                format!("nx = {state_dim}, nu = {action_dim} (both must be >= 1)"),
            ));
        }
        Ok(Self {
            horizon: config.mpc_horizon,
            state_dim,
            action_dim,
            state_weight: config.state_weight,
            action_weight: config.action_weight,
            action_bounds: ActionBounds::symmetric(config.action_max)?,
            state_bound: config.state_bound,
        })
    }

    pub const fn horizon(&self) -> usize {
        self.horizon
    }

    pub const fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub const fn action_dim(&self) -> usize {
        self.action_dim
    }

    /// Length of one stage vector `[u, x]`.
    pub const fn stage_dim(&self) -> usize {
        self.state_dim + self.action_dim
    }

    pub const fn state_weight(&self) -> f64 {
        self.state_weight
    }

    pub const fn action_weight(&self) -> f64 {
        self.action_weight
    }

    pub const fn action_bounds(&self) -> ActionBounds {
        self.action_bounds
    }

    pub const fn state_bound(&self) -> f64 {
        self.state_bound
    }

    /// Set `P`. Must be finite and `>= 0`.
    pub fn set_state_weight(&mut self, value: f64) -> Result<(), ConfigError> {
        if !(value.is_finite() && value >= 0.0) {
            return Err(ConfigError::invalid("P", format!("{value} (must be >= 0)")));
        }
        self.state_weight = value;
        Ok(())
    }

    /// Set `R`. Must be finite and `> 0`.
    pub fn set_action_weight(&mut self, value: f64) -> Result<(), ConfigError> {
        if !(value.is_finite() && value > 0.0) {
            return Err(ConfigError::invalid("R", format!("{value} (must be > 0)")));
        }
        self.action_weight = value;
        Ok(())
    }

    /// Set the symmetric action bound `[-value, value]`.
    pub fn set_action_max(&mut self, value: f64) -> Result<(), ConfigError> {
        self.action_bounds = ActionBounds::symmetric(value)?;
        Ok(())
    }

    /// `blockdiag(R I(nu), P I(nx))`, shared by every stage including the last.
    pub fn stage_hessian(&self) -> DMatrix<f64> {
        let nu = self.action_dim;
        DMatrix::from_fn(self.stage_dim(), self.stage_dim(), |i, j| match (i == j, i < nu) {
            (true, true) => self.action_weight,
            (true, false) => self.state_weight,
            (false, _) => 0.0,
        })
    }

    /// Lower bounds over `[u, x]`.
    pub fn stage_lower(&self) -> DVector<f64> {
        let low = self.action_bounds.low();
        let bound = self.state_bound;
        let nu = self.action_dim;
        DVector::from_fn(self.stage_dim(), |i, _| if i < nu { low } else { -bound })
    }

    /// Upper bounds over `[u, x]`.
    pub fn stage_upper(&self) -> DVector<f64> {
        let high = self.action_bounds.high();
        let bound = self.state_bound;
        let nu = self.action_dim;
        DVector::from_fn(self.stage_dim(), |i, _| if i < nu { high } else { bound })
    }

    pub const fn signature(&self) -> StructuralSignature {
        StructuralSignature {
            horizon: self.horizon,
            state_dim: self.state_dim,
            action_dim: self.action_dim,
            lower_len: self.stage_dim(),
            upper_len: self.stage_dim(),
        }
    }
}

// ---------------------------------------------------------------------------
// StructuralSignature
// ---------------------------------------------------------------------------

/// Everything that fixes the sparsity layout of the QP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructuralSignature {
    pub horizon: usize,
    pub state_dim: usize,
    pub action_dim: usize,
    pub lower_len: usize,
    pub upper_len: usize,
}

impl StructuralSignature {
    pub const fn stage_dim(&self) -> usize {
        self.state_dim + self.action_dim
    }

    /// Total number of decision variables.
    pub const fn num_variables(&self) -> usize {
        self.horizon * self.stage_dim()
    }

    /// Dynamics rows, one block of `nx` per stage.
    pub const fn num_equalities(&self) -> usize {
        self.horizon * self.state_dim
    }

    /// Box rows, upper then lower per stage.
    pub const fn num_inequalities(&self) -> usize {
        self.horizon * (self.lower_len + self.upper_len)
    }
}

// ---------------------------------------------------------------------------
// LinearizationSample
// ---------------------------------------------------------------------------

/// Discrete `(A, B)` for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearizationSample {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
}

impl LinearizationSample {
    /// Split a `(nx, nx + nu)` Jacobian into `(A, B)`.
    pub fn from_jacobian(
        jacobian: &DMatrix<f64>,
        state_dim: usize,
        action_dim: usize,
    ) -> Result<Self, ControlError> {
        let expected = (state_dim, state_dim + action_dim);
        if jacobian.shape() != expected {
            return Err(ControlError::JacobianShape {
                expected,
                got: jacobian.shape(),
            });
        }
        if jacobian.iter().any(|v| !v.is_finite()) {
            return Err(ControlError::NonFinite);
        }
        Ok(Self {
            a: jacobian.columns(0, state_dim).clone_owned(),
            b: jacobian.columns(state_dim, action_dim).clone_owned(),
        })
    }

    pub fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    pub fn action_dim(&self) -> usize {
        self.b.ncols()
    }

    /// `C = [0, A]`, the coupling from one stage into the next.
    pub fn coupling(&self) -> DMatrix<f64> {
        let (nx, nu) = (self.state_dim(), self.action_dim());
        let mut c = DMatrix::zeros(nx, nu + nx);
        c.view_mut((0, nu), (nx, nx)).copy_from(&self.a);
        c
    }

    /// `D = [B, -I]`, the intra-stage dynamics matrix.
    pub fn intra_stage(&self) -> DMatrix<f64> {
        let (nx, nu) = (self.state_dim(), self.action_dim());
        let mut d = DMatrix::zeros(nx, nu + nx);
        d.view_mut((0, 0), (nx, nu)).copy_from(&self.b);
        d.view_mut((0, nu), (nx, nx))
            .copy_from(&(-DMatrix::<f64>::identity(nx, nx)));
        d
    }
}

// ---------------------------------------------------------------------------
// StageBlock / HorizonProblem
// ---------------------------------------------------------------------------

/// One stage of the multistage QP.
#[derive(Debug, Clone, PartialEq)]
pub struct StageBlock {
    /// Quadratic term over `[u, x]`.
    pub hessian: DMatrix<f64>,
    /// Linear term over `[u, x]` (zero for pure regulation).
    pub linear: DVector<f64>,
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
    /// `D = [B, -I]`.
    pub intra: DMatrix<f64>,
    /// `C = [0, A]` into the next stage; `None` on the last stage.
    pub coupling_to_next: Option<DMatrix<f64>>,
    /// Right-hand side of this stage's dynamics rows.
    pub rhs: DVector<f64>,
}

/// The full problem handed to a [`QpSolver`](crate::solver::QpSolver).
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonProblem {
    pub(crate) signature: StructuralSignature,
    pub(crate) stages: Vec<StageBlock>,
    pub(crate) linearization: LinearizationSample,
}

impl HorizonProblem {
    pub fn stages(&self) -> &[StageBlock] {
        &self.stages
    }

    pub const fn signature(&self) -> StructuralSignature {
        self.signature
    }

    pub const fn linearization(&self) -> &LinearizationSample {
        &self.linearization
    }

    /// `-A x0`, the right-hand side of the first stage.
    pub fn first_rhs(&self) -> &DVector<f64> {
        &self.stages[0].rhs
    }

    pub const fn num_variables(&self) -> usize {
        self.signature.num_variables()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem() -> ControlProblem {
        ControlProblem::from_config(&LqrConfig::default(), 2, 1).unwrap()
    }

    #[test]
    fn stage_hessian_is_block_diagonal() {
        let h = problem().stage_hessian();
        assert_eq!(
            h,
            DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 5.0])
        );
    }

    #[test]
    fn stage_bounds_action_first() {
        let p = problem();
        assert_eq!(p.stage_lower().as_slice(), &[-1.0, -100.0, -100.0]);
        assert_eq!(p.stage_upper().as_slice(), &[1.0, 100.0, 100.0]);
    }

    #[test]
    fn setters_validate() {
        let mut p = problem();
        assert!(p.set_action_weight(0.0).is_err());
        assert!(p.set_state_weight(-1.0).is_err());
        assert!(p.set_state_weight(f64::NAN).is_err());
        assert!(p.set_action_max(-2.0).is_err());
        assert_eq!(p, problem());

        p.set_state_weight(7.0).unwrap();
        p.set_action_max(2.0).unwrap();
        assert!((p.state_weight() - 7.0).abs() < f64::EPSILON);
        assert!((p.action_bounds().low() + 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(ControlProblem::from_config(&LqrConfig::default(), 0, 1).is_err());
        assert!(ControlProblem::from_config(&LqrConfig::default(), 2, 0).is_err());
    }

    #[test]
    fn signature_counts() {
        let sig = problem().signature();
        assert_eq!(sig.num_variables(), 30);
        assert_eq!(sig.num_equalities(), 20);
        assert_eq!(sig.num_inequalities(), 60);
    }

    #[test]
    fn linearization_split_and_blocks() {
        let jac = DMatrix::from_row_slice(2, 3, &[0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let lin = LinearizationSample::from_jacobian(&jac, 2, 1).unwrap();
        assert_eq!(lin.a, DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]));
        assert_eq!(lin.b, DMatrix::from_row_slice(2, 1, &[0.0, 1.0]));
        assert_eq!(
            lin.intra_stage(),
            DMatrix::from_row_slice(2, 3, &[0.0, -1.0, 0.0, 1.0, 0.0, -1.0])
        );
        assert_eq!(
            lin.coupling(),
            DMatrix::from_row_slice(2, 3, &[0.0, 0.0, 1.0, 0.0, 0.0, 0.0])
        );
    }

    #[test]
    fn linearization_rejects_bad_jacobian() {
        let err = LinearizationSample::from_jacobian(&DMatrix::zeros(2, 2), 2, 1).unwrap_err();
        assert_eq!(
            err,
            ControlError::JacobianShape {
                expected: (2, 3),
                got: (2, 2)
            }
        );

        let mut jac = DMatrix::zeros(2, 3);
        jac[(0, 0)] = f64::NAN;
        assert_eq!(
            LinearizationSample::from_jacobian(&jac, 2, 1).unwrap_err(),
            ControlError::NonFinite
        );
    }
}
