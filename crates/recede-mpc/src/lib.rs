//! Linear-quadratic horizon QP for receding-horizon control.
//!
//! Every control tick:
//!
//! 1. **Linearize** the plant at the measured state with zero action
//! 2. **Discretize** the Jacobian with the control timestep
//! 3. **Assemble** the multistage QP, reusing cached structure
//! 4. **Solve** through a [`QpSolver`] (Clarabel by default)
//!
//! Only the first-stage action is applied; the problem is re-solved next tick.

pub mod discretize;
pub mod horizon;
pub mod optimizer;
pub mod solver;
pub mod types;

pub use discretize::{discretize, discretize_euler, discretize_matrix_exp};
pub use horizon::HorizonAssembler;
pub use optimizer::{LqrOptimizer, Optimizer};
pub use solver::{ClarabelSolver, QpMatrices, QpSolver, SolverOutput, SolverSettings};
pub use types::{
    ControlProblem, HorizonProblem, LinearizationSample, StageBlock, StructuralSignature,
};
