//! MPC tick orchestration.
//!
//! [`MpcController`] owns the optimizer, cost function, predictor and
//! reference generator built from the [`Registry`], and drives them once per
//! control tick while hot-reloading scalar configuration.

pub mod controller;
pub mod cost;
pub mod predictor;
pub mod registry;
pub mod trajectory;

pub use controller::{ControllerPhase, DEFAULT_PLANT, MpcController};
pub use cost::QuadraticCost;
pub use predictor::Predictor;
pub use registry::{CostFactory, OptimizerFactory, PlantFactory, Registry, SolverFactory};
pub use trajectory::TrajectoryGenerator;
