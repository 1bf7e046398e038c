use nalgebra::{DMatrix, DVector};

use crate::types::{ExecutionStrategy, UpdateMessage};

// ---------------------------------------------------------------------------
// Updatable
// ---------------------------------------------------------------------------

/// A component that accepts live updates from the controller loop.
///
/// Every subordinate of the controller implements this explicitly; a
/// component ignores messages it has no use for.
pub trait Updatable {
    /// Apply one update. Returns `true` if the component consumed it.
    fn apply_update(&mut self, update: &UpdateMessage) -> bool;
}

// ---------------------------------------------------------------------------
// PlantModel
// ---------------------------------------------------------------------------

/// Continuous-time plant dynamics `ẋ = f(x, u)` and their Jacobian.
///
/// The Jacobian has shape `(nx, nx + nu)`: the first `nx` columns are
/// `∂f/∂x`, the trailing `nu` columns `∂f/∂u`.
pub trait PlantModel: Send + Sync + 'static {
    fn state_dim(&self) -> usize;

    fn action_dim(&self) -> usize;

    /// Evaluate `f(x, u)`.
    fn derivative(&self, state: &DVector<f64>, action: &DVector<f64>) -> DVector<f64>;

    /// Evaluate `[∂f/∂x, ∂f/∂u]` at `(x, u)`.
    fn jacobian(&self, state: &DVector<f64>, action: &DVector<f64>) -> DMatrix<f64>;

    /// Human-readable name for this plant.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

// ---------------------------------------------------------------------------
// CostFunction
// ---------------------------------------------------------------------------

/// Scores states and actions against the live reference.
pub trait CostFunction: Updatable + Send {
    /// Bind horizon, timestep and execution strategy.
    fn configure(&mut self, horizon: usize, dt: f64, strategy: ExecutionStrategy);

    /// Cost of a single `(state, action)` pair against the first reference point.
    fn stage_cost(&self, state: &DVector<f64>, action: &DVector<f64>) -> f64;

    /// Cost of a predicted trajectory. `states[k]` is paired with
    /// `actions[k]`; surplus entries on either side are ignored.
    fn trajectory_cost(&self, states: &[DVector<f64>], actions: &[DVector<f64>]) -> f64;

    /// Human-readable name for this cost function.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// TrajectoryReference
// ---------------------------------------------------------------------------

/// Produces the reference vector for the horizon at a given time.
pub trait TrajectoryReference: Send {
    /// Reference values for horizon steps `0..horizon()` starting at `time`.
    fn step(&mut self, time: f64) -> DVector<f64>;

    fn horizon(&self) -> usize;
}
