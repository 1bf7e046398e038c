//! Forward model used by the controller.
//!
//! Wraps a registered [`PlantModel`] and rolls it out with explicit Euler
//! steps. The optimizer borrows the same plant for its Jacobian.

use std::sync::Arc;

use nalgebra::DVector;
use recede_core::traits::{PlantModel, Updatable};
use recede_core::types::{ExecutionStrategy, UpdateMessage};

/// Named plant plus the rollout shape the optimizer asked for.
#[derive(Clone)]
pub struct Predictor {
    specification: String,
    plant: Arc<dyn PlantModel>,
    batch_size: usize,
    horizon: usize,
    dt: f64,
    strategy: ExecutionStrategy,
}

impl Predictor {
    pub fn new(specification: impl Into<String>, plant: Arc<dyn PlantModel>) -> Self {
        Self {
            specification: specification.into(),
            plant,
            batch_size: 1,
            horizon: 0,
            dt: 0.0,
            strategy: ExecutionStrategy::default(),
        }
    }

    /// Bind the rollout shape.
    pub fn configure(
        &mut self,
        batch_size: usize,
        horizon: usize,
        dt: f64,
        strategy: ExecutionStrategy,
    ) {
        self.batch_size = batch_size;
        self.horizon = horizon;
        self.dt = dt;
        self.strategy = strategy;
    }

    pub fn specification(&self) -> &str {
        &self.specification
    }

    /// Shared handle to the underlying plant.
    pub fn plant(&self) -> Arc<dyn PlantModel> {
        Arc::clone(&self.plant)
    }

    pub fn state_dim(&self) -> usize {
        self.plant.state_dim()
    }

    pub fn action_dim(&self) -> usize {
        self.plant.action_dim()
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub const fn horizon(&self) -> usize {
        self.horizon
    }

    pub const fn dt(&self) -> f64 {
        self.dt
    }

    pub const fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    /// Euler rollout from `state` under `actions`.
    ///
    /// Returns `actions.len() + 1` states, starting with `state` itself.
    pub fn predict(&self, state: &DVector<f64>, actions: &[DVector<f64>]) -> Vec<DVector<f64>> {
        let mut states = Vec::with_capacity(actions.len() + 1);
        states.push(state.clone());
        let mut x = state.clone();
        for u in actions {
            x += self.plant.derivative(&x, u) * self.dt;
            states.push(x.clone());
        }
        states
    }
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("specification", &self.specification)
            .field("plant", &self.plant.name())
            .field("batch_size", &self.batch_size)
            .field("horizon", &self.horizon)
            .field("dt", &self.dt)
            .finish_non_exhaustive()
    }
}

impl Updatable for Predictor {
    fn apply_update(&mut self, _update: &UpdateMessage) -> bool {
        false
    }
}
