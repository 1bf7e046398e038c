//! Quadratic tracking cost.

use nalgebra::DVector;
use recede_core::config::QuadraticCostConfig;
use recede_core::traits::{CostFunction, Updatable};
use recede_core::types::{ExecutionStrategy, UpdateMessage};
use tracing::warn;

/// `wp (x[k] - target)² + ws |x|² + wa |u|²`, with `target` taken from the
/// live reference.
#[derive(Debug, Clone)]
pub struct QuadraticCost {
    config: QuadraticCostConfig,
    reference: DVector<f64>,
    horizon: usize,
    dt: f64,
    strategy: ExecutionStrategy,
}

impl QuadraticCost {
    pub fn new(config: QuadraticCostConfig) -> Self {
        Self {
            config,
            reference: DVector::zeros(0),
            horizon: 0,
            dt: 0.0,
            strategy: ExecutionStrategy::default(),
        }
    }

    pub const fn config(&self) -> &QuadraticCostConfig {
        &self.config
    }

    pub const fn reference(&self) -> &DVector<f64> {
        &self.reference
    }

    pub const fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    pub const fn horizon(&self) -> usize {
        self.horizon
    }

    /// Timestep bound at configure time.
    pub const fn dt(&self) -> f64 {
        self.dt
    }

    fn cost_at(&self, state: &DVector<f64>, action: &DVector<f64>, target: f64) -> f64 {
        let c = &self.config;
        let tracking = state
            .get(c.tracked_state)
            .map_or(0.0, |x| (x - target).powi(2));
        c.position_weight * tracking
            + c.state_weight * state.norm_squared()
            + c.action_weight * action.norm_squared()
    }

    fn target(&self, k: usize) -> f64 {
        // Past the end of the reference, hold its last value.
        self.reference
            .get(k)
            .or_else(|| self.reference.as_slice().last())
            .copied()
            .unwrap_or(0.0)
    }
}

impl CostFunction for QuadraticCost {
    fn configure(&mut self, horizon: usize, dt: f64, strategy: ExecutionStrategy) {
        self.horizon = horizon;
        self.dt = dt;
        self.strategy = strategy;
        self.reference = DVector::zeros(horizon);
    }

    fn stage_cost(&self, state: &DVector<f64>, action: &DVector<f64>) -> f64 {
        self.cost_at(state, action, self.target(0))
    }

    fn trajectory_cost(&self, states: &[DVector<f64>], actions: &[DVector<f64>]) -> f64 {
        states
            .iter()
            .zip(actions)
            .enumerate()
            .map(|(k, (x, u))| self.cost_at(x, u, self.target(k)))
            .sum()
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "quadratic"
    }
}

impl Updatable for QuadraticCost {
    fn apply_update(&mut self, update: &UpdateMessage) -> bool {
        match update {
            UpdateMessage::Trajectory(reference) => {
                self.reference.clone_from(reference);
                true
            }
            UpdateMessage::ScalarParam { name, value } => {
                let mut next = self.config.clone();
                match name.as_str() {
                    "position_weight" => next.position_weight = *value,
                    "state_weight" => next.state_weight = *value,
                    "action_weight" => next.action_weight = *value,
                    _ => return false,
                }
                if let Err(e) = next.validate() {
                    warn!("quadratic cost: ignoring update {name} = {value}: {e}");
                    return false;
                }
                self.config = next;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cost() -> QuadraticCost {
        let mut c = QuadraticCost::new(QuadraticCostConfig {
            position_weight: 2.0,
            state_weight: 0.5,
            action_weight: 0.1,
            tracked_state: 0,
        });
        c.configure(3, 0.02, ExecutionStrategy::Sparse);
        c
    }

    #[test]
    fn stage_cost_tracks_first_reference_point() {
        let mut c = cost();
        c.apply_update(&UpdateMessage::Trajectory(DVector::from_vec(vec![1.0, 2.0, 3.0])));
        let x = DVector::from_vec(vec![0.5, 0.0]);
        let u = DVector::from_element(1, 1.0);
        // 2 * 0.25 + 0.5 * 0.25 + 0.1 * 1
        assert_relative_eq!(c.stage_cost(&x, &u), 0.725, epsilon = 1e-12);
    }

    #[test]
    fn trajectory_cost_pairs_states_and_actions() {
        let mut c = cost();
        c.apply_update(&UpdateMessage::Trajectory(DVector::from_vec(vec![0.0, 1.0])));
        let states = vec![DVector::zeros(1), DVector::zeros(1), DVector::zeros(1)];
        let actions = vec![DVector::zeros(1); 3];
        // Targets 0, 1, then held at 1.
        assert_relative_eq!(c.trajectory_cost(&states, &actions), 4.0, epsilon = 1e-12);
        assert_relative_eq!(c.trajectory_cost(&states[..1], &actions), 0.0);
    }

    #[test]
    fn out_of_range_tracked_state_drops_tracking_term() {
        let mut c = QuadraticCost::new(QuadraticCostConfig {
            tracked_state: 9,
            ..QuadraticCostConfig::default()
        });
        c.configure(1, 0.02, ExecutionStrategy::Dense);
        let x = DVector::from_vec(vec![1.0, 1.0]);
        assert_relative_eq!(c.stage_cost(&x, &DVector::zeros(1)), 0.0);
    }

    #[test]
    fn weight_updates_are_validated() {
        let mut c = cost();
        assert!(c.apply_update(&UpdateMessage::scalar("position_weight", 4.0)));
        assert!(!c.apply_update(&UpdateMessage::scalar("action_weight", -1.0)));
        assert!(!c.apply_update(&UpdateMessage::scalar("P", 7.0)));
        assert_relative_eq!(c.config().position_weight, 4.0);
        assert_relative_eq!(c.config().action_weight, 0.1);
    }
}
