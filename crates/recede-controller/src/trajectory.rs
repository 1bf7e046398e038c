//! Target-position reference over the prediction horizon.

use std::f64::consts::TAU;

use nalgebra::DVector;
use recede_core::config::{TrajectoryConfig, TrajectoryKind};
use recede_core::traits::{TrajectoryReference, Updatable};
use recede_core::types::UpdateMessage;
use tracing::warn;

/// Samples a [`TrajectoryConfig`] at `time + k dt` for `k = 0..horizon`.
#[derive(Debug, Clone)]
pub struct TrajectoryGenerator {
    config: TrajectoryConfig,
    horizon: usize,
    dt: f64,
}

impl TrajectoryGenerator {
    pub const fn new(config: TrajectoryConfig, horizon: usize, dt: f64) -> Self {
        Self {
            config,
            horizon,
            dt,
        }
    }

    pub const fn config(&self) -> &TrajectoryConfig {
        &self.config
    }

    /// Reference value at a single instant.
    pub fn sample(&self, time: f64) -> f64 {
        let c = &self.config;
        match c.kind {
            TrajectoryKind::Constant => c.offset,
            TrajectoryKind::Sine => c.offset + c.amplitude * (TAU * time / c.period).sin(),
            TrajectoryKind::Square => {
                let phase = (time / c.period).rem_euclid(1.0);
                if phase < 0.5 {
                    c.offset + c.amplitude
                } else {
                    c.offset - c.amplitude
                }
            }
        }
    }
}

impl TrajectoryReference for TrajectoryGenerator {
    #[allow(clippy::cast_precision_loss)]
    fn step(&mut self, time: f64) -> DVector<f64> {
        DVector::from_fn(self.horizon, |k, _| self.sample(time + k as f64 * self.dt))
    }

    fn horizon(&self) -> usize {
        self.horizon
    }
}

impl Updatable for TrajectoryGenerator {
    fn apply_update(&mut self, update: &UpdateMessage) -> bool {
        let UpdateMessage::ScalarParam { name, value } = update else {
            return false;
        };
        let mut next = self.config.clone();
        match name.as_str() {
            "amplitude" => next.amplitude = *value,
            "period" => next.period = *value,
            "offset" => next.offset = *value,
            _ => return false,
        }
        if let Err(e) = next.validate() {
            warn!("trajectory: ignoring update {name} = {value}: {e}");
            return false;
        }
        self.config = next;
        true
    }
}
