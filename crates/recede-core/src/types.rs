//! Value types shared across the controller, optimizer and reload crates.

use std::collections::BTreeMap;
use std::fmt;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// UpdateMessage
// ---------------------------------------------------------------------------

/// A single live update pushed to every subordinate component of the
/// controller.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateMessage {
    /// New reference trajectory for the horizon (target positions).
    Trajectory(DVector<f64>),
    /// Override of a named scalar parameter, e.g. `P = 7.0`.
    ScalarParam { name: String, value: f64 },
}

impl UpdateMessage {
    /// Convenience constructor for [`UpdateMessage::ScalarParam`].
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self::ScalarParam {
            name: name.into(),
            value,
        }
    }
}

// ---------------------------------------------------------------------------
// UpdateSet
// ---------------------------------------------------------------------------

/// The merged set of updates applied during one tick.
///
/// The trajectory lives in its own slot so it can never collide with a
/// scalar key. Scalars are kept sorted by name so dispatch order is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSet {
    trajectory: Option<DVector<f64>>,
    scalars: BTreeMap<String, f64>,
}

impl UpdateSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style scalar insertion.
    #[must_use]
    pub fn with_scalar(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert_scalar(name, value);
        self
    }

    /// Insert or overwrite a scalar parameter.
    pub fn insert_scalar(&mut self, name: impl Into<String>, value: f64) {
        self.scalars.insert(name.into(), value);
    }

    /// Replace the reference trajectory.
    pub fn set_trajectory(&mut self, trajectory: DVector<f64>) {
        self.trajectory = Some(trajectory);
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.scalars.get(name).copied()
    }

    pub const fn trajectory(&self) -> Option<&DVector<f64>> {
        self.trajectory.as_ref()
    }

    pub fn scalars(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scalars.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.trajectory.is_none() && self.scalars.is_empty()
    }

    /// Expand into dispatchable messages: trajectory first, then scalars by name.
    pub fn messages(&self) -> Vec<UpdateMessage> {
        let mut out = Vec::with_capacity(self.scalars.len() + 1);
        if let Some(traj) = &self.trajectory {
            out.push(UpdateMessage::Trajectory(traj.clone()));
        }
        out.extend(
            self.scalars
                .iter()
                .map(|(name, value)| UpdateMessage::scalar(name.clone(), *value)),
        );
        out
    }
}

// ---------------------------------------------------------------------------
// ExecutionStrategy
// ---------------------------------------------------------------------------

/// How the horizon problem is materialized for the solver.
///
/// Chosen once at configure time and handed to every component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Assemble dense matrices, then compress.
    Dense,
    /// Assemble compressed-column matrices directly from stage blocks.
    #[default]
    Sparse,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dense => f.write_str("dense"),
            Self::Sparse => f.write_str("sparse"),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionBounds
// ---------------------------------------------------------------------------

/// Closed interval `[low, high]` with `low < high`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionBounds {
    low: f64,
    high: f64,
}

impl ActionBounds {
    pub fn new(low: f64, high: f64) -> Result<Self, ConfigError> {
        if !(low.is_finite() && high.is_finite()) || low >= high {
            return Err(ConfigError::invalid(
                "action bounds",
                format!("need finite low < high, got [{low}, {high}]"),
            ));
        }
        Ok(Self { low, high })
    }

    /// Symmetric bounds `[-max, +max]`.
    pub fn symmetric(max: f64) -> Result<Self, ConfigError> {
        Self::new(-max, max)
    }

    pub const fn low(&self) -> f64 {
        self.low
    }

    pub const fn high(&self) -> f64 {
        self.high
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.low..=self.high).contains(&value)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.low, self.high)
    }
}

// ---------------------------------------------------------------------------
// SolverDiagnostics
// ---------------------------------------------------------------------------

/// Solver-reported diagnostics for one solve.
///
/// Carried verbatim inside [`ControlError::OptimizationFailed`](crate::error::ControlError)
/// so the caller can decide on its own safe-state policy.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverDiagnostics {
    /// Solver status string, e.g. `"Solved"` or `"PrimalInfeasible"`.
    pub status: String,
    pub iterations: u32,
    /// Objective value at termination (NaN when unavailable).
    pub objective: f64,
    pub solve_time_us: u64,
}

impl SolverDiagnostics {
    /// Diagnostics for a solve that never started.
    pub fn not_started(reason: impl Into<String>) -> Self {
        Self {
            status: reason.into(),
            iterations: 0,
            objective: f64::NAN,
            solve_time_us: 0,
        }
    }
}

impl fmt::Display for SolverDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {} iterations ({} us)",
            self.status, self.iterations, self.solve_time_us
        )
    }
}

// ---------------------------------------------------------------------------
// TickRecord
// ---------------------------------------------------------------------------

/// Diagnostics captured by the controller for one completed tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickRecord {
    pub time: f64,
    pub action: DVector<f64>,
    pub diagnostics: SolverDiagnostics,
    /// Stage cost of the applied action under the configured cost function.
    pub stage_cost: f64,
    /// Cost of holding the applied action over the horizon, scored on the
    /// predictor's rollout.
    pub predicted_cost: f64,
}
