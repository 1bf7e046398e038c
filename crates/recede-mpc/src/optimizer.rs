//! Optimizer seam and the linear-quadratic horizon optimizer.

use std::sync::Arc;

use nalgebra::DVector;
use recede_core::config::LqrConfig;
use recede_core::error::{ConfigError, ControlError};
use recede_core::traits::{PlantModel, Updatable};
use recede_core::types::{ExecutionStrategy, SolverDiagnostics, UpdateMessage};
use tracing::{debug, info, warn};

use crate::discretize::discretize;
use crate::horizon::HorizonAssembler;
use crate::solver::QpSolver;
use crate::types::{ControlProblem, HorizonProblem, LinearizationSample};

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

/// A receding-horizon optimizer driven by the controller loop.
pub trait Optimizer: Updatable + Send {
    /// Bind the control timestep and the plant whose Jacobian is linearized.
    fn configure(&mut self, dt: f64, plant: Arc<dyn PlantModel>) -> Result<(), ConfigError>;

    /// Compute the action for `state`. Fails rather than returning a stale action.
    fn step(&mut self, state: &DVector<f64>, time: f64) -> Result<DVector<f64>, ControlError>;

    /// Clear per-episode state. Configuration is left untouched.
    fn reset(&mut self);

    /// Prediction horizon N.
    fn horizon(&self) -> usize;

    /// Number of trajectories the predictor must roll out per tick.
    fn num_rollouts(&self) -> usize {
        1
    }

    /// Current action bound magnitude.
    fn action_max(&self) -> f64;

    /// Diagnostics of the most recent solve.
    fn logging_values(&self) -> Option<&SolverDiagnostics>;

    fn supports(&self, strategy: ExecutionStrategy) -> bool;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// LqrOptimizer
// ---------------------------------------------------------------------------

/// Linear-quadratic MPC over a plant linearized at every tick.
///
/// Each step linearizes the plant at `(state, 0)`, discretizes with `dt`,
/// scales the input matrix by the upper action bound and hands the horizon
/// problem to the [`QpSolver`]. Only the first-stage action is returned.
pub struct LqrOptimizer {
    config: LqrConfig,
    solver: Box<dyn QpSolver>,
    dt: f64,
    plant: Option<Arc<dyn PlantModel>>,
    assembler: Option<HorizonAssembler>,
    last: Option<SolverDiagnostics>,
}

impl LqrOptimizer {
    pub fn new(config: LqrConfig, solver: Box<dyn QpSolver>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            solver,
            dt: 0.0,
            plant: None,
            assembler: None,
            last: None,
        })
    }

    pub const fn config(&self) -> &LqrConfig {
        &self.config
    }

    /// The bound problem, once configured.
    pub fn control_problem(&self) -> Option<&ControlProblem> {
        self.assembler.as_ref().map(HorizonAssembler::problem)
    }

    /// The horizon problem submitted on the last step.
    pub fn last_problem(&self) -> Option<&HorizonProblem> {
        self.assembler.as_ref().and_then(HorizonAssembler::last)
    }

    pub fn solver_name(&self) -> &str {
        self.solver.name()
    }

    /// Apply a live scalar. `Ok(false)` for names this optimizer does not own.
    fn set_scalar(&mut self, name: &str, value: f64) -> Result<bool, ConfigError> {
        let mut next = self.config.clone();
        let slot = match name {
            "P" => &mut next.state_weight,
            "R" => &mut next.action_weight,
            "action_max" => &mut next.action_max,
            _ => return Ok(false),
        };
        if slot.to_bits() == value.to_bits() {
            return Ok(true);
        }
        *slot = value;
        next.validate()?;

        if let Some(asm) = &mut self.assembler {
            match name {
                "P" => asm.set_state_weight(value)?,
                "R" => asm.set_action_weight(value)?,
                _ => asm.set_action_max(value)?,
            }
        }
        self.config = next;
        info!("lqr: {name} = {value}");
        Ok(true)
    }
}

impl Updatable for LqrOptimizer {
    fn apply_update(&mut self, update: &UpdateMessage) -> bool {
        let UpdateMessage::ScalarParam { name, value } = update else {
            return false;
        };
        self.set_scalar(name, *value).unwrap_or_else(|e| {
            warn!("lqr: ignoring update {name} = {value}: {e}");
            false
        })
    }
}

impl Optimizer for LqrOptimizer {
    fn configure(&mut self, dt: f64, plant: Arc<dyn PlantModel>) -> Result<(), ConfigError> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(ConfigError::invalid("dt", format!("{dt} (must be > 0)")));
        }
        let problem =
            ControlProblem::from_config(&self.config, plant.state_dim(), plant.action_dim())?;
        debug!(
            plant = plant.name(),
            horizon = problem.horizon(),
            nx = problem.state_dim(),
            nu = problem.action_dim(),
            "lqr configured"
        );
        self.dt = dt;
        self.assembler = Some(HorizonAssembler::new(problem));
        self.plant = Some(plant);
        self.last = None;
        Ok(())
    }

    fn step(&mut self, state: &DVector<f64>, _time: f64) -> Result<DVector<f64>, ControlError> {
        let (Some(plant), Some(asm)) = (&self.plant, &mut self.assembler) else {
            return Err(ControlError::NotConfigured);
        };
        let nx = asm.problem().state_dim();
        let nu = asm.problem().action_dim();
        if state.len() != nx {
            return Err(ControlError::StateDimMismatch {
                expected: nx,
                got: state.len(),
            });
        }
        if state.iter().any(|v| !v.is_finite()) {
            return Err(ControlError::NonFinite);
        }

        let jacobian = plant.jacobian(state, &DVector::zeros(nu));
        let continuous = LinearizationSample::from_jacobian(&jacobian, nx, nu)?;
        let (a, b) = discretize(self.config.discretization, &continuous.a, &continuous.b, self.dt);
        let bounds = asm.problem().action_bounds();
        let sample = LinearizationSample {
            a,
            b: b * bounds.high(),
        };

        let horizon = asm.assemble(sample, state);
        let output = self.solver.solve(horizon);
        self.last = Some(output.diagnostics.clone());

        if !output.success || output.solution.len() < nu {
            return Err(ControlError::OptimizationFailed(output.diagnostics));
        }
        debug!(
            status = %output.diagnostics.status,
            iterations = output.diagnostics.iterations,
            solve_time_us = output.diagnostics.solve_time_us,
            "lqr solved"
        );
        Ok(output.solution.rows(0, nu).map(|u| bounds.clamp(u)))
    }

    fn reset(&mut self) {
        self.last = None;
    }

    fn horizon(&self) -> usize {
        self.config.mpc_horizon
    }

    fn action_max(&self) -> f64 {
        self.config.action_max
    }

    fn logging_values(&self) -> Option<&SolverDiagnostics> {
        self.last.as_ref()
    }

    fn supports(&self, _strategy: ExecutionStrategy) -> bool {
        true
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "lqr"
    }
}
