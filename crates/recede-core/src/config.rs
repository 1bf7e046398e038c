use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{ActionBounds, ExecutionStrategy};

/// Controller settings file, one table per controller.
pub const CONTROLLERS_FILE: &str = "config_controllers.toml";
/// Optimizer settings file, one table per optimizer name.
pub const OPTIMIZERS_FILE: &str = "config_optimizers.toml";
/// Cost-function settings file, one table per cost function.
pub const COST_FUNCTIONS_FILE: &str = "config_cost_functions.toml";

/// The three configuration sources, in the order they are polled each tick.
pub const SOURCE_FILES: [&str; 3] = [CONTROLLERS_FILE, COST_FUNCTIONS_FILE, OPTIMIZERS_FILE];

/// Table name of the MPC controller inside [`CONTROLLERS_FILE`].
pub const CONTROLLER_SECTION: &str = "mpc";

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_dt() -> f64 {
    0.02
}
fn default_optimizer() -> String {
    "lqr".into()
}
fn default_cost_function() -> String {
    "quadratic".into()
}
const fn default_control_limits() -> [f64; 2] {
    [-1.0, 1.0]
}
const fn default_period() -> f64 {
    5.0
}
const fn default_horizon() -> usize {
    10
}
const fn default_action_max() -> f64 {
    1.0
}
const fn default_state_weight() -> f64 {
    5.0
}
const fn default_action_weight() -> f64 {
    1.0
}
const fn default_state_bound() -> f64 {
    100.0
}
fn default_solver() -> String {
    "clarabel".into()
}
const fn default_max_iter() -> u32 {
    100
}
const fn default_tolerance() -> f64 {
    1e-8
}
const fn default_position_weight() -> f64 {
    1.0
}
const fn default_cost_action_weight() -> f64 {
    0.1
}

// ---------------------------------------------------------------------------
// TrajectoryConfig
// ---------------------------------------------------------------------------

/// Shape of the target-position reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryKind {
    #[default]
    Constant,
    Sine,
    Square,
}

/// Reference trajectory generator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryConfig {
    #[serde(default)]
    pub kind: TrajectoryKind,
    /// Peak deviation from `offset` (ignored for `constant`).
    #[serde(default)]
    pub amplitude: f64,
    /// Period in seconds for `sine` and `square`.
    #[serde(default = "default_period")]
    pub period: f64,
    /// Centre value of the reference.
    #[serde(default)]
    pub offset: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            kind: TrajectoryKind::Constant,
            amplitude: 0.0,
            period: default_period(),
            offset: 0.0,
        }
    }
}

impl TrajectoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.period > 0.0) {
            return Err(ConfigError::invalid("trajectory.period", "must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

/// The `[mpc]` table of [`CONTROLLERS_FILE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Control timestep in seconds (default: 0.02 = 50 Hz).
    #[serde(default = "default_dt")]
    pub dt: f64,

    /// Optimizer used when `configure` is called without one.
    #[serde(default = "default_optimizer")]
    pub optimizer: String,

    /// Plant/predictor used when `configure` is called without one.
    #[serde(default)]
    pub predictor_specification: Option<String>,

    #[serde(default = "default_cost_function")]
    pub cost_function_specification: String,

    #[serde(default)]
    pub execution: ExecutionStrategy,

    /// Record a [`TickRecord`](crate::types::TickRecord) per tick.
    #[serde(default)]
    pub controller_logging: bool,

    /// Actuator limits `[low, high]` the optimizer's bounds should respect.
    #[serde(default = "default_control_limits")]
    pub control_limits: [f64; 2],

    #[serde(default)]
    pub trajectory: TrajectoryConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            dt: default_dt(),
            optimizer: default_optimizer(),
            predictor_specification: None,
            cost_function_specification: default_cost_function(),
            execution: ExecutionStrategy::default(),
            controller_logging: false,
            control_limits: default_control_limits(),
            trajectory: TrajectoryConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dt > 0.0) {
            return Err(ConfigError::invalid("dt", format!("{} (must be > 0)", self.dt)));
        }
        if self.optimizer.trim().is_empty() {
            return Err(ConfigError::invalid("optimizer", "must not be empty"));
        }
        self.control_bounds()?;
        self.trajectory.validate()
    }

    pub fn control_bounds(&self) -> Result<ActionBounds, ConfigError> {
        ActionBounds::new(self.control_limits[0], self.control_limits[1])
    }
}

// ---------------------------------------------------------------------------
// LqrConfig
// ---------------------------------------------------------------------------

/// Discretization applied to the continuous plant Jacobian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discretization {
    /// `A_d = I + A dt`, `B_d = B dt`.
    #[default]
    Euler,
    /// Exact zero-order hold via the augmented matrix exponential.
    MatrixExp,
}

/// Settings for the linear-quadratic horizon optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LqrConfig {
    /// Prediction horizon N (number of stages).
    #[serde(default = "default_horizon")]
    pub mpc_horizon: usize,
    /// Action bound magnitude; bounds are `[-action_max, action_max]`.
    #[serde(default = "default_action_max")]
    pub action_max: f64,
    /// Scalar state weight.
    #[serde(rename = "P", default = "default_state_weight")]
    pub state_weight: f64,
    /// Scalar action weight.
    #[serde(rename = "R", default = "default_action_weight")]
    pub action_weight: f64,
    /// Symmetric box bound applied to every state on every stage.
    #[serde(default = "default_state_bound")]
    pub state_bound: f64,
    #[serde(default)]
    pub discretization: Discretization,
    /// Registered solver name.
    #[serde(default = "default_solver")]
    pub solver: String,
    #[serde(default = "default_max_iter")]
    pub max_iter: u32,
    /// Gap and feasibility tolerance handed to the solver.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for LqrConfig {
    fn default() -> Self {
        Self {
            mpc_horizon: default_horizon(),
            action_max: default_action_max(),
            state_weight: default_state_weight(),
            action_weight: default_action_weight(),
            state_bound: default_state_bound(),
            discretization: Discretization::default(),
            solver: default_solver(),
            max_iter: default_max_iter(),
            tolerance: default_tolerance(),
        }
    }
}

impl LqrConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mpc_horizon == 0 {
            return Err(ConfigError::invalid("mpc_horizon", "must be >= 1"));
        }
        if !(self.action_max > 0.0) || !self.action_max.is_finite() {
            return Err(ConfigError::invalid(
                "action_max",
                format!("{} (must be finite and > 0)", self.action_max),
            ));
        }
        if !(self.state_weight >= 0.0) {
            return Err(ConfigError::invalid("P", format!("{} (must be >= 0)", self.state_weight)));
        }
        if !(self.action_weight > 0.0) {
            return Err(ConfigError::invalid("R", format!("{} (must be > 0)", self.action_weight)));
        }
        if !(self.state_bound > 0.0) {
            return Err(ConfigError::invalid("state_bound", "must be > 0"));
        }
        if self.max_iter == 0 {
            return Err(ConfigError::invalid("max_iter", "must be >= 1"));
        }
        if !(self.tolerance > 0.0) {
            return Err(ConfigError::invalid("tolerance", "must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// QuadraticCostConfig
// ---------------------------------------------------------------------------

/// Settings for the quadratic tracking cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadraticCostConfig {
    /// Weight on `(x[tracked_state] - target)^2`.
    #[serde(default = "default_position_weight")]
    pub position_weight: f64,
    /// Weight on `|x|^2`.
    #[serde(default)]
    pub state_weight: f64,
    /// Weight on `|u|^2`.
    #[serde(default = "default_cost_action_weight")]
    pub action_weight: f64,
    /// Index of the state compared against the reference.
    #[serde(default)]
    pub tracked_state: usize,
}

impl Default for QuadraticCostConfig {
    fn default() -> Self {
        Self {
            position_weight: default_position_weight(),
            state_weight: 0.0,
            action_weight: default_cost_action_weight(),
            tracked_state: 0,
        }
    }
}

impl QuadraticCostConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("position_weight", self.position_weight),
            ("state_weight", self.state_weight),
            ("action_weight", self.action_weight),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::invalid(field, format!("{value} (must be >= 0)")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ConfigSet
// ---------------------------------------------------------------------------

/// All three configuration sources, parsed.
///
/// The controller table is typed up front; optimizer and cost tables stay
/// raw until a name is resolved, since only the chosen entry must be valid.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSet {
    pub controller: ControllerConfig,
    optimizers: toml::Table,
    cost_functions: toml::Table,
}

impl ConfigSet {
    /// Parse the three sources from their TOML text.
    pub fn parse(
        controllers: &str,
        optimizers: &str,
        cost_functions: &str,
    ) -> Result<Self, ConfigError> {
        let mut controllers: toml::Table = toml::from_str(controllers)?;
        let controller: ControllerConfig = match controllers.remove(CONTROLLER_SECTION) {
            Some(value) => value.try_into()?,
            None => return Err(ConfigError::MissingSection(CONTROLLER_SECTION.into())),
        };
        controller.validate()?;
        Ok(Self {
            controller,
            optimizers: toml::from_str(optimizers)?,
            cost_functions: toml::from_str(cost_functions)?,
        })
    }

    /// Load [`SOURCE_FILES`] from a directory.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let controllers = std::fs::read_to_string(dir.join(CONTROLLERS_FILE))?;
        let optimizers = std::fs::read_to_string(dir.join(OPTIMIZERS_FILE))?;
        let cost_functions = std::fs::read_to_string(dir.join(COST_FUNCTIONS_FILE))?;
        Self::parse(&controllers, &optimizers, &cost_functions)
    }

    /// Deserialize the optimizer table named `name`.
    pub fn optimizer_section<T: DeserializeOwned>(&self, name: &str) -> Result<T, ConfigError> {
        section(&self.optimizers, name)
    }

    /// Deserialize the cost-function table named `name`.
    pub fn cost_section<T: DeserializeOwned>(&self, name: &str) -> Result<T, ConfigError> {
        section(&self.cost_functions, name)
    }

    /// Names of all optimizer tables present in the file.
    pub fn optimizer_names(&self) -> Vec<&str> {
        self.optimizers.keys().map(String::as_str).collect()
    }
}

fn section<T: DeserializeOwned>(table: &toml::Table, name: &str) -> Result<T, ConfigError> {
    let value = table
        .get(name)
        .cloned()
        .ok_or_else(|| ConfigError::MissingSection(name.into()))?;
    Ok(value.try_into()?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
