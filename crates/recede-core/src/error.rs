use thiserror::Error;

use crate::types::SolverDiagnostics;

/// Top-level error type for recede.
#[derive(Debug, Error)]
pub enum RecedeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Missing section [{0}]")]
    MissingSection(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Name lookups that fail at configure time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown optimizer '{name}' (available: {})", .available.join(", "))]
    UnknownOptimizer { name: String, available: Vec<String> },

    #[error("Unknown plant '{0}'")]
    UnknownPlant(String),

    #[error("Unknown solver '{0}'")]
    UnknownSolver(String),

    #[error("Unknown cost function '{0}'")]
    UnknownCostFunction(String),

    #[error("Optimizer '{optimizer}' does not support the {strategy} execution strategy")]
    UnsupportedStrategy { optimizer: String, strategy: String },
}

/// Per-tick control errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("Controller is not configured")]
    NotConfigured,

    #[error("State dimension mismatch: expected {expected}, got {got}")]
    StateDimMismatch { expected: usize, got: usize },

    #[error("Jacobian shape mismatch: expected {expected:?}, got {got:?}")]
    JacobianShape {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("State contains NaN or Inf")]
    NonFinite,

    #[error("Optimization failed: {0}")]
    OptimizationFailed(SolverDiagnostics),
}

/// Errors raised while reading a watched configuration source.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("Parse error in {source_name}: {message}")]
    Parse { source_name: String, message: String },

    #[error("Unknown source '{0}'")]
    UnknownSource(String),
}
