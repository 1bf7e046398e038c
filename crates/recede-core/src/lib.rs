// recede-core: types, traits, config and errors for the recede receding-horizon controller.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub mod prelude {
    pub use crate::config::{
        ConfigSet, ControllerConfig, Discretization, LqrConfig, QuadraticCostConfig,
        TrajectoryConfig, TrajectoryKind,
    };
    pub use crate::error::{ConfigError, ControlError, RecedeError, RegistryError, WatchError};
    pub use crate::traits::{CostFunction, PlantModel, TrajectoryReference, Updatable};
    pub use crate::types::{
        ActionBounds, ExecutionStrategy, SolverDiagnostics, TickRecord, UpdateMessage, UpdateSet,
    };
}
