//! Name → factory tables for optimizers, solvers, plants and cost functions.
//!
//! The built-in tables are static; [`Registry::builtin`] copies them into a
//! registry once at startup and callers may add their own entries before
//! configuring a controller. Names are resolved once, at configure time.

use std::collections::BTreeMap;
use std::sync::Arc;

use recede_core::config::{ConfigSet, LqrConfig, QuadraticCostConfig};
use recede_core::error::{RecedeError, RegistryError};
use recede_core::traits::{CostFunction, PlantModel};
use recede_core::types::ExecutionStrategy;
use recede_mpc::{ClarabelSolver, LqrOptimizer, Optimizer, QpSolver, SolverSettings};
use recede_plant::{CartPole, LinearPlant};

use crate::cost::QuadraticCost;

/// Builds an optimizer from the config set, resolving its solver through the registry.
pub type OptimizerFactory = Arc<
    dyn Fn(&ConfigSet, &Registry, ExecutionStrategy) -> Result<Box<dyn Optimizer>, RecedeError>
        + Send
        + Sync,
>;
pub type SolverFactory =
    Arc<dyn Fn(SolverSettings, ExecutionStrategy) -> Box<dyn QpSolver> + Send + Sync>;
pub type PlantFactory = Arc<dyn Fn() -> Arc<dyn PlantModel> + Send + Sync>;
pub type CostFactory =
    Arc<dyn Fn(&ConfigSet) -> Result<Box<dyn CostFunction>, RecedeError> + Send + Sync>;

// ---------------------------------------------------------------------------
// Built-in tables
// ---------------------------------------------------------------------------

type OptimizerFn =
    fn(&ConfigSet, &Registry, ExecutionStrategy) -> Result<Box<dyn Optimizer>, RecedeError>;
type SolverFn = fn(SolverSettings, ExecutionStrategy) -> Box<dyn QpSolver>;
type PlantFn = fn() -> Arc<dyn PlantModel>;
type CostFn = fn(&ConfigSet) -> Result<Box<dyn CostFunction>, RecedeError>;

static BUILTIN_OPTIMIZERS: &[(&str, OptimizerFn)] = &[("lqr", build_lqr)];

static BUILTIN_SOLVERS: &[(&str, SolverFn)] = &[("clarabel", build_clarabel)];

static BUILTIN_PLANTS: &[(&str, PlantFn)] = &[
    ("cartpole", build_cartpole),
    ("double_integrator", build_double_integrator),
];

static BUILTIN_COST_FUNCTIONS: &[(&str, CostFn)] = &[("quadratic", build_quadratic)];

fn build_lqr(
    config: &ConfigSet,
    registry: &Registry,
    strategy: ExecutionStrategy,
) -> Result<Box<dyn Optimizer>, RecedeError> {
    let lqr: LqrConfig = config.optimizer_section("lqr")?;
    lqr.validate()?;
    let solver = registry.build_solver(&lqr.solver, SolverSettings::from(&lqr), strategy)?;
    Ok(Box::new(LqrOptimizer::new(lqr, solver)?))
}

fn build_clarabel(settings: SolverSettings, strategy: ExecutionStrategy) -> Box<dyn QpSolver> {
    Box::new(ClarabelSolver::new(settings, strategy))
}

fn build_cartpole() -> Arc<dyn PlantModel> {
    Arc::new(CartPole::default())
}

fn build_double_integrator() -> Arc<dyn PlantModel> {
    Arc::new(LinearPlant::double_integrator())
}

fn build_quadratic(config: &ConfigSet) -> Result<Box<dyn CostFunction>, RecedeError> {
    let cost: QuadraticCostConfig = config.cost_section("quadratic")?;
    cost.validate()?;
    Ok(Box::new(QuadraticCost::new(cost)))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Factories keyed by name.
#[derive(Clone, Default)]
pub struct Registry {
    optimizers: BTreeMap<String, OptimizerFactory>,
    solvers: BTreeMap<String, SolverFactory>,
    plants: BTreeMap<String, PlantFactory>,
    cost_functions: BTreeMap<String, CostFactory>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in entry.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for &(name, f) in BUILTIN_OPTIMIZERS {
            registry.register_optimizer(name, Arc::new(f));
        }
        for &(name, f) in BUILTIN_SOLVERS {
            registry.register_solver(name, Arc::new(f));
        }
        for &(name, f) in BUILTIN_PLANTS {
            registry.register_plant(name, Arc::new(f));
        }
        for &(name, f) in BUILTIN_COST_FUNCTIONS {
            registry.register_cost_function(name, Arc::new(f));
        }
        registry
    }

    pub fn register_optimizer(&mut self, name: impl Into<String>, factory: OptimizerFactory) {
        self.optimizers.insert(name.into(), factory);
    }

    pub fn register_solver(&mut self, name: impl Into<String>, factory: SolverFactory) {
        self.solvers.insert(name.into(), factory);
    }

    pub fn register_plant(&mut self, name: impl Into<String>, factory: PlantFactory) {
        self.plants.insert(name.into(), factory);
    }

    pub fn register_cost_function(&mut self, name: impl Into<String>, factory: CostFactory) {
        self.cost_functions.insert(name.into(), factory);
    }

    /// Registered optimizer names, sorted.
    pub fn optimizer_names(&self) -> Vec<String> {
        self.optimizers.keys().cloned().collect()
    }

    pub fn plant_names(&self) -> Vec<String> {
        self.plants.keys().cloned().collect()
    }

    /// Resolve and build an optimizer, checking it supports `strategy`.
    pub fn build_optimizer(
        &self,
        name: &str,
        config: &ConfigSet,
        strategy: ExecutionStrategy,
    ) -> Result<Box<dyn Optimizer>, RecedeError> {
        let factory = self
            .optimizers
            .get(name)
            .ok_or_else(|| RegistryError::UnknownOptimizer {
                name: name.to_string(),
                available: self.optimizer_names(),
            })?;
        let optimizer = factory(config, self, strategy)?;
        if !optimizer.supports(strategy) {
            return Err(RegistryError::UnsupportedStrategy {
                optimizer: name.to_string(),
                strategy: strategy.to_string(),
            }
            .into());
        }
        Ok(optimizer)
    }

    pub fn build_solver(
        &self,
        name: &str,
        settings: SolverSettings,
        strategy: ExecutionStrategy,
    ) -> Result<Box<dyn QpSolver>, RegistryError> {
        self.solvers
            .get(name)
            .map(|factory| factory(settings, strategy))
            .ok_or_else(|| RegistryError::UnknownSolver(name.to_string()))
    }

    pub fn build_plant(&self, name: &str) -> Result<Arc<dyn PlantModel>, RegistryError> {
        self.plants
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::UnknownPlant(name.to_string()))
    }

    pub fn build_cost_function(
        &self,
        name: &str,
        config: &ConfigSet,
    ) -> Result<Box<dyn CostFunction>, RecedeError> {
        let factory = self
            .cost_functions
            .get(name)
            .ok_or_else(|| RegistryError::UnknownCostFunction(name.to_string()))?;
        factory(config)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("optimizers", &self.optimizers.keys().collect::<Vec<_>>())
            .field("solvers", &self.solvers.keys().collect::<Vec<_>>())
            .field("plants", &self.plants.keys().collect::<Vec<_>>())
            .field("cost_functions", &self.cost_functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROLLERS: &str = "[mpc]\n";
    const OPTIMIZERS: &str = "[lqr]\nP = 5.0\nR = 1.0\n";
    const COSTS: &str = "[quadratic]\n";

    fn config() -> ConfigSet {
        ConfigSet::parse(CONTROLLERS, OPTIMIZERS, COSTS).unwrap()
    }

    #[test]
    fn builtin_tables_resolve() {
        let registry = Registry::builtin();
        assert_eq!(registry.optimizer_names(), vec!["lqr"]);
        assert_eq!(registry.plant_names(), vec!["cartpole", "double_integrator"]);

        let opt = registry
            .build_optimizer("lqr", &config(), ExecutionStrategy::Dense)
            .unwrap();
        assert_eq!(opt.name(), "lqr");
        assert_eq!(opt.horizon(), 10);

        assert_eq!(registry.build_plant("cartpole").unwrap().state_dim(), 4);
        assert_eq!(
            registry.build_cost_function("quadratic", &config()).unwrap().name(),
            "quadratic"
        );
    }

    #[test]
    fn unknown_optimizer_lists_available() {
        let registry = Registry::builtin();
        let Err(err) = registry.build_optimizer("mppi", &config(), ExecutionStrategy::Sparse) else {
            panic!("expected an error");
        };
        assert!(matches!(
            err,
            RecedeError::Registry(RegistryError::UnknownOptimizer { ref available, .. })
                if available == &["lqr".to_string()]
        ));
    }

    #[test]
    fn unknown_solver_in_optimizer_table() {
        let registry = Registry::builtin();
        let set = ConfigSet::parse(CONTROLLERS, "[lqr]\nsolver = \"osqp\"\n", COSTS).unwrap();
        let Err(err) = registry.build_optimizer("lqr", &set, ExecutionStrategy::Sparse) else {
            panic!("expected an error");
        };
        assert_eq!(err.to_string(), "Registry error: Unknown solver 'osqp'");
    }

    #[test]
    fn unknown_plant_and_cost() {
        let registry = Registry::builtin();
        assert_eq!(
            registry.build_plant("acrobot").err(),
            Some(RegistryError::UnknownPlant("acrobot".into()))
        );
        assert!(matches!(
            registry.build_cost_function("huber", &config()),
            Err(RecedeError::Registry(RegistryError::UnknownCostFunction(_)))
        ));
    }

    #[test]
    fn custom_registration_overrides() {
        let mut registry = Registry::builtin();
        registry.register_plant(
            "pendulum",
            Arc::new(|| -> Arc<dyn PlantModel> { Arc::new(CartPole::default()) }),
        );
        assert!(registry.build_plant("pendulum").is_ok());
        assert_eq!(registry.plant_names().len(), 3);
    }

    #[test]
    fn invalid_optimizer_table_is_a_config_error() {
        let registry = Registry::builtin();
        let set = ConfigSet::parse(CONTROLLERS, "[lqr]\nR = 0.0\n", COSTS).unwrap();
        let Err(err) = registry.build_optimizer("lqr", &set, ExecutionStrategy::Sparse) else {
            panic!("expected an error");
        };
        assert!(matches!(err, RecedeError::Config(_)));
    }
}
