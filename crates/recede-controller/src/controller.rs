//! The per-tick MPC loop.
//!
//! [`MpcController::step`] runs, in order: reference generation, update
//! dispatch, hot-reload polling of the three configuration sources, the
//! optimizer solve and tick logging. Everything is synchronous; `step`
//! takes `&mut self`, so ticks cannot overlap.

use std::path::Path;

use nalgebra::DVector;
use recede_core::config::{
    CONTROLLERS_FILE, CONTROLLER_SECTION, COST_FUNCTIONS_FILE, ConfigSet, OPTIMIZERS_FILE,
};
use recede_core::error::{ConfigError, ControlError, RecedeError};
use recede_core::traits::{CostFunction, TrajectoryReference, Updatable};
use recede_core::types::{SolverDiagnostics, TickRecord, UpdateMessage, UpdateSet};
use recede_mpc::Optimizer;
use recede_reload::{ConfigSnapshot, ConfigSource, ConfigWatcher, FileSource, ScalarChange};
use tracing::{debug, info, warn};

use crate::predictor::Predictor;
use crate::registry::Registry;
use crate::trajectory::TrajectoryGenerator;

/// Plant used when neither `configure` nor the controller table names one.
pub const DEFAULT_PLANT: &str = "cartpole";

/// Lifecycle of an [`MpcController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    /// Built, but `configure` has not succeeded yet.
    Unconfigured,
    /// Configured (or reset); no tick since.
    Configured,
    /// At least one tick since the last configure or reset.
    Stepping,
}

/// Everything `configure` builds.
struct Components {
    optimizer_name: String,
    optimizer: Box<dyn Optimizer>,
    cost: Box<dyn CostFunction>,
    predictor: Predictor,
    trajectory: TrajectoryGenerator,
    reference: DVector<f64>,
    /// Key prefix whose changes are applied live, one per watched source
    /// in source order: controllers, cost functions, optimizers.
    live_scopes: [String; 3],
}

impl Components {
    /// Push every message of `updates` to every subordinate.
    fn dispatch(&mut self, updates: &UpdateSet) {
        for message in updates.messages() {
            // Non-short-circuiting: every component sees every message.
            let consumed = self.optimizer.apply_update(&message)
                | self.cost.apply_update(&message)
                | self.predictor.apply_update(&message)
                | self.trajectory.apply_update(&message);
            match &message {
                UpdateMessage::ScalarParam { name, .. } if !consumed => {
                    debug!("no component uses {name}, skipped");
                }
                _ => {}
            }
        }
    }
}

/// Receding-horizon controller.
pub struct MpcController {
    config: ConfigSet,
    /// Source names: controllers, cost functions, optimizers.
    sources: [String; 3],
    registry: Registry,
    watcher: ConfigWatcher,
    components: Option<Components>,
    phase: ControllerPhase,
    last_updates: UpdateSet,
    logs: Vec<TickRecord>,
}

impl MpcController {
    /// Watch the three configuration files in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>, registry: Registry) -> Result<Self, RecedeError> {
        let dir = dir.as_ref();
        Self::from_sources(
            FileSource::new(dir.join(CONTROLLERS_FILE)),
            FileSource::new(dir.join(COST_FUNCTIONS_FILE)),
            FileSource::new(dir.join(OPTIMIZERS_FILE)),
            registry,
        )
    }

    /// Watch arbitrary sources. They are polled in argument order each tick.
    ///
    /// Fails if any source cannot be read or parsed now.
    pub fn from_sources(
        controllers: impl ConfigSource + 'static,
        cost_functions: impl ConfigSource + 'static,
        optimizers: impl ConfigSource + 'static,
        registry: Registry,
    ) -> Result<Self, RecedeError> {
        let sources = [
            controllers.name().to_string(),
            cost_functions.name().to_string(),
            optimizers.name().to_string(),
        ];
        if sources[0] == sources[1] || sources[1] == sources[2] || sources[0] == sources[2] {
            let message = format!("names must be distinct, got {sources:?}");
            return Err(ConfigError::invalid("sources", message).into());
        }

        let mut watcher = ConfigWatcher::new();
        watcher.watch(controllers)?;
        watcher.watch(cost_functions)?;
        watcher.watch(optimizers)?;
        debug!(?sources, "watching configuration");

        Ok(Self {
            config: parse_snapshots(&watcher, &sources)?,
            sources,
            registry,
            watcher,
            components: None,
            phase: ControllerPhase::Unconfigured,
            last_updates: UpdateSet::new(),
            logs: Vec::new(),
        })
    }

    /// Build cost function, predictor, optimizer and trajectory generator.
    ///
    /// `None` or empty arguments fall back to the controller table. The
    /// configuration is re-read from the last valid snapshots first, so a
    /// reconfigure picks up structural edits that hot-reload cannot apply.
    pub fn configure(
        &mut self,
        optimizer_name: Option<&str>,
        predictor_specification: Option<&str>,
    ) -> Result<(), RecedeError> {
        let config = parse_snapshots(&self.watcher, &self.sources)?;
        let controller = &config.controller;

        let optimizer_name = match optimizer_name.filter(|s| !s.is_empty()) {
            Some(name) => name.to_string(),
            None => {
                info!("Using optimizer {} specified in controller config", controller.optimizer);
                controller.optimizer.clone()
            }
        };
        let specification = match predictor_specification.filter(|s| !s.is_empty()) {
            Some(spec) => spec.to_string(),
            None => {
                let spec = controller
                    .predictor_specification
                    .clone()
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| DEFAULT_PLANT.to_string());
                info!("Using predictor {spec} specified in controller config");
                spec
            }
        };

        let dt = controller.dt;
        let strategy = controller.execution;
        let live_scopes = [
            format!("{CONTROLLER_SECTION}.trajectory."),
            format!("{}.", controller.cost_function_specification),
            format!("{optimizer_name}."),
        ];
        let limits = controller.control_bounds()?;

        let mut cost = self
            .registry
            .build_cost_function(&controller.cost_function_specification, &config)?;
        let plant = self.registry.build_plant(&specification)?;
        let mut predictor = Predictor::new(&specification, plant);
        let mut optimizer = self
            .registry
            .build_optimizer(&optimizer_name, &config, strategy)?;

        optimizer.configure(dt, predictor.plant())?;
        let action_max = optimizer.action_max();
        if -action_max < limits.low() || action_max > limits.high() {
            warn!(
                "{optimizer_name}: action bound ±{action_max} exceeds control limits [{}, {}]",
                limits.low(),
                limits.high()
            );
        }

        let horizon = optimizer.horizon();
        predictor.configure(optimizer.num_rollouts(), horizon, dt, strategy);
        cost.configure(horizon, dt, strategy);
        let trajectory = TrajectoryGenerator::new(controller.trajectory.clone(), horizon, dt);

        info!(
            optimizer = %optimizer_name,
            predictor = %specification,
            cost = cost.name(),
            horizon,
            dt,
            %strategy,
            "controller configured"
        );
        self.components = Some(Components {
            optimizer_name,
            optimizer,
            cost,
            predictor,
            trajectory,
            reference: DVector::zeros(horizon),
            live_scopes,
        });
        self.config = config;
        self.phase = ControllerPhase::Configured;
        self.last_updates = UpdateSet::new();
        Ok(())
    }

    /// Run one control tick and return the action to apply.
    ///
    /// `updates` are merged with the reference and any hot-reloaded scalars,
    /// then pushed to every subordinate before the solve.
    pub fn step(
        &mut self,
        state: &DVector<f64>,
        time: f64,
        updates: UpdateSet,
    ) -> Result<DVector<f64>, RecedeError> {
        let Some(components) = self.components.as_mut() else {
            return Err(ControlError::NotConfigured.into());
        };
        let expected = components.predictor.state_dim();
        if state.len() != expected {
            return Err(ControlError::StateDimMismatch {
                expected,
                got: state.len(),
            }
            .into());
        }
        debug!("step time={time:.3}s");

        let mut updates = updates;
        let reference = components.trajectory.step(time);
        updates.set_trajectory(reference.clone());
        components.reference = reference;
        components.dispatch(&updates);

        for (source, outcome) in self.watcher.check_all() {
            let Some(index) = self.sources.iter().position(|s| *s == source) else {
                continue;
            };
            let scope = components.live_scopes[index].as_str();
            let (live, ignored): (Vec<&ScalarChange>, Vec<&ScalarChange>) = outcome
                .changes()
                .iter()
                .partition(|c| c.key.starts_with(scope));
            if !ignored.is_empty() {
                debug!("config {source}: outside {scope}*, not applied: {}", describe(&ignored));
            }
            if live.is_empty() {
                continue;
            }
            for change in &live {
                updates.insert_scalar(change.leaf(), change.value);
            }
            components.dispatch(&updates);
            info!("updated config {source} with {}", describe(&live));
        }
        self.last_updates = updates;
        self.phase = ControllerPhase::Stepping;

        let action = components.optimizer.step(state, time)?;

        if self.config.controller.controller_logging {
            let diagnostics = components
                .optimizer
                .logging_values()
                .cloned()
                .unwrap_or_else(|| SolverDiagnostics::not_started("Unavailable"));
            let held = vec![action.clone(); components.predictor.horizon()];
            let rollout = components.predictor.predict(state, &held);
            self.logs.push(TickRecord {
                time,
                action: action.clone(),
                diagnostics,
                stage_cost: components.cost.stage_cost(state, &action),
                predicted_cost: components.cost.trajectory_cost(&rollout, &held),
            });
        }
        Ok(action)
    }

    /// Reset the optimizer. Configuration, registry and logs are untouched.
    pub fn reset(&mut self) {
        if let Some(components) = self.components.as_mut() {
            components.optimizer.reset();
            self.phase = ControllerPhase::Configured;
            info!("controller reset");
        }
    }

    pub const fn phase(&self) -> ControllerPhase {
        self.phase
    }

    pub const fn config(&self) -> &ConfigSet {
        &self.config
    }

    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    pub const fn watcher(&self) -> &ConfigWatcher {
        &self.watcher
    }

    /// The merged update set of the last tick, including the reference.
    pub const fn last_updates(&self) -> &UpdateSet {
        &self.last_updates
    }

    pub fn optimizer(&self) -> Option<&dyn Optimizer> {
        self.components.as_ref().map(|c| c.optimizer.as_ref())
    }

    pub fn optimizer_name(&self) -> Option<&str> {
        self.components.as_ref().map(|c| c.optimizer_name.as_str())
    }

    pub fn predictor(&self) -> Option<&Predictor> {
        self.components.as_ref().map(|c| &c.predictor)
    }

    pub fn cost_function(&self) -> Option<&dyn CostFunction> {
        self.components.as_ref().map(|c| c.cost.as_ref())
    }

    /// Reference vector used on the last tick (zeros before the first).
    pub fn reference(&self) -> Option<&DVector<f64>> {
        self.components.as_ref().map(|c| &c.reference)
    }

    pub fn logs(&self) -> &[TickRecord] {
        &self.logs
    }

    pub fn take_logs(&mut self) -> Vec<TickRecord> {
        std::mem::take(&mut self.logs)
    }
}

impl std::fmt::Debug for MpcController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpcController")
            .field("phase", &self.phase)
            .field("optimizer", &self.optimizer_name())
            .field("registry", &self.registry)
            .field("logs", &self.logs.len())
            .finish_non_exhaustive()
    }
}

/// Typed configuration from the last valid snapshot of each source.
fn parse_snapshots(
    watcher: &ConfigWatcher,
    sources: &[String; 3],
) -> Result<ConfigSet, RecedeError> {
    let text = |name: &String| watcher.snapshot(name).map_or("", ConfigSnapshot::text);
    let [controllers, cost_functions, optimizers] = sources;
    Ok(ConfigSet::parse(
        text(controllers),
        text(optimizers),
        text(cost_functions),
    )?)
}

fn describe(changes: &[&ScalarChange]) -> String {
    changes
        .iter()
        .map(|c| format!("{} = {}", c.key, c.value))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use recede_core::error::RegistryError;
    use recede_reload::MemorySource;

    const CONTROLLERS: &str = "[mpc]\ndt = 0.02\noptimizer = \"lqr\"\n\
                               predictor_specification = \"double_integrator\"\n";
    const COSTS: &str = "[quadratic]\n";
    const OPTIMIZERS: &str = "[lqr]\nmpc_horizon = 5\nP = 5.0\nR = 1.0\n";

    fn controller() -> MpcController {
        MpcController::from_sources(
            MemorySource::new("controllers", CONTROLLERS),
            MemorySource::new("cost", COSTS),
            MemorySource::new("optimizers", OPTIMIZERS),
            Registry::builtin(),
        )
        .unwrap()
    }

    #[test]
    fn step_before_configure_is_rejected() {
        let mut c = controller();
        assert_eq!(c.phase(), ControllerPhase::Unconfigured);
        let err = c.step(&DVector::zeros(2), 0.0, UpdateSet::new()).unwrap_err();
        assert!(matches!(err, RecedeError::Control(ControlError::NotConfigured)));
    }

    #[test]
    fn configure_falls_back_to_controller_table() {
        let mut c = controller();
        c.configure(None, Some("")).unwrap();
        assert_eq!(c.phase(), ControllerPhase::Configured);
        assert_eq!(c.optimizer_name(), Some("lqr"));
        assert_eq!(c.predictor().unwrap().specification(), "double_integrator");
        assert_eq!(c.predictor().unwrap().horizon(), 5);
        assert_eq!(c.predictor().unwrap().batch_size(), 1);
        assert_eq!(c.reference().unwrap(), &DVector::zeros(5));
    }

    #[test]
    fn explicit_names_override_config() {
        let mut c = controller();
        c.configure(Some("lqr"), Some("cartpole")).unwrap();
        assert_eq!(c.predictor().unwrap().state_dim(), 4);
    }

    #[test]
    fn unknown_optimizer_is_fatal_before_any_tick() {
        let mut c = controller();
        let err = c.configure(Some("mppi"), None).unwrap_err();
        assert!(matches!(
            err,
            RecedeError::Registry(RegistryError::UnknownOptimizer { .. })
        ));
        assert_eq!(c.phase(), ControllerPhase::Unconfigured);
    }

    #[test]
    fn step_then_reset_cycles_phase() {
        let mut c = controller();
        c.configure(None, None).unwrap();
        c.step(&DVector::zeros(2), 0.0, UpdateSet::new()).unwrap();
        assert_eq!(c.phase(), ControllerPhase::Stepping);
        c.reset();
        assert_eq!(c.phase(), ControllerPhase::Configured);
    }

    #[test]
    fn dimension_mismatch_precedes_any_work() {
        let mut c = controller();
        c.configure(None, None).unwrap();
        let err = c.step(&DVector::zeros(4), 0.0, UpdateSet::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Control error: State dimension mismatch: expected 2, got 4"
        );
        assert!(c.last_updates().is_empty());
        assert!(c.optimizer().unwrap().logging_values().is_none());
    }

    #[test]
    fn logging_is_off_by_default() {
        let mut c = controller();
        c.configure(None, None).unwrap();
        c.step(&DVector::zeros(2), 0.0, UpdateSet::new()).unwrap();
        assert!(c.logs().is_empty());
    }
}
