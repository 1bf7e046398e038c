//! Recede receding-horizon controller CLI.
//!
//! Provides three modes of operation:
//! - `run`: Drive a simulated plant in closed loop from a config directory
//! - `init`: Write the default configuration files
//! - `check`: Load and configure a config directory without stepping

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use nalgebra::DVector;
use recede_controller::{MpcController, Registry};
use recede_core::config::{CONTROLLERS_FILE, COST_FUNCTIONS_FILE, OPTIMIZERS_FILE};
use recede_core::types::UpdateSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type AppResult = Result<(), Box<dyn std::error::Error>>;

const DEFAULT_CONFIGS: [(&str, &str); 3] = [
    (
        CONTROLLERS_FILE,
        include_str!("../../../config/config_controllers.toml"),
    ),
    (
        OPTIMIZERS_FILE,
        include_str!("../../../config/config_optimizers.toml"),
    ),
    (
        COST_FUNCTIONS_FILE,
        include_str!("../../../config/config_cost_functions.toml"),
    ),
];

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Receding-horizon controller with live-reloaded configuration.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. `debug` or `recede_mpc=debug`.
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate the configured plant under closed-loop control.
    Run {
        /// Directory holding the three configuration files.
        #[arg(short, long, default_value = "config")]
        config: PathBuf,

        /// Number of control ticks.
        #[arg(short = 'n', long, default_value_t = 500)]
        steps: u32,

        /// Initial state, comma separated (cart-pole: x, ẋ, θ, θ̇).
        #[arg(short, long, value_delimiter = ',', default_value = "0,0,0.05,0")]
        initial: Vec<f64>,

        /// Sleep one `dt` per tick so config edits can be made while it runs.
        #[arg(long)]
        realtime: bool,

        /// Print the state every this many ticks.
        #[arg(long, default_value_t = 25)]
        print_every: u32,
    },

    /// Write the default configuration files.
    Init {
        #[arg(default_value = "config")]
        dir: PathBuf,

        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Load and configure a config directory, then print what was built.
    Check {
        #[arg(default_value = "config")]
        dir: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn run_closed_loop(
    config: &Path,
    steps: u32,
    initial: &[f64],
    realtime: bool,
    print_every: u32,
) -> AppResult {
    let mut controller = MpcController::from_dir(config, Registry::builtin())?;
    controller.configure(None, None)?;

    // The simulated plant is integrated with the controller's own predictor.
    let Some(simulator) = controller.predictor().cloned() else {
        return Err("controller has no predictor after configure".into());
    };
    if initial.len() != simulator.state_dim() {
        return Err(format!(
            "initial state has {} entries, {} expects {}",
            initial.len(),
            simulator.specification(),
            simulator.state_dim()
        )
        .into());
    }

    let dt = simulator.dt();
    let mut state = DVector::from_column_slice(initial);
    let mut failures = 0u32;
    let mut time = 0.0;
    let print_every = print_every.max(1);

    for tick in 0..steps {
        let action = match controller.step(&state, time, UpdateSet::new()) {
            Ok(action) => action,
            Err(e) => {
                warn!("tick {tick}: {e}; holding zero action");
                failures += 1;
                DVector::zeros(simulator.action_dim())
            }
        };

        if let Some(next) = simulator.predict(&state, std::slice::from_ref(&action)).pop() {
            state = next;
        }
        time += dt;

        if tick % print_every == 0 {
            println!(
                "t={time:7.3}  u={:+.4}  x=[{}]",
                action[0],
                format_state(&state)
            );
        }
        if !state.iter().all(|v| v.is_finite()) {
            return Err(format!("state diverged at tick {tick}").into());
        }
        if realtime {
            std::thread::sleep(Duration::from_secs_f64(dt));
        }
    }

    println!(
        "\nfinal: t={time:.3}  x=[{}]  failed ticks={failures}/{steps}",
        format_state(&state)
    );
    Ok(())
}

fn format_state(state: &DVector<f64>) -> String {
    state
        .iter()
        .map(|v| format!("{v:+.4}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn run_init(dir: &Path, force: bool) -> AppResult {
    std::fs::create_dir_all(dir)?;
    for (name, text) in DEFAULT_CONFIGS {
        let path = dir.join(name);
        if path.exists() && !force {
            warn!("{} exists, skipping (use --force to overwrite)", path.display());
            continue;
        }
        std::fs::write(&path, text)?;
        info!("wrote {}", path.display());
    }
    Ok(())
}

fn run_check(dir: &Path) -> AppResult {
    let registry = Registry::builtin();
    let mut controller = MpcController::from_dir(dir, registry)?;
    controller.configure(None, None)?;

    let controller_config = &controller.config().controller;
    println!("config:     {}", dir.display());
    println!("optimizer:  {}", controller.optimizer_name().unwrap_or("-"));
    if let Some(predictor) = controller.predictor() {
        println!(
            "predictor:  {} (nx={}, nu={})",
            predictor.specification(),
            predictor.state_dim(),
            predictor.action_dim()
        );
        println!("horizon:    {}", predictor.horizon());
    }
    if let Some(cost) = controller.cost_function() {
        println!("cost:       {}", cost.name());
    }
    println!("dt:         {}", controller_config.dt);
    println!("execution:  {}", controller_config.execution);
    println!("optimizers: {}", controller.registry().optimizer_names().join(", "));
    println!("plants:     {}", controller.registry().plant_names().join(", "));
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn init_tracing(filter: Option<&str>) {
    let filter = filter.map_or_else(
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        EnvFilter::new,
    );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    let result = match cli.command {
        Commands::Run {
            config,
            steps,
            initial,
            realtime,
            print_every,
        } => run_closed_loop(&config, steps, &initial, realtime, print_every),
        Commands::Init { dir, force } => run_init(&dir, force),
        Commands::Check { dir } => run_check(&dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
