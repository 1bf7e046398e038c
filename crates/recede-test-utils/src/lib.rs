//! Shared test fixtures and utilities for recede crates.
//!
//! Provides stub and recording QP solvers, fixture configuration texts, and
//! temporary configuration directories with controllable modification times.

pub mod fixtures;
pub mod solvers;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use fixtures::{
    ConfigDir, CONTROLLERS_TOML, COST_FUNCTIONS_TOML, OPTIMIZERS_TOML, stub_optimizers_toml,
};
pub use solvers::{RecordingSolver, StubSolver, failure_diagnostics};
