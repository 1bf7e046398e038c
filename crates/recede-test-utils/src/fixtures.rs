//! Fixture configuration texts and on-disk configuration directories.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use recede_core::config::{CONTROLLERS_FILE, COST_FUNCTIONS_FILE, OPTIMIZERS_FILE};
use tempfile::TempDir;

/// Controller table driving a double integrator at 50 Hz.
pub const CONTROLLERS_TOML: &str = r#"[mpc]
dt = 0.02
optimizer = "lqr"
predictor_specification = "double_integrator"
cost_function_specification = "quadratic"
execution = "sparse"
control_limits = [-1.0, 1.0]

[mpc.trajectory]
kind = "constant"
offset = 0.0
"#;

/// Ten-stage LQR with `P = 5`, `R = 1` and unit action bounds.
pub const OPTIMIZERS_TOML: &str = r#"[lqr]
mpc_horizon = 10
action_max = 1.0
P = 5.0
R = 1.0
state_bound = 100.0
solver = "clarabel"
"#;

pub const COST_FUNCTIONS_TOML: &str = r#"[quadratic]
position_weight = 1.0
state_weight = 0.0
action_weight = 0.1
tracked_state = 0
"#;

/// [`OPTIMIZERS_TOML`] with the solver swapped for a registered name.
pub fn stub_optimizers_toml(solver: &str) -> String {
    OPTIMIZERS_TOML.replace(r#"solver = "clarabel""#, &format!(r#"solver = "{solver}""#))
}

// ---------------------------------------------------------------------------
// ConfigDir
// ---------------------------------------------------------------------------

/// A temporary directory holding the three configuration files.
///
/// Every write stamps the file with a modification time strictly later than
/// the previous one, so rewrites of equal length are still picked up by
/// marker-based polling.
#[derive(Debug)]
pub struct ConfigDir {
    dir: TempDir,
    clock: SystemTime,
}

impl ConfigDir {
    /// A directory seeded with the fixture texts.
    pub fn new() -> io::Result<Self> {
        Self::with(CONTROLLERS_TOML, OPTIMIZERS_TOML, COST_FUNCTIONS_TOML)
    }

    pub fn with(controllers: &str, optimizers: &str, cost_functions: &str) -> io::Result<Self> {
        let mut dir = Self {
            dir: TempDir::new()?,
            clock: SystemTime::now(),
        };
        dir.write(CONTROLLERS_FILE, controllers)?;
        dir.write(OPTIMIZERS_FILE, optimizers)?;
        dir.write(COST_FUNCTIONS_FILE, cost_functions)?;
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Overwrite `name` and advance its modification time.
    pub fn write(&mut self, name: &str, text: &str) -> io::Result<()> {
        let path = self.file(name);
        std::fs::write(&path, text)?;
        self.clock += Duration::from_secs(1);
        File::options().write(true).open(&path)?.set_modified(self.clock)
    }

    /// Replace the first occurrence of `from` with `to` inside `name`.
    pub fn edit(&mut self, name: &str, from: &str, to: &str) -> io::Result<()> {
        let text = std::fs::read_to_string(self.file(name))?;
        if !text.contains(from) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{from:?} not found in {name}"),
            ));
        }
        self.write(name, &text.replacen(from, to, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recede_core::config::{ConfigSet, LqrConfig};

    #[test]
    fn fixtures_parse() {
        let set = ConfigSet::parse(CONTROLLERS_TOML, OPTIMIZERS_TOML, COST_FUNCTIONS_TOML).unwrap();
        assert_eq!(
            set.controller.predictor_specification.as_deref(),
            Some("double_integrator")
        );
        let lqr: LqrConfig = set.optimizer_section("lqr").unwrap();
        assert_eq!(lqr.mpc_horizon, 10);
        assert_eq!(lqr.solver, "clarabel");
    }

    #[test]
    fn stub_solver_name_is_substituted() {
        let set =
            ConfigSet::parse(CONTROLLERS_TOML, &stub_optimizers_toml("stub"), COST_FUNCTIONS_TOML)
                .unwrap();
        let lqr: LqrConfig = set.optimizer_section("lqr").unwrap();
        assert_eq!(lqr.solver, "stub");
    }

    #[test]
    fn edits_advance_modification_time() {
        let mut dir = ConfigDir::new().unwrap();
        let path = dir.file(OPTIMIZERS_FILE);
        let before = std::fs::metadata(&path).unwrap().modified().unwrap();

        dir.edit(OPTIMIZERS_FILE, "P = 5.0", "P = 7.0").unwrap();

        let after = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert!(after > before);
        assert!(std::fs::read_to_string(&path).unwrap().contains("P = 7.0"));
        assert!(dir.edit(OPTIMIZERS_FILE, "missing", "x").is_err());
    }
}
