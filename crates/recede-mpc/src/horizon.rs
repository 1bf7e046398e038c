//! Assembles the multistage QP, reusing structure between ticks.
//!
//! Hessians and bounds only depend on the [`ControlProblem`], so they are
//! built once and kept until the structural signature changes or a weight or
//! bound is updated. Each tick then only rewrites the stage couplings and the
//! first right-hand side.

use nalgebra::{DMatrix, DVector};
use recede_core::error::ConfigError;
use tracing::debug;

use crate::types::{
    ControlProblem, HorizonProblem, LinearizationSample, StageBlock, StructuralSignature,
};

/// Owns the [`ControlProblem`] and the cached [`HorizonProblem`] built from it.
#[derive(Debug, Clone)]
pub struct HorizonAssembler {
    problem: ControlProblem,
    cached: Option<HorizonProblem>,
    stale: bool,
    rebuilds: u64,
}

impl HorizonAssembler {
    pub const fn new(problem: ControlProblem) -> Self {
        Self {
            problem,
            cached: None,
            stale: true,
            rebuilds: 0,
        }
    }

    pub const fn problem(&self) -> &ControlProblem {
        &self.problem
    }

    /// The problem assembled by the last [`assemble`](Self::assemble) call.
    pub const fn last(&self) -> Option<&HorizonProblem> {
        self.cached.as_ref()
    }

    /// How many times the stage structure has been built from scratch.
    pub const fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn set_state_weight(&mut self, value: f64) -> Result<(), ConfigError> {
        self.problem.set_state_weight(value)?;
        self.stale = true;
        Ok(())
    }

    pub fn set_action_weight(&mut self, value: f64) -> Result<(), ConfigError> {
        self.problem.set_action_weight(value)?;
        self.stale = true;
        Ok(())
    }

    pub fn set_action_max(&mut self, value: f64) -> Result<(), ConfigError> {
        self.problem.set_action_max(value)?;
        self.stale = true;
        Ok(())
    }

    /// Write `sample` and `x0` into the horizon problem and return it.
    ///
    /// The sample must match the problem dimensions; the caller is expected
    /// to have checked the Jacobian shape already.
    pub fn assemble(&mut self, sample: LinearizationSample, x0: &DVector<f64>) -> &HorizonProblem {
        let signature = self.problem.signature();
        let reuse = !self.stale
            && self
                .cached
                .as_ref()
                .is_some_and(|cached| cached.signature == signature);

        let mut horizon = match self.cached.take() {
            Some(cached) if reuse => cached,
            _ => {
                self.rebuilds += 1;
                self.stale = false;
                debug!(rebuilds = self.rebuilds, ?signature, "rebuilding horizon structure");
                self.build_structure(signature, sample.clone())
            }
        };

        let intra = sample.intra_stage();
        let coupling = sample.coupling();
        let last = horizon.stages.len() - 1;
        for (i, stage) in horizon.stages.iter_mut().enumerate() {
            stage.intra.copy_from(&intra);
            stage.coupling_to_next = (i < last).then(|| coupling.clone());
        }
        horizon.stages[0].rhs = -(&sample.a * x0);
        horizon.linearization = sample;

        self.cached.insert(horizon)
    }

    fn build_structure(
        &self,
        signature: StructuralSignature,
        sample: LinearizationSample,
    ) -> HorizonProblem {
        let nx = signature.state_dim;
        let n = signature.stage_dim();
        let stage = StageBlock {
            hessian: self.problem.stage_hessian(),
            linear: DVector::zeros(n),
            lower: self.problem.stage_lower(),
            upper: self.problem.stage_upper(),
            intra: DMatrix::zeros(nx, n),
            coupling_to_next: None,
            rhs: DVector::zeros(nx),
        };
        HorizonProblem {
            signature,
            stages: vec![stage; signature.horizon],
            linearization: sample,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use recede_core::config::LqrConfig;

    fn assembler() -> HorizonAssembler {
        let problem = ControlProblem::from_config(&LqrConfig::default(), 2, 1).unwrap();
        HorizonAssembler::new(problem)
    }

    fn sample(a01: f64) -> LinearizationSample {
        LinearizationSample {
            a: DMatrix::from_row_slice(2, 2, &[1.0, a01, 0.0, 1.0]),
            b: DMatrix::from_row_slice(2, 1, &[0.0, 0.02]),
        }
    }

    #[test]
    fn first_rhs_is_minus_a_x0_and_rest_zero() {
        let mut asm = assembler();
        let x0 = DVector::from_vec(vec![0.1, 0.5]);
        let hp = asm.assemble(sample(0.02), &x0);

        assert_relative_eq!(hp.first_rhs()[0], -(0.1 + 0.02 * 0.5), epsilon = 1e-12);
        assert_relative_eq!(hp.first_rhs()[1], -0.5, epsilon = 1e-12);
        for stage in &hp.stages()[1..] {
            assert_eq!(stage.rhs, DVector::zeros(2));
        }
    }

    #[test]
    fn last_stage_has_no_outgoing_coupling() {
        let mut asm = assembler();
        let hp = asm.assemble(sample(0.02), &DVector::zeros(2));
        let n = hp.stages().len();
        assert_eq!(n, 10);
        assert!(hp.stages()[..n - 1].iter().all(|s| s.coupling_to_next.is_some()));
        assert!(hp.stages()[n - 1].coupling_to_next.is_none());
    }

    #[test]
    fn structure_is_reused_across_ticks() {
        let mut asm = assembler();
        asm.assemble(sample(0.02), &DVector::zeros(2));
        asm.assemble(sample(0.04), &DVector::from_vec(vec![1.0, 0.0]));
        assert_eq!(asm.rebuilds(), 1);

        let hp = asm.last().unwrap();
        assert_relative_eq!(hp.linearization().a[(0, 1)], 0.04);
        let c = hp.stages()[0].coupling_to_next.as_ref().unwrap();
        assert_relative_eq!(c[(0, 2)], 0.04);
    }

    #[test]
    fn weight_update_rebuilds_hessians() {
        let mut asm = assembler();
        asm.assemble(sample(0.02), &DVector::zeros(2));
        asm.set_state_weight(7.0).unwrap();
        let hp = asm.assemble(sample(0.02), &DVector::zeros(2));

        for stage in hp.stages() {
            assert_relative_eq!(stage.hessian[(1, 1)], 7.0);
            assert_relative_eq!(stage.hessian[(2, 2)], 7.0);
            assert_relative_eq!(stage.hessian[(0, 0)], 1.0);
        }
        assert_eq!(asm.rebuilds(), 2);
    }

    #[test]
    fn rejected_update_keeps_structure() {
        let mut asm = assembler();
        asm.assemble(sample(0.02), &DVector::zeros(2));
        assert!(asm.set_action_weight(0.0).is_err());
        asm.assemble(sample(0.02), &DVector::zeros(2));
        assert_eq!(asm.rebuilds(), 1);
    }

    #[test]
    fn action_max_update_moves_bounds() {
        let mut asm = assembler();
        asm.set_action_max(0.5).unwrap();
        let hp = asm.assemble(sample(0.02), &DVector::zeros(2));
        for stage in hp.stages() {
            assert_relative_eq!(stage.lower[0], -0.5);
            assert_relative_eq!(stage.upper[0], 0.5);
        }
    }
}
