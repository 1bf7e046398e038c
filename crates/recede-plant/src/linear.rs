//! Linear time-invariant plant `ẋ = A x + B u`.

use nalgebra::{DMatrix, DVector};
use recede_core::error::ConfigError;
use recede_core::traits::PlantModel;

/// LTI plant with fixed continuous-time matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearPlant {
    name: String,
    a: DMatrix<f64>,
    b: DMatrix<f64>,
}

impl LinearPlant {
    /// Build from `A` (nx × nx) and `B` (nx × nu).
    pub fn new(
        name: impl Into<String>,
        a: DMatrix<f64>,
        b: DMatrix<f64>,
    ) -> Result<Self, ConfigError> {
        if !a.is_square() || a.nrows() == 0 {
            return Err(ConfigError::invalid(
                "A",
                format!("must be square and non-empty, got {:?}", a.shape()),
            ));
        }
        if b.nrows() != a.nrows() || b.ncols() == 0 {
            return Err(ConfigError::invalid(
                "B",
                format!("expected {} rows and >= 1 column, got {:?}", a.nrows(), b.shape()),
            ));
        }
        Ok(Self {
            name: name.into(),
            a,
            b,
        })
    }

    /// Double integrator: `A = [[0, 1], [0, 0]]`, `B = [[0], [1]]`.
    pub fn double_integrator() -> Self {
        Self {
            name: "double_integrator".into(),
            a: DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]),
            b: DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
        }
    }

    pub const fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub const fn b(&self) -> &DMatrix<f64> {
        &self.b
    }
}

impl PlantModel for LinearPlant {
    fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    fn action_dim(&self) -> usize {
        self.b.ncols()
    }

    fn derivative(&self, state: &DVector<f64>, action: &DVector<f64>) -> DVector<f64> {
        &self.a * state + &self.b * action
    }

    fn jacobian(&self, _state: &DVector<f64>, _action: &DVector<f64>) -> DMatrix<f64> {
        let nx = self.state_dim();
        let mut jac = DMatrix::zeros(nx, nx + self.action_dim());
        jac.view_mut((0, 0), self.a.shape()).copy_from(&self.a);
        jac.view_mut((0, nx), self.b.shape()).copy_from(&self.b);
        jac
    }

    fn name(&self) -> &str {
        &self.name
    }
}
