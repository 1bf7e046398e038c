//! Cart-pole plant with CartPole-v1 parameters.
//!
//! State is `[x, ẋ, θ, θ̇]` with `θ = 0` upright; the single action is a
//! normalized force in `[-1, 1]`, scaled by [`CartPoleParams::force_mag`].
//!
//! Equations of motion (frictionless, point-mass pole at half-length `l`):
//!
//! ```text
//! temp = (F + m_p l θ̇² sin θ) / M
//! θ̈    = (g sin θ - cos θ · temp) / (l (4/3 - m_p cos² θ / M))
//! ẍ    = temp - m_p l θ̈ cos θ / M
//! ```
//!
//! where `M = m_c + m_p`.

use nalgebra::{DMatrix, DVector};
use recede_core::traits::PlantModel;

/// Physical parameters of the cart-pole.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartPoleParams {
    /// Cart mass in kg.
    pub cart_mass: f64,
    /// Pole mass in kg.
    pub pole_mass: f64,
    /// Distance from pivot to pole centre of mass in meters.
    pub half_length: f64,
    /// Gravitational acceleration magnitude (positive).
    pub gravity: f64,
    /// Force in N produced by a unit action.
    pub force_mag: f64,
}

impl Default for CartPoleParams {
    fn default() -> Self {
        // CartPole-v1
        Self {
            cart_mass: 1.0,
            pole_mass: 0.1,
            half_length: 0.5,
            gravity: 9.8,
            force_mag: 10.0,
        }
    }
}

/// Cart-pole plant model with an analytic Jacobian.
#[derive(Debug, Clone, Default)]
pub struct CartPole {
    params: CartPoleParams,
}

/// Intermediate terms shared by the dynamics and their derivatives.
struct Terms {
    sin: f64,
    cos: f64,
    temp: f64,
    den: f64,
    theta_acc: f64,
    x_acc: f64,
}

impl CartPole {
    pub const STATE_DIM: usize = 4;
    pub const ACTION_DIM: usize = 1;

    pub const fn new(params: CartPoleParams) -> Self {
        Self { params }
    }

    pub const fn params(&self) -> &CartPoleParams {
        &self.params
    }

    fn total_mass(&self) -> f64 {
        self.params.cart_mass + self.params.pole_mass
    }

    fn terms(&self, state: &DVector<f64>, action: &DVector<f64>) -> Terms {
        let p = &self.params;
        let m = self.total_mass();
        let (theta, omega) = (state[2], state[3]);
        let force = p.force_mag * action[0];
        let (sin, cos) = theta.sin_cos();

        let temp = (force + p.pole_mass * p.half_length * omega * omega * sin) / m;
        let den = p.half_length * (4.0 / 3.0 - p.pole_mass * cos * cos / m);
        let theta_acc = (p.gravity * sin - cos * temp) / den;
        let x_acc = temp - p.pole_mass * p.half_length * theta_acc * cos / m;

        Terms {
            sin,
            cos,
            temp,
            den,
            theta_acc,
            x_acc,
        }
    }
}

impl PlantModel for CartPole {
    fn state_dim(&self) -> usize {
        Self::STATE_DIM
    }

    fn action_dim(&self) -> usize {
        Self::ACTION_DIM
    }

    fn derivative(&self, state: &DVector<f64>, action: &DVector<f64>) -> DVector<f64> {
        let t = self.terms(state, action);
        DVector::from_vec(vec![state[1], t.x_acc, state[3], t.theta_acc])
    }

    fn jacobian(&self, state: &DVector<f64>, action: &DVector<f64>) -> DMatrix<f64> {
        let p = &self.params;
        let m = self.total_mass();
        let ml = p.pole_mass * p.half_length;
        let omega = state[3];
        let Terms {
            sin,
            cos,
            temp,
            den,
            theta_acc,
            ..
        } = self.terms(state, action);

        // temp partials
        let dtemp_dth = ml * omega * omega * cos / m;
        let dtemp_dw = 2.0 * ml * omega * sin / m;
        let dtemp_df = 1.0 / m;

        // θ̈ = num / den
        let num = p.gravity * sin - cos * temp;
        let dden_dth = p.half_length * 2.0 * p.pole_mass * cos * sin / m;
        let dnum_dth = p.gravity * cos + sin * temp - cos * dtemp_dth;
        let dth_acc_dth = (dnum_dth * den - num * dden_dth) / (den * den);
        let dth_acc_dw = -cos * dtemp_dw / den;
        let dth_acc_df = -cos * dtemp_df / den;

        // ẍ = temp - (m_p l / M) θ̈ cos θ
        let k = ml / m;
        let dx_acc_dth = dtemp_dth - k * (dth_acc_dth * cos - theta_acc * sin);
        let dx_acc_dw = dtemp_dw - k * cos * dth_acc_dw;
        let dx_acc_df = dtemp_df - k * cos * dth_acc_df;

        let mut jac = DMatrix::zeros(Self::STATE_DIM, Self::STATE_DIM + Self::ACTION_DIM);
        jac[(0, 1)] = 1.0;
        jac[(1, 2)] = dx_acc_dth;
        jac[(1, 3)] = dx_acc_dw;
        jac[(1, 4)] = dx_acc_df * p.force_mag;
        jac[(2, 3)] = 1.0;
        jac[(3, 2)] = dth_acc_dth;
        jac[(3, 3)] = dth_acc_dw;
        jac[(3, 4)] = dth_acc_df * p.force_mag;
        jac
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "cartpole"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn finite_difference_jacobian(
        plant: &CartPole,
        state: &DVector<f64>,
        action: &DVector<f64>,
    ) -> DMatrix<f64> {
        let h = 1e-6;
        let nx = state.len();
        let nu = action.len();
        let mut jac = DMatrix::zeros(nx, nx + nu);
        for j in 0..nx + nu {
            let (mut sp, mut sm) = (state.clone(), state.clone());
            let (mut ap, mut am) = (action.clone(), action.clone());
            if j < nx {
                sp[j] += h;
                sm[j] -= h;
            } else {
                ap[j - nx] += h;
                am[j - nx] -= h;
            }
            let col = (plant.derivative(&sp, &ap) - plant.derivative(&sm, &am)) / (2.0 * h);
            jac.set_column(j, &col);
        }
        jac
    }

    #[test]
    fn upright_at_rest_is_equilibrium() {
        let plant = CartPole::default();
        let x = DVector::zeros(4);
        let u = DVector::zeros(1);
        let dx = plant.derivative(&x, &u);
        assert!(dx.norm() < 1e-12);
    }

    #[test]
    fn positive_force_accelerates_cart_and_tips_pole_back() {
        let plant = CartPole::default();
        let x = DVector::zeros(4);
        let u = DVector::from_element(1, 1.0);
        let dx = plant.derivative(&x, &u);
        assert!(dx[1] > 0.0, "cart should accelerate forward");
        assert!(dx[3] < 0.0, "pole should tip backwards");
    }

    #[test]
    fn gravity_destabilizes_tilted_pole() {
        let plant = CartPole::default();
        let x = DVector::from_vec(vec![0.0, 0.0, 0.1, 0.0]);
        let dx = plant.derivative(&x, &DVector::zeros(1));
        assert!(dx[3] > 0.0, "tilt should grow");
    }

    #[test]
    fn analytic_jacobian_matches_finite_differences() {
        let plant = CartPole::default();
        for (state, action) in [
            (vec![0.0, 0.0, 0.0, 0.0], 0.0),
            (vec![0.3, -0.2, 0.15, 0.8], 0.4),
            (vec![-1.0, 1.5, -0.6, -2.0], -0.9),
        ] {
            let x = DVector::from_vec(state);
            let u = DVector::from_element(1, action);
            let analytic = plant.jacobian(&x, &u);
            let numeric = finite_difference_jacobian(&plant, &x, &u);
            assert_eq!(analytic.shape(), (4, 5));
            for (a, n) in analytic.iter().zip(numeric.iter()) {
                assert_relative_eq!(*a, *n, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn upright_linearization_has_known_structure() {
        let plant = CartPole::default();
        let jac = plant.jacobian(&DVector::zeros(4), &DVector::zeros(1));
        let p = plant.params();
        let m = p.cart_mass + p.pole_mass;
        let den = p.half_length * (4.0 / 3.0 - p.pole_mass / m);

        assert_relative_eq!(jac[(0, 1)], 1.0);
        assert_relative_eq!(jac[(2, 3)], 1.0);
        assert_relative_eq!(jac[(3, 2)], p.gravity / den, epsilon = 1e-12);
        assert_relative_eq!(jac[(3, 4)], -p.force_mag / (m * den), epsilon = 1e-12);
    }
}
