//! Continuous-to-discrete conversion of a linearized plant.
//!
//! The plant Jacobian describes `ẋ ≈ A_c x + B_c u` about the current state.
//! The horizon QP needs the one-step map `x⁺ = A_d x + B_d u` at the control
//! timestep, so every linearization goes through one of these before it is
//! written into the stage couplings.

use nalgebra::DMatrix;
use recede_core::config::Discretization;

/// Discretize `(A_c, B_c)` with the selected method.
pub fn discretize(
    method: Discretization,
    a_c: &DMatrix<f64>,
    b_c: &DMatrix<f64>,
    dt: f64,
) -> (DMatrix<f64>, DMatrix<f64>) {
    match method {
        Discretization::Euler => discretize_euler(a_c, b_c, dt),
        Discretization::MatrixExp => discretize_matrix_exp(a_c, b_c, dt),
    }
}

/// Forward Euler: `A_d = I + A_c dt`, `B_d = B_c dt`.
pub fn discretize_euler(
    a_c: &DMatrix<f64>,
    b_c: &DMatrix<f64>,
    dt: f64,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let n = a_c.nrows();
    (DMatrix::identity(n, n) + a_c * dt, b_c * dt)
}

/// Zero-order hold through the augmented exponential:
///
/// ```text
/// [A_d  B_d]        ( [A_c  B_c]      )
/// [ 0    I ]  = expm( [ 0    0 ] · dt )
/// ```
pub fn discretize_matrix_exp(
    a_c: &DMatrix<f64>,
    b_c: &DMatrix<f64>,
    dt: f64,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let nx = a_c.nrows();
    let nu = b_c.ncols();

    let mut aug = DMatrix::zeros(nx + nu, nx + nu);
    aug.view_mut((0, 0), (nx, nx)).copy_from(a_c);
    aug.view_mut((0, nx), (nx, nu)).copy_from(b_c);
    aug *= dt;

    let e = matrix_exp(&aug);
    (
        e.view((0, 0), (nx, nx)).clone_owned(),
        e.view((0, nx), (nx, nu)).clone_owned(),
    )
}

/// `e^M` by scaling and squaring around a truncated Taylor series.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn matrix_exp(m: &DMatrix<f64>) -> DMatrix<f64> {
    let n = m.nrows();

    // Halve until the infinity norm is below one.
    let norm_inf = m
        .row_iter()
        .map(|row| row.iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0_f64, f64::max);
    let squarings = if norm_inf > 1.0 {
        (norm_inf.log2().ceil() as i32).max(1)
    } else {
        0
    };
    let scaled = m / 2.0_f64.powi(squarings);

    let mut sum = DMatrix::identity(n, n);
    let mut term = DMatrix::identity(n, n);
    for k in 1..=13_u32 {
        term = &term * &scaled / f64::from(k);
        sum += &term;
        if term.amax() < 1e-16 {
            break;
        }
    }

    for _ in 0..squarings {
        sum = &sum * &sum;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn double_integrator() -> (DMatrix<f64>, DMatrix<f64>) {
        (
            DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]),
            DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
        )
    }

    #[test]
    fn euler_is_identity_at_zero_dt() {
        let (a, b) = double_integrator();
        let (a_d, b_d) = discretize_euler(&a, &b, 0.0);
        assert_relative_eq!(a_d, DMatrix::identity(2, 2), epsilon = 1e-12);
        assert_relative_eq!(b_d, DMatrix::zeros(2, 1), epsilon = 1e-12);
    }

    #[test]
    fn matrix_exp_of_zero_is_identity() {
        let e = matrix_exp(&DMatrix::zeros(4, 4));
        assert_relative_eq!(e, DMatrix::identity(4, 4), epsilon = 1e-14);
    }

    #[test]
    fn matrix_exp_scalar_and_large_norm() {
        let one = DMatrix::from_element(1, 1, 1.0);
        assert_relative_eq!(matrix_exp(&one)[(0, 0)], std::f64::consts::E, epsilon = 1e-10);

        let three = DMatrix::from_element(1, 1, 3.0);
        assert_relative_eq!(matrix_exp(&three)[(0, 0)], 3.0_f64.exp(), epsilon = 1e-8);
    }

    #[test]
    fn zoh_double_integrator_is_exact() {
        // A_d = [[1, dt], [0, 1]], B_d = [[dt²/2], [dt]]
        let (a, b) = double_integrator();
        let dt = 0.1;
        let (a_d, b_d) = discretize_matrix_exp(&a, &b, dt);
        assert_relative_eq!(
            a_d,
            DMatrix::from_row_slice(2, 2, &[1.0, dt, 0.0, 1.0]),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            b_d,
            DMatrix::from_row_slice(2, 1, &[dt * dt / 2.0, dt]),
            epsilon = 1e-12
        );
    }

    #[test]
    fn euler_and_zoh_agree_for_small_dt() {
        let (a, b) = double_integrator();
        let (a_e, b_e) = discretize(Discretization::Euler, &a, &b, 0.01);
        let (a_z, b_z) = discretize(Discretization::MatrixExp, &a, &b, 0.01);
        assert_relative_eq!(a_e, a_z, epsilon = 1e-12);
        assert_relative_eq!(b_e, b_z, epsilon = 1e-4);
    }
}
