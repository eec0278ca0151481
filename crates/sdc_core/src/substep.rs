use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::autodiff::Dual;
use crate::error::SdcError;
use crate::traits::{OdeSystem, SubstepSolver};

/// Relative tolerance below which an implicit-Euler denominator counts as
/// singular.
const SINGULAR_EPS: f64 = 1e-12;

/// Closed-form substep solver for `f(t, y) = Λy` with scalar or diagonal `Λ`.
///
/// Implicit Euler reduces to a per-component division,
/// `z = r / (1 − dt·λ)`, for both the prediction and the error equation.
/// This is the literal reference behavior of the method; general right-hand
/// sides go through [`NewtonSubstep`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSubstep {
    lambda: Vec<f64>,
}

impl LinearSubstep {
    /// One rate shared by every component.
    pub fn scalar(lambda: f64) -> Self {
        Self {
            lambda: vec![lambda],
        }
    }

    /// One rate per component.
    pub fn diagonal(lambda: Vec<f64>) -> Self {
        Self { lambda }
    }

    fn rate(&self, component: usize) -> f64 {
        if self.lambda.len() == 1 {
            self.lambda[0]
        } else {
            self.lambda[component]
        }
    }

    fn divide(
        &self,
        dt: f64,
        node_index: usize,
        r: &[f64],
        z: &mut [f64],
    ) -> Result<(), SdcError> {
        if self.lambda.len() != 1 && self.lambda.len() != r.len() {
            return Err(SdcError::invalid(format!(
                "diagonal rate has {} entries but the state has {}",
                self.lambda.len(),
                r.len()
            )));
        }
        for c in 0..r.len() {
            let scaled = dt * self.rate(c);
            let denom = 1.0 - scaled;
            if denom.abs() <= SINGULAR_EPS * scaled.abs().max(1.0) {
                return Err(SdcError::SingularSubstep { node_index, dt });
            }
            z[c] = r[c] / denom;
        }
        Ok(())
    }
}

impl<S> SubstepSolver<S> for LinearSubstep {
    fn substep(
        &self,
        _system: &S,
        _t: f64,
        dt: f64,
        node_index: usize,
        r: &[f64],
        z: &mut [f64],
    ) -> Result<(), SdcError> {
        self.divide(dt, node_index, r, z)
    }

    // The Jacobian of a linear right-hand side is the rate itself, so the
    // correction relation is the same division.
    fn correction_substep(
        &self,
        _system: &S,
        _t: f64,
        dt: f64,
        node_index: usize,
        _y: &[f64],
        r: &[f64],
        z: &mut [f64],
    ) -> Result<(), SdcError> {
        self.divide(dt, node_index, r, z)
    }
}

/// Iteration bounds for the Newton substep solver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            tolerance: 1e-12,
        }
    }
}

/// Newton substep solver for general right-hand sides.
///
/// The prediction substep runs a full Newton iteration on
/// `g(z) = z − dt·f(t, z) − r`; the correction substep is a single linear
/// solve against the Jacobian frozen at the current trace value. Jacobians
/// come from dual-number forward differentiation, so the system only needs
/// an [`OdeSystem`] implementation for [`Dual`] alongside `f64`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NewtonSubstep {
    pub settings: NewtonSettings,
}

impl NewtonSubstep {
    pub fn new(settings: NewtonSettings) -> Self {
        Self { settings }
    }
}

impl<S> SubstepSolver<S> for NewtonSubstep
where
    S: OdeSystem<f64> + OdeSystem<Dual>,
{
    fn substep(
        &self,
        system: &S,
        t: f64,
        dt: f64,
        node_index: usize,
        r: &[f64],
        z: &mut [f64],
    ) -> Result<(), SdcError> {
        let dim = r.len();
        // The dt → 0 limit of the substep relation is z = r.
        z.copy_from_slice(r);

        let mut f = vec![0.0; dim];
        let mut g = DVector::zeros(dim);
        let mut residual = f64::INFINITY;
        for iteration in 0..self.settings.max_steps {
            OdeSystem::<f64>::eval(system, t, z, &mut f);
            residual = 0.0;
            for c in 0..dim {
                g[c] = z[c] - dt * f[c] - r[c];
                residual = residual.max(g[c].abs());
            }
            if !residual.is_finite() {
                return Err(SdcError::LinearizationFailure {
                    node_index,
                    iterations: iteration,
                    residual,
                });
            }
            if residual <= self.settings.tolerance {
                return Ok(());
            }

            let newton_matrix = substep_matrix(system, t, dt, z, node_index, iteration)?;
            let delta = newton_matrix
                .lu()
                .solve(&g)
                .ok_or(SdcError::SingularSubstep { node_index, dt })?;
            for c in 0..dim {
                z[c] -= delta[c];
            }
        }

        Err(SdcError::LinearizationFailure {
            node_index,
            iterations: self.settings.max_steps,
            residual,
        })
    }

    fn correction_substep(
        &self,
        system: &S,
        t: f64,
        dt: f64,
        node_index: usize,
        y: &[f64],
        r: &[f64],
        z: &mut [f64],
    ) -> Result<(), SdcError> {
        let matrix = substep_matrix(system, t, dt, y, node_index, 0)?;
        let rhs = DVector::from_column_slice(r);
        let solution = matrix
            .lu()
            .solve(&rhs)
            .ok_or(SdcError::SingularSubstep { node_index, dt })?;
        z.copy_from_slice(solution.as_slice());
        Ok(())
    }
}

/// Assembles `I − dt·J(t, y)` with the Jacobian computed column-by-column
/// from dual-number seeding.
fn substep_matrix<S>(
    system: &S,
    t: f64,
    dt: f64,
    y: &[f64],
    node_index: usize,
    iterations: usize,
) -> Result<DMatrix<f64>, SdcError>
where
    S: OdeSystem<Dual>,
{
    let dim = y.len();
    let mut matrix = DMatrix::identity(dim, dim);
    let mut dual_y = vec![Dual::constant(0.0); dim];
    let mut dual_out = vec![Dual::constant(0.0); dim];
    let t_dual = Dual::constant(t);

    for j in 0..dim {
        for i in 0..dim {
            dual_y[i] = Dual::new(y[i], if i == j { 1.0 } else { 0.0 });
        }
        system.eval(t_dual, &dual_y, &mut dual_out);
        for i in 0..dim {
            let derivative = dual_out[i].du;
            if !derivative.is_finite() {
                return Err(SdcError::LinearizationFailure {
                    node_index,
                    iterations,
                    residual: derivative,
                });
            }
            matrix[(i, j)] -= dt * derivative;
        }
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Scalar;

    struct Decay {
        lambda: f64,
    }

    impl<T: Scalar> OdeSystem<T> for Decay {
        fn dimension(&self) -> usize {
            1
        }
        fn eval(&self, _t: T, y: &[T], out: &mut [T]) {
            out[0] = T::from_f64(self.lambda).unwrap() * y[0];
        }
    }

    struct Cubic;

    impl<T: Scalar> OdeSystem<T> for Cubic {
        fn dimension(&self) -> usize {
            1
        }
        fn eval(&self, _t: T, y: &[T], out: &mut [T]) {
            out[0] = -(y[0] * y[0] * y[0]);
        }
    }

    #[test]
    fn test_linear_substep_closed_form() {
        let solver = LinearSubstep::scalar(-100.0);
        let system = Decay { lambda: -100.0 };
        let mut z = [0.0];
        solver.substep(&system, 0.1, 0.02, 0, &[1.0], &mut z).unwrap();
        assert!((z[0] - 1.0 / 3.0).abs() < 1e-15);
    }

    #[test]
    fn test_linear_substep_detects_singularity() {
        let dt = 0.05;
        let solver = LinearSubstep::scalar(1.0 / dt);
        let system = Decay { lambda: 1.0 / dt };
        let mut z = [0.0];
        let err = solver
            .substep(&system, 0.0, dt, 3, &[1.0], &mut z)
            .unwrap_err();
        assert!(matches!(err, SdcError::SingularSubstep { node_index: 3, .. }));
    }

    #[test]
    fn test_diagonal_rate_shape_mismatch() {
        let solver = LinearSubstep::diagonal(vec![-1.0, -2.0]);
        let system = Decay { lambda: -1.0 };
        let mut z = [0.0; 3];
        let err = solver
            .substep(&system, 0.0, 0.1, 0, &[1.0, 1.0, 1.0], &mut z)
            .unwrap_err();
        assert!(matches!(err, SdcError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_newton_matches_linear_closed_form() {
        let system = Decay { lambda: -7.5 };
        let newton = NewtonSubstep::default();
        let linear = LinearSubstep::scalar(-7.5);
        let mut z_newton = [0.0];
        let mut z_linear = [0.0];
        newton
            .substep(&system, 0.4, 0.13, 1, &[0.8], &mut z_newton)
            .unwrap();
        linear
            .substep(&system, 0.4, 0.13, 1, &[0.8], &mut z_linear)
            .unwrap();
        assert!((z_newton[0] - z_linear[0]).abs() < 1e-12);
    }

    #[test]
    fn test_newton_solves_nonlinear_substep() {
        let system = Cubic;
        let newton = NewtonSubstep::default();
        let dt = 0.1;
        let r = [1.0];
        let mut z = [0.0];
        newton.substep(&system, 0.0, dt, 0, &r, &mut z).unwrap();
        // z must satisfy z + dt*z^3 = r.
        let defect = z[0] + dt * z[0].powi(3) - r[0];
        assert!(defect.abs() < 1e-12, "defect = {defect}");
    }

    #[test]
    fn test_newton_reports_nonconvergence() {
        let system = Cubic;
        let newton = NewtonSubstep::new(NewtonSettings {
            max_steps: 1,
            tolerance: 1e-15,
        });
        let mut z = [0.0];
        let err = newton
            .substep(&system, 0.0, 0.5, 2, &[2.0], &mut z)
            .unwrap_err();
        assert!(matches!(err, SdcError::LinearizationFailure { .. }));
    }
}
