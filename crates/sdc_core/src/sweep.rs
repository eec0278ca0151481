use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::SdcError;
use crate::quadrature::CollocationGrid;
use crate::traits::{OdeSystem, SubstepSolver};

/// Settings controlling the deferred-correction loop.
///
/// `sweeps` is the fixed correction count `J`; each sweep raises the formal
/// order by one until the collocation accuracy of the node set saturates.
/// When `residual_tolerance` is set, the loop stops early once the
/// collocation residual measured at the start of a sweep drops below it
/// (that sweep still applies its correction).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SweepSettings {
    pub sweeps: usize,
    #[serde(default)]
    pub residual_tolerance: Option<f64>,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            sweeps: 5,
            residual_tolerance: None,
        }
    }
}

/// Result of one `solve` call.
///
/// Both the corrected trace and the implicit-Euler prediction are exposed so
/// callers can report the accuracy gained by sweeping. `residual_norm` is
/// the sup-norm of the collocation residual measured during the last sweep
/// (infinite when no sweep ran).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdcSolution {
    pub nodes: Vec<f64>,
    pub trace: Vec<Vec<f64>>,
    pub prediction: Vec<Vec<f64>>,
    pub sweeps_performed: usize,
    pub residual_norm: f64,
}

/// Spectral deferred correction sweep engine.
///
/// Owns an immutable [`CollocationGrid`] and drives the two phases over it:
/// an implicit-Euler prediction across the anchored node sequence, then `J`
/// correction sweeps that each solve the error equation against the
/// spectral integration matrix. Every `solve` call owns its trace and
/// transient vectors exclusively; the grid is shared read-only.
#[derive(Debug, Clone)]
pub struct SdcSolver {
    grid: CollocationGrid,
    settings: SweepSettings,
}

impl SdcSolver {
    pub fn new(grid: CollocationGrid, settings: SweepSettings) -> Self {
        Self { grid, settings }
    }

    /// Builds the grid and the solver in one step.
    pub fn build(
        m: usize,
        t_start: f64,
        t_end: f64,
        settings: SweepSettings,
    ) -> Result<Self, SdcError> {
        Ok(Self::new(CollocationGrid::build(m, t_start, t_end)?, settings))
    }

    pub fn grid(&self) -> &CollocationGrid {
        &self.grid
    }

    pub fn settings(&self) -> SweepSettings {
        self.settings
    }

    /// Initial low-order trace: one implicit-Euler substep per node gap,
    /// `z − dt_i·f(nodes[i+1], z) = y[i]`, swept left to right.
    pub fn predict<S, P>(
        &self,
        system: &S,
        stepper: &P,
        y0: &[f64],
    ) -> Result<Vec<Vec<f64>>, SdcError>
    where
        S: OdeSystem<f64>,
        P: SubstepSolver<S>,
    {
        let nodes = self.grid.nodes();
        let mut trace = Vec::with_capacity(nodes.len());
        trace.push(y0.to_vec());
        let mut z = vec![0.0; y0.len()];
        for i in 0..nodes.len() - 1 {
            let dt = nodes[i + 1] - nodes[i];
            stepper.substep(system, nodes[i + 1], dt, i, &trace[i], &mut z)?;
            trace.push(z.clone());
        }
        Ok(trace)
    }

    /// One deferred-correction iteration over `trace`, in place.
    ///
    /// Evaluates the right-hand side at every collocation node, forms the
    /// spectrally accurate integrals `S·F`, measures the collocation
    /// residual `ε` (zero at the anchor by construction), sweeps the error
    /// equation for `δ` with the same substep structure as the predictor,
    /// and applies `y ← y + δ`. Returns the sup-norm of `ε` before the
    /// correction was applied.
    pub fn correction_sweep<S, P>(
        &self,
        system: &S,
        stepper: &P,
        trace: &mut [Vec<f64>],
    ) -> Result<f64, SdcError>
    where
        S: OdeSystem<f64>,
        P: SubstepSolver<S>,
    {
        let m = self.grid.node_count();
        let nodes = self.grid.nodes();
        let collocation = self.grid.collocation_nodes();
        let matrix = self.grid.matrix();
        let dim = trace[0].len();

        let mut f_vals = vec![vec![0.0; dim]; m];
        for k in 0..m {
            system.eval(collocation[k], &trace[k + 1], &mut f_vals[k]);
        }

        // Collocation residual at each node, anchored with epsilon[0] = 0.
        let mut epsilon = vec![vec![0.0; dim]; m + 1];
        let mut norm = 0.0f64;
        for i in 0..m {
            for c in 0..dim {
                let mut integral = 0.0;
                for j in 0..m {
                    integral += matrix[(i, j)] * f_vals[j][c];
                }
                let residual = trace[0][c] + integral - trace[i + 1][c];
                epsilon[i + 1][c] = residual;
                norm = norm.max(residual.abs());
            }
        }

        // Error equation, delta[0] = 0. The substep is linearized around the
        // incoming trace value at the target node.
        let mut delta = vec![vec![0.0; dim]; m + 1];
        let mut rhs = vec![0.0; dim];
        let mut z = vec![0.0; dim];
        for i in 0..m {
            let dt = nodes[i + 1] - nodes[i];
            for c in 0..dim {
                rhs[c] = delta[i][c] + epsilon[i + 1][c] - epsilon[i][c];
            }
            stepper.correction_substep(
                system,
                nodes[i + 1],
                dt,
                i,
                &trace[i + 1],
                &rhs,
                &mut z,
            )?;
            delta[i + 1].copy_from_slice(&z);
        }

        for i in 0..=m {
            for c in 0..dim {
                trace[i][c] += delta[i][c];
            }
        }
        Ok(norm)
    }

    /// Runs the prediction and then the correction sweeps strictly in
    /// sequence, returning both traces.
    pub fn solve<S, P>(
        &self,
        system: &S,
        stepper: &P,
        y0: &[f64],
    ) -> Result<SdcSolution, SdcError>
    where
        S: OdeSystem<f64>,
        P: SubstepSolver<S>,
    {
        if y0.is_empty() {
            return Err(SdcError::invalid("initial value must be non-empty"));
        }
        if y0.len() != system.dimension() {
            return Err(SdcError::invalid(format!(
                "initial value has {} components but the system has dimension {}",
                y0.len(),
                system.dimension()
            )));
        }
        if y0.iter().any(|v| !v.is_finite()) {
            return Err(SdcError::invalid("initial value must be finite"));
        }

        let prediction = self.predict(system, stepper, y0)?;
        let mut trace = prediction.clone();

        let mut sweeps_performed = 0;
        let mut residual_norm = f64::INFINITY;
        for sweep in 0..self.settings.sweeps {
            residual_norm = self.correction_sweep(system, stepper, &mut trace)?;
            sweeps_performed += 1;
            debug!(
                "sweep {}: collocation residual sup-norm {:.3e}",
                sweep + 1,
                residual_norm
            );
            if let Some(tolerance) = self.settings.residual_tolerance {
                if residual_norm <= tolerance {
                    break;
                }
            }
        }

        Ok(SdcSolution {
            nodes: self.grid.nodes().to_vec(),
            trace,
            prediction,
            sweeps_performed,
            residual_norm,
        })
    }
}
