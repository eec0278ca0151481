use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

use crate::error::SdcError;

/// A trait for types the solver can run its arithmetic on.
/// Covers plain floats and dual numbers, so the same right-hand side
/// definition serves both evaluation and differentiation.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Right-hand side of an initial-value problem `y' = f(t, y)`.
///
/// Implementing this for both `f64` and [`crate::autodiff::Dual`] lets the
/// Newton substep solver obtain Jacobians without a hand-written derivative.
pub trait OdeSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates `f(t, y)` into `out`.
    fn eval(&self, t: T, y: &[T], out: &mut [T]);
}

/// The implicit substep capability the sweep engine depends on.
///
/// Both the predictor and the error-equation sweep go through this seam, so
/// the closed-form inversion for linear problems and the Newton solver for
/// general right-hand sides are interchangeable.
pub trait SubstepSolver<S> {
    /// Solves the implicit-Euler relation `z − dt·f(t, z) = r` for `z`.
    ///
    /// `node_index` identifies the substep for error reporting only.
    fn substep(
        &self,
        system: &S,
        t: f64,
        dt: f64,
        node_index: usize,
        r: &[f64],
        z: &mut [f64],
    ) -> Result<(), SdcError>;

    /// Solves the linearized correction relation `(I − dt·J(t, y))·z = r`,
    /// where `J` is the Jacobian of `f` at the current trace value `y`.
    fn correction_substep(
        &self,
        system: &S,
        t: f64,
        dt: f64,
        node_index: usize,
        y: &[f64],
        r: &[f64],
        z: &mut [f64],
    ) -> Result<(), SdcError>;
}
