//! Spectral deferred correction (SDC) time integration.
//!
//! A high-order solver for stiff initial-value problems on a single time
//! interval: Gauss–Legendre collocation nodes and a spectral integration
//! matrix are built once ([`quadrature::CollocationGrid`]), then the sweep
//! engine ([`sweep::SdcSolver`]) produces an implicit-Euler prediction and
//! refines it with deferred-correction sweeps toward the collocation
//! solution. The implicit substep is a pluggable capability
//! ([`traits::SubstepSolver`]): closed-form division for linear problems,
//! dual-number Newton for general right-hand sides.

pub mod autodiff;
pub mod error;
pub mod quadrature;
pub mod substep;
pub mod sweep;
pub mod traits;

pub use autodiff::Dual;
pub use error::SdcError;
pub use quadrature::CollocationGrid;
pub use substep::{LinearSubstep, NewtonSettings, NewtonSubstep};
pub use sweep::{SdcSolution, SdcSolver, SweepSettings};
pub use traits::{OdeSystem, Scalar, SubstepSolver};
