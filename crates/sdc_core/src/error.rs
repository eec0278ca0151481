use thiserror::Error;

/// Errors surfaced by grid construction and the sweep engine.
///
/// A failure inside a sweep aborts the whole `solve` call; no partial
/// recovery is attempted mid-sweep.
#[derive(Debug, Error)]
pub enum SdcError {
    /// Bad `(m, t_start, t_end)` or mismatched problem shape at setup time.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// The implicit-Euler denominator (or Newton matrix) is singular for a
    /// substep. Retrying with the same inputs cannot succeed; the caller
    /// must alter the time discretization or the stiffness parameter.
    #[error("singular implicit substep at node {node_index} (dt = {dt:e})")]
    SingularSubstep { node_index: usize, dt: f64 },

    /// Newton failed to converge within the bounded iteration count while
    /// linearizing the right-hand side. The caller may retry with a finer
    /// discretization.
    #[error(
        "linearization failed at node {node_index} after {iterations} iterations \
         (residual = {residual:e})"
    )]
    LinearizationFailure {
        node_index: usize,
        iterations: usize,
        residual: f64,
    },
}

impl SdcError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        SdcError::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}
