//! Solver error types.

use thiserror::Error;

/// Failures inside an engine step.
///
/// Engines do not retry; the owning node reports the failure for the run.
#[derive(Error, Debug)]
pub enum SolverError {
    /// State became NaN or infinite.
    #[error("{engine}: non-finite state at t = {time:.6}")]
    NonFinite { engine: &'static str, time: f64 },

    /// A particle escaped its container or a proxy moved unreasonably fast.
    #[error("{engine}: instability detected: {detail}")]
    Unstable { engine: &'static str, detail: String },

    /// Step size not positive or not finite.
    #[error("{engine}: invalid step size {step}")]
    InvalidStep { engine: &'static str, step: f64 },

    /// A handle or index that the engine does not know.
    #[error("{engine}: unknown proxy {index}")]
    UnknownProxy { engine: &'static str, index: usize },

    /// Engine setup was rejected (empty bed, degenerate mesh, thread pool).
    #[error("{engine}: setup failed: {detail}")]
    Setup { engine: &'static str, detail: String },
}

impl SolverError {
    pub(crate) fn check_step(engine: &'static str, step: f64) -> SolverResult<()> {
        if step.is_finite() && step > 0.0 {
            Ok(())
        } else {
            Err(Self::InvalidStep { engine, step })
        }
    }
}

/// Convenience result type for engine operations.
pub type SolverResult<T> = Result<T, SolverError>;
