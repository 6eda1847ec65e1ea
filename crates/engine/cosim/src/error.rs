//! Error type of the co-simulation layer.

use terracosim_core::ConfigError;
use terracosim_network::NetworkError;
use terracosim_physics::SolverError;
use thiserror::Error;

/// Fatal conditions of a node or of the whole run.
///
/// Nothing here is retried; every variant ends the run for the node that
/// reports it, and transport failures end it for everyone.
#[derive(Error, Debug)]
pub enum CosimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The caller broke the node lifecycle (advance before construct,
    /// unknown wheel on update, ...).
    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("solver failure: {0}")]
    Solver(#[from] SolverError),

    #[error("transport failure: {0}")]
    Transport(#[from] NetworkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output error: {0}")]
    Csv(#[from] csv::Error),

    /// A rank thread panicked or could not be joined.
    #[error("rank {rank} failed: {reason}")]
    Rank { rank: usize, reason: String },
}

impl CosimError {
    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CosimError>;
