//! Network error types.

use std::time::Duration;
use thiserror::Error;

/// Transport errors. Every one of them is fatal to the co-simulation run.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// No message arrived from a peer within the configured timeout.
    #[error("timed out after {waited:?} waiting for rank {source_rank}")]
    Timeout { source_rank: usize, waited: Duration },

    /// The peer endpoint went away.
    #[error("rank {0} disconnected")]
    PeerDisconnected(usize),

    /// The peer aborted the run.
    #[error("rank {rank} aborted: {reason}")]
    Aborted { rank: usize, reason: String },

    /// Rank outside the communicator.
    #[error("invalid rank {rank} (communicator size {size})")]
    InvalidRank { rank: usize, size: usize },

    /// A message of the wrong kind arrived.
    #[error("expected {expected} from rank {source_rank}, got {got}")]
    UnexpectedMessage {
        source_rank: usize,
        expected: &'static str,
        got: &'static str,
    },

    /// A round-tagged message belongs to a different round.
    #[error("rank {source_rank} sent data for round {got}, expected round {expected}")]
    RoundMismatch {
        source_rank: usize,
        expected: u64,
        got: u64,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Convenience result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
