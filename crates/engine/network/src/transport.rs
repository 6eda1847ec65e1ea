//! Transport abstraction.
//!
//! A [`Communicator`] is one rank's view of the co-simulation: it can send to
//! and receive from any other rank by index. Delivery is reliable and ordered
//! per sender/receiver pair, and `recv` blocks until a message from the named
//! source arrives. That blocking receive is the only suspension point of the
//! synchronization protocol.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::NetworkResult;
use crate::message::CosimMessage;

/// A rank's endpoint in the co-simulation.
pub trait Communicator: Send {
    /// This endpoint's rank.
    fn rank(&self) -> usize;

    /// Number of ranks in the run.
    fn size(&self) -> usize;

    /// Send a message to `dest`.
    fn send(&self, dest: usize, message: &CosimMessage) -> NetworkResult<()>;

    /// Receive the next message from `source`, blocking until it arrives.
    ///
    /// An `Abort` from the peer is returned as
    /// [`NetworkError::Aborted`](crate::NetworkError::Aborted).
    fn recv(&self, source: usize) -> NetworkResult<CosimMessage>;

    /// Best-effort notification of every other rank that this one failed.
    fn abort(&self, reason: &str) {
        let message = CosimMessage::Abort {
            reason: reason.to_string(),
        };
        for dest in (0..self.size()).filter(|&r| r != self.rank()) {
            if let Err(e) = self.send(dest, &message) {
                tracing::debug!("rank {}: abort not delivered to {dest}: {e}", self.rank());
            }
        }
    }
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Longest a blocking receive waits before failing the run.
    pub recv_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(60),
        }
    }
}

/// Byte and message counters of one endpoint.
#[derive(Debug, Default)]
pub struct TransportStats {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
}

impl TransportStats {
    pub fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }
}
