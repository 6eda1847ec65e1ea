//! In-process transport.
//!
//! [`LocalHub`] connects a fixed number of ranks living in one process,
//! typically one thread per rank. Every rank owns an inbox holding one FIFO
//! queue per source rank, guarded by a mutex and a condition variable.
//! Messages travel as bincode frames so that nothing is shared by reference.
//!
//! Dropping an endpoint marks it disconnected in every other inbox; peers
//! blocked on it wake up with [`NetworkError::PeerDisconnected`] once its
//! queued frames are drained.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::error::{NetworkError, NetworkResult};
use crate::message::{self, CosimMessage};
use crate::transport::{Communicator, TransportConfig, TransportStats};

struct InboxState {
    /// Pending frames, indexed by source rank.
    queues: Vec<VecDeque<Vec<u8>>>,
    /// Source ranks whose endpoint has been dropped.
    disconnected: Vec<bool>,
    /// The owner of this inbox has been dropped.
    closed: bool,
}

struct Inbox {
    state: Mutex<InboxState>,
    ready: Condvar,
}

impl Inbox {
    fn new(size: usize) -> Self {
        Self {
            state: Mutex::new(InboxState {
                queues: vec![VecDeque::new(); size],
                disconnected: vec![false; size],
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }
}

/// Builder for a set of connected in-process endpoints.
pub struct LocalHub {
    inboxes: Arc<Vec<Inbox>>,
    config: TransportConfig,
}

impl LocalHub {
    /// Create a hub connecting `size` ranks.
    pub fn new(size: usize, config: TransportConfig) -> Self {
        Self {
            inboxes: Arc::new((0..size).map(|_| Inbox::new(size)).collect()),
            config,
        }
    }

    /// One endpoint per rank, in rank order.
    pub fn into_endpoints(self) -> Vec<LocalEndpoint> {
        let size = self.inboxes.len();
        (0..size)
            .map(|rank| LocalEndpoint {
                rank,
                inboxes: self.inboxes.clone(),
                config: self.config.clone(),
                stats: TransportStats::default(),
            })
            .collect()
    }
}

/// One rank's endpoint on a [`LocalHub`].
pub struct LocalEndpoint {
    rank: usize,
    inboxes: Arc<Vec<Inbox>>,
    config: TransportConfig,
    stats: TransportStats,
}

impl LocalEndpoint {
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    fn check_rank(&self, rank: usize) -> NetworkResult<()> {
        if rank < self.inboxes.len() && rank != self.rank {
            Ok(())
        } else {
            Err(NetworkError::InvalidRank {
                rank,
                size: self.inboxes.len(),
            })
        }
    }
}

impl Communicator for LocalEndpoint {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.inboxes.len()
    }

    fn send(&self, dest: usize, message: &CosimMessage) -> NetworkResult<()> {
        self.check_rank(dest)?;
        let frame = message::serialize(message)?;
        let len = frame.len();

        let inbox = &self.inboxes[dest];
        {
            let mut state = inbox.state.lock();
            if state.closed {
                return Err(NetworkError::PeerDisconnected(dest));
            }
            state.queues[self.rank].push_back(frame);
        }
        inbox.ready.notify_all();

        self.stats.record_sent(len);
        tracing::trace!("rank {} -> {dest}: {} ({len} bytes)", self.rank, message.kind());
        Ok(())
    }

    fn recv(&self, source: usize) -> NetworkResult<CosimMessage> {
        self.check_rank(source)?;
        let inbox = &self.inboxes[self.rank];
        let started = Instant::now();
        // a timeout past the end of the clock waits forever
        let deadline = started.checked_add(self.config.recv_timeout);

        let frame = {
            let mut state = inbox.state.lock();
            loop {
                if let Some(frame) = state.queues[source].pop_front() {
                    break frame;
                }
                if state.disconnected[source] {
                    return Err(NetworkError::PeerDisconnected(source));
                }
                let Some(deadline) = deadline else {
                    inbox.ready.wait(&mut state);
                    continue;
                };
                if inbox.ready.wait_until(&mut state, deadline).timed_out()
                    && state.queues[source].is_empty()
                    && !state.disconnected[source]
                {
                    return Err(NetworkError::Timeout {
                        source_rank: source,
                        waited: started.elapsed(),
                    });
                }
            }
        };

        self.stats.record_received(frame.len());
        match message::deserialize(&frame)? {
            CosimMessage::Abort { reason } => Err(NetworkError::Aborted {
                rank: source,
                reason,
            }),
            message => Ok(message),
        }
    }
}

impl Drop for LocalEndpoint {
    fn drop(&mut self) {
        for (rank, inbox) in self.inboxes.iter().enumerate() {
            {
                let mut state = inbox.state.lock();
                if rank == self.rank {
                    state.closed = true;
                } else {
                    state.disconnected[self.rank] = true;
                }
            }
            inbox.ready.notify_all();
        }
    }
}
