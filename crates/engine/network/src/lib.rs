//! Rank-to-rank transport for terracosim.
//!
//! This crate provides:
//! - The [`Communicator`] trait, a blocking, per-pair ordered message channel
//!   addressed by rank
//! - [`LocalHub`], an in-process implementation connecting ranks that run on
//!   separate threads
//! - Message serialization/deserialization of [`CosimMessage`] frames

pub mod error;
pub mod local;
pub mod message;
pub mod transport;

pub use error::{NetworkError, NetworkResult};
pub use local::{LocalEndpoint, LocalHub};
pub use message::CosimMessage;
pub use transport::{Communicator, TransportConfig, TransportStats};
