//! Tire/terrain co-simulation.
//!
//! A vehicle node and one or more terrain nodes advance independently and
//! meet once per synchronization round: the vehicle publishes wheel states,
//! each terrain node imposes them on its tire proxies, both sides advance,
//! and the terrain nodes return the contact loads on those proxies.
//!
//! - [`config`]: terrain, vehicle and run specfiles
//! - [`terrain`]: [`TerrainNode`] and its formulations (rigid, SCM, granular, SPH)
//! - [`proxy`]: the per-tire proxy model
//! - [`vehicle`]: [`VehicleNode`], a multibody vehicle with driver and powertrain
//! - [`cosim`]: the round protocol over a [`Communicator`](terracosim_network::Communicator)
//! - [`output`]: CSV frames and frame hooks

pub mod config;
pub mod cosim;
pub mod error;
pub mod output;
pub mod proxy;
pub mod terrain;
pub mod vehicle;

pub use config::{CosimSpec, InterfaceType, Layout, TerrainSpec, VehicleSpec};
pub use cosim::{
    launch, launch_with_hooks, RankReport, RunConfig, RunSummary, Traffic, VEHICLE_RANK,
};
pub use error::{CosimError, Result};
pub use proxy::{Proxy, ProxyHandle, ProxyKind};
pub use terrain::{TerrainBackend, TerrainNode};
pub use vehicle::VehicleNode;

// Re-export the shared vocabulary
pub use terracosim_core::{
    ConfigError, ContactMethod, MaterialInfo, TerrainForce, TerrainType, TireInfo, WheelState,
};
