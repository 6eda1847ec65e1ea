//! Physics domains for terracosim terrain and vehicle nodes.
//!
//! Each domain is a self-contained engine owned by exactly one node. The nodes
//! only add proxies or bodies, advance by a step, and read back contact
//! response; everything else is private to the engine.
//!
//! - [`PhysicsWorld`]: rigid multibody domain on top of Rapier
//! - [`ScmSoil`]: Soil Contact Model heightfield
//! - [`DemSystem`]: discrete-element granular bed
//! - [`SphSystem`]: smoothed-particle continuum granular bed

mod collider;
mod convert;
mod dem;
mod domain;
mod error;
mod grid;
mod scm;
mod shape;
mod sph;
mod world;
mod wrench;

pub use collider::{create_ground_collider, create_mesh_collider, create_wheel_collider};
pub use convert::{
    from_isometry, from_point, from_rotation, from_vector, to_isometry, to_point, to_rotation,
    to_vector,
};
pub use dem::{ContactLaw, DemParams, DemSystem, ParticleBed};
pub use domain::ProxyDomain;
pub use error::{SolverError, SolverResult};
pub use grid::SpatialGrid;
pub use scm::{ScmParams, ScmSoil};
pub use shape::{KinematicProxy, ProxyShape, SurfacePoint};
pub use sph::{SphParams, SphSystem};
pub use world::PhysicsWorld;
pub use wrench::ContactWrench;

// Re-export for convenience
pub use rapier3d;

/// Gravitational acceleration along global -Z.
pub const GRAVITY: f64 = 9.81;
