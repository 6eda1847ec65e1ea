//! Exchange contract for terracosim nodes.
//!
//! Everything a vehicle node and a terrain node agree on lives here, and nothing
//! else: the per-round payloads, the terrain formulation tags, contact material
//! descriptors and the tire tread geometry sent at initialization.
//!
//! # Modules
//!
//! - [`types`]: [`WheelState`], [`TerrainForce`] and [`TireInfo`] snapshots
//! - [`terrain_type`]: the closed set of terrain formulations and their names
//! - [`material`]: contact material factory keyed by contact method
//! - [`mesh`]: fixed-topology triangle meshes used by mesh proxies

pub mod error;
pub mod material;
pub mod mesh;
pub mod terrain_type;
pub mod types;

pub use error::{ConfigError, ConfigResult};
pub use material::{ContactMaterial, ContactMethod, MaterialInfo};
pub use mesh::TriMesh;
pub use terrain_type::TerrainType;
pub use types::{TerrainForce, TireInfo, WheelState};

// Re-export for convenience
pub use glam;
