//! JSON specfiles for terrain nodes, the vehicle and the run.
//!
//! Keys follow the established specfile vocabulary ("Step size",
//! "Patch dimensions", ...). Every loader validates ranges and reports a
//! [`ConfigError`](terracosim_core::ConfigError) before any node is built.

mod cosim;
mod terrain;
mod vehicle;

pub use cosim::{CosimSpec, Layout, LoadedCosim, OutputSpec, TerrainNodeSpec};
pub use terrain::{
    GranularMaterial, GranularSection, InterfaceType, ParticleGeneration, PatchDimensions,
    ScmSection, SoilParameters, SphProperties, SphSection, TerrainParams, TerrainSpec,
};
pub use vehicle::{
    BushingData, ChassisSpec, DriverSpec, JointSpec, JointType, PowertrainSpec, VehicleSpec,
    WheelSpec,
};
