//! Terrain nodes.
//!
//! A [`TerrainNode`] owns one terrain engine and one proxy per tire it
//! serves. The public contract is the same for every formulation; the
//! formulation itself sits behind [`TerrainBackend`], chosen once from the
//! specfile's type tag.
//!
//! Contact forces are time averages: every sub-step adds `wrench * h` to the
//! tire's accumulator, [`TerrainNode::update_proxy`] clears it, and
//! [`TerrainNode::compute_contact_force`] divides by the elapsed time.

mod domain;
mod granular;
mod rigid;

use glam::DVec3;
use terracosim_core::material::CompositeMaterial;
use terracosim_core::{
    ConfigError, ContactMaterial, ContactMethod, MaterialInfo, TerrainForce, TerrainType,
    TireInfo, WheelState,
};
use terracosim_physics::ContactWrench;
use tracing::{debug, info, warn};

use crate::config::{InterfaceType, TerrainParams, TerrainSpec};
use crate::error::{CosimError, Result};
use crate::proxy::{Proxy, ProxyKind};

pub use domain::DomainBackend;
pub use rigid::RigidBackend;

/// Mass of the default tire (Kraz trailer wheel).
pub const DEFAULT_TIRE_MASS: f64 = 30.0;
/// Radius of the default tire.
pub const DEFAULT_TIRE_RADIUS: f64 = 0.28575;
/// Width of the default tire.
pub const DEFAULT_TIRE_WIDTH: f64 = 0.29845;

/// One terrain formulation.
pub trait TerrainBackend: Send {
    fn terrain_type(&self) -> TerrainType;

    /// Whether tread-mesh proxies can be hosted.
    fn supports_mesh_interface(&self) -> bool;

    /// Build the engine. Called once.
    fn construct(&mut self) -> Result<()>;

    /// Register a proxy for `tire`, parked above the surface at rest.
    fn create_proxy(
        &mut self,
        tire: &TireInfo,
        material: &CompositeMaterial,
        interface: InterfaceType,
        fixed: bool,
    ) -> Result<ProxyKind>;

    /// Impose a wheel state on a proxy.
    fn update_proxy(&mut self, proxy: &ProxyKind, state: &WheelState) -> Result<()>;

    /// Advance the engine by one sub-step.
    fn step(&mut self, h: f64) -> Result<()>;

    /// Wrench on a proxy during the last sub-step, moment about its center.
    fn proxy_wrench(&self, proxy: &ProxyKind) -> Result<ContactWrench>;

    /// Height of the undisturbed surface.
    fn terrain_height(&self) -> f64;

    fn output_points(&self) -> Vec<DVec3>;
}

/// Contact methods a formulation accepts.
pub fn supports_method(terrain_type: TerrainType, method: ContactMethod) -> bool {
    match terrain_type {
        TerrainType::Rigid | TerrainType::Scm => true,
        TerrainType::GranularOmp
        | TerrainType::GranularGpu
        | TerrainType::GranularMpi
        | TerrainType::GranularSph => method == ContactMethod::Smc,
        TerrainType::Unknown => false,
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    impulse: ContactWrench,
    elapsed: f64,
}

/// Terrain side of the co-simulation for a set of tires.
///
/// Tires are addressed by their local index `0..num_tires`; forces are
/// reported under the global wheel index of the tire.
pub struct TerrainNode {
    spec: TerrainSpec,
    tires: Vec<TireInfo>,
    tire_materials: Vec<MaterialInfo>,
    terrain_material: ContactMaterial,
    proxies: Vec<Option<Proxy>>,
    accumulators: Vec<Accumulator>,
    backend: Box<dyn TerrainBackend>,
    constructed: bool,
    time: f64,
}

impl TerrainNode {
    /// Select the formulation named by the specfile.
    ///
    /// Fails before anything is built if the type is unknown or cannot use
    /// the requested contact method.
    pub fn from_spec(spec: TerrainSpec, num_tires: usize) -> Result<Self> {
        let terrain_type = spec.terrain_type;
        if terrain_type == TerrainType::Unknown {
            return Err(ConfigError::UnknownTerrainType(terrain_type.name().to_string()).into());
        }
        if !supports_method(terrain_type, spec.method) {
            return Err(ConfigError::UnsupportedContactMethod {
                terrain: terrain_type,
                method: spec.method,
            }
            .into());
        }
        if num_tires == 0 {
            let reason = "a terrain node needs at least one tire";
            return Err(ConfigError::invalid("num_tires", reason).into());
        }

        let terrain_material = spec
            .terrain_material
            .map(|info| info.create_material(spec.method))
            .unwrap_or_else(|| ContactMaterial::default_for(spec.method));

        let backend: Box<dyn TerrainBackend> = match &spec.params {
            TerrainParams::Rigid => Box::new(RigidBackend::new(spec.patch, terrain_material)),
            TerrainParams::Scm(section) => Box::new(domain::scm_backend(spec.patch, *section)),
            TerrainParams::Granular(section) => Box::new(granular::granular_backend(
                terrain_type,
                spec.patch,
                *section,
                &terrain_material,
                spec.step_size,
            )),
            TerrainParams::Sph(section) => Box::new(domain::sph_backend(spec.patch, *section)),
        };
        if backend.terrain_type() != terrain_type {
            return Err(ConfigError::invalid(
                "Type",
                format!("{terrain_type} does not match its parameter section"),
            )
            .into());
        }
        if spec.interface == InterfaceType::Mesh && !backend.supports_mesh_interface() {
            warn!("terrain type {terrain_type} cannot host mesh proxies");
        }

        let tires = (0..num_tires)
            .map(|i| {
                TireInfo::cylindrical(i, DEFAULT_TIRE_MASS, DEFAULT_TIRE_RADIUS, DEFAULT_TIRE_WIDTH)
            })
            .collect();
        debug!("terrain node {terrain_type} ({}) for {num_tires} tires", spec.method);

        Ok(Self {
            tire_materials: vec![spec.tire_material; num_tires],
            spec,
            tires,
            terrain_material,
            proxies: vec![None; num_tires],
            accumulators: vec![Accumulator::default(); num_tires],
            backend,
            constructed: false,
            time: 0.0,
        })
    }

    pub fn terrain_type(&self) -> TerrainType {
        self.spec.terrain_type
    }

    pub fn num_tires(&self) -> usize {
        self.tires.len()
    }

    pub fn tires(&self) -> &[TireInfo] {
        &self.tires
    }

    /// Replace the tire descriptions. Only allowed before construction.
    pub fn set_tire_info(&mut self, tires: Vec<TireInfo>) -> Result<()> {
        if self.constructed {
            return Err(CosimError::precondition(
                "tire info must be set before the terrain is constructed",
            ));
        }
        if tires.len() != self.tires.len() {
            return Err(ConfigError::invalid(
                "tire info",
                format!("expected {} tires, got {}", self.tires.len(), tires.len()),
            )
            .into());
        }
        for tire in &tires {
            tire.mesh.validate()?;
            ConfigError::require_positive("tire mass", tire.mass)?;
            ConfigError::require_positive("tire radius", tire.radius)?;
        }
        self.tires = tires;
        Ok(())
    }

    /// Override the material of one tire.
    pub fn set_tire_material(&mut self, wheel: usize, info: MaterialInfo) -> Result<()> {
        let num_tires = self.num_tires();
        let slot = self
            .tire_materials
            .get_mut(wheel)
            .ok_or(ConfigError::WheelOutOfRange { wheel, num_tires })?;
        *slot = info;
        Ok(())
    }

    /// Contact material of a tire for this node's contact method.
    pub fn tire_material(&self, wheel: usize) -> Option<ContactMaterial> {
        self.tire_materials
            .get(wheel)
            .map(|info| info.create_material(self.spec.method))
    }

    pub fn terrain_material(&self) -> &ContactMaterial {
        &self.terrain_material
    }

    pub fn supports_mesh_interface(&self) -> bool {
        self.backend.supports_mesh_interface()
    }

    /// Build the terrain engine.
    pub fn construct(&mut self) -> Result<()> {
        if self.constructed {
            return Err(CosimError::precondition("terrain already constructed"));
        }
        self.backend.construct()?;
        self.constructed = true;
        info!(
            "constructed {} terrain, surface at z = {:.4}",
            self.spec.terrain_type,
            self.backend.terrain_height()
        );
        Ok(())
    }

    /// Create the proxy of tire `wheel`, of the node's interface type.
    pub fn create_proxy(&mut self, wheel: usize) -> Result<()> {
        let num_tires = self.num_tires();
        if wheel >= num_tires {
            return Err(ConfigError::WheelOutOfRange { wheel, num_tires }.into());
        }
        if !self.constructed {
            return Err(CosimError::precondition(format!(
                "proxy for tire {wheel} requested before construction"
            )));
        }
        let interface = self.spec.interface;
        if interface == InterfaceType::Mesh && !self.backend.supports_mesh_interface() {
            return Err(ConfigError::UnsupportedInterface(self.spec.terrain_type).into());
        }
        if self.proxies[wheel].is_some() {
            return Err(CosimError::precondition(format!("tire {wheel} already has a proxy")));
        }

        let tire_material = self.tire_materials[wheel].create_material(self.spec.method);
        let composite = tire_material.composite(&self.terrain_material);
        let kind = self.backend.create_proxy(
            &self.tires[wheel],
            &composite,
            interface,
            self.spec.fixed_proxies,
        )?;
        debug!("tire {wheel}: {interface} proxy {:?}", kind.handle());
        self.proxies[wheel] = Some(Proxy::new(wheel, kind));
        self.accumulators[wheel] = Accumulator::default();
        Ok(())
    }

    pub fn proxy(&self, wheel: usize) -> Option<&Proxy> {
        self.proxies.get(wheel).and_then(Option::as_ref)
    }

    pub fn num_proxies(&self) -> usize {
        self.proxies.iter().flatten().count()
    }

    fn existing_proxy(&self, wheel: usize) -> Result<&Proxy> {
        self.proxy(wheel)
            .ok_or_else(|| CosimError::precondition(format!("no proxy for tire {wheel}")))
    }

    /// Impose the state of tire `wheel` on its proxy and clear its force
    /// accumulator. The terrain itself is not advanced.
    pub fn update_proxy(&mut self, wheel: usize, state: &WheelState) -> Result<()> {
        if !state.is_finite() {
            return Err(CosimError::precondition(format!(
                "non-finite state received for tire {wheel}"
            )));
        }
        let proxy = self
            .proxies
            .get(wheel)
            .and_then(Option::as_ref)
            .ok_or_else(|| CosimError::precondition(format!("no proxy for tire {wheel}")))?;
        self.backend.update_proxy(&proxy.kind, state)?;
        self.accumulators[wheel] = Accumulator::default();
        Ok(())
    }

    /// Average contact load on tire `wheel` since its last update.
    pub fn compute_contact_force(&self, wheel: usize) -> Result<TerrainForce> {
        self.existing_proxy(wheel)?;
        let acc = &self.accumulators[wheel];
        let global = self.tires[wheel].wheel;
        if acc.elapsed <= 0.0 {
            return Ok(TerrainForce::zero(global));
        }
        let mean = acc.impulse * (1.0 / acc.elapsed);
        Ok(TerrainForce {
            wheel: global,
            force: mean.force,
            moment: mean.moment,
        })
    }

    /// Advance the terrain by exactly `step`, in sub-steps no larger than the
    /// node's step size.
    pub fn advance(&mut self, step: f64) -> Result<()> {
        if !self.constructed {
            return Err(CosimError::precondition("terrain advanced before construction"));
        }
        if !(step.is_finite() && step > 0.0) {
            return Err(CosimError::precondition(format!("invalid advance step {step}")));
        }

        let tolerance = 1e-10 * step;
        let mut t = 0.0;
        while step - t > tolerance {
            let h = self.spec.step_size.min(step - t);
            self.backend.step(h)?;
            for (proxy, acc) in self.proxies.iter().zip(self.accumulators.iter_mut()) {
                if let Some(proxy) = proxy {
                    acc.impulse += self.backend.proxy_wrench(&proxy.kind)? * h;
                    acc.elapsed += h;
                }
            }
            t += h;
        }
        self.time += step;
        Ok(())
    }

    /// Reset time, construct the engine and create every proxy.
    pub fn initialize(&mut self) -> Result<()> {
        self.time = 0.0;
        self.construct()?;
        for wheel in 0..self.num_tires() {
            self.create_proxy(wheel)?;
        }
        info!(
            "{} terrain initialized with {} {} proxies",
            self.spec.terrain_type,
            self.num_proxies(),
            self.spec.interface
        );
        Ok(())
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn terrain_height(&self) -> f64 {
        self.backend.terrain_height()
    }

    /// Terrain-specific state for output (grid nodes or particle centers).
    pub fn output_points(&self) -> Vec<DVec3> {
        self.backend.output_points()
    }
}
