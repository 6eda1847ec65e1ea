//! Deformable terrains driven through [`ProxyDomain`].
//!
//! The engine is only built on `construct`; until then the backend holds the
//! recipe for it.

use glam::{DQuat, DVec3};
use terracosim_core::material::CompositeMaterial;
use terracosim_core::{TerrainType, TireInfo, WheelState};
use terracosim_physics::{
    ContactWrench, KinematicProxy, ProxyDomain, ProxyShape, ScmSoil, SolverResult, SphSystem,
};

use super::TerrainBackend;
use crate::config::{InterfaceType, PatchDimensions, ScmSection, SphSection};
use crate::error::{CosimError, Result};
use crate::proxy::{MeshProxy, ProxyHandle, ProxyKind, WheelProxy};

type Builder<D> = Box<dyn FnOnce() -> SolverResult<D> + Send>;

/// Terrain backend over any proxy-driven engine.
pub struct DomainBackend<D: ProxyDomain> {
    terrain_type: TerrainType,
    mesh_interface: bool,
    builder: Option<Builder<D>>,
    domain: Option<D>,
}

impl<D: ProxyDomain> DomainBackend<D> {
    pub fn new(
        terrain_type: TerrainType,
        mesh_interface: bool,
        builder: impl FnOnce() -> SolverResult<D> + Send + 'static,
    ) -> Self {
        Self {
            terrain_type,
            mesh_interface,
            builder: Some(Box::new(builder)),
            domain: None,
        }
    }

    /// The engine, once constructed.
    pub fn domain(&self) -> Option<&D> {
        self.domain.as_ref()
    }

    fn constructed(&self) -> Result<&D> {
        let terrain_type = self.terrain_type;
        self.domain
            .as_ref()
            .ok_or_else(|| not_constructed(terrain_type))
    }

    fn constructed_mut(&mut self) -> Result<&mut D> {
        let terrain_type = self.terrain_type;
        self.domain
            .as_mut()
            .ok_or_else(|| not_constructed(terrain_type))
    }
}

fn not_constructed(terrain_type: TerrainType) -> CosimError {
    CosimError::precondition(format!("{terrain_type} terrain not constructed"))
}

fn domain_index(proxy: &ProxyKind) -> Result<usize> {
    match proxy.handle() {
        ProxyHandle::Domain(index) => Ok(index),
        ProxyHandle::Body(handle) => Err(CosimError::precondition(format!(
            "rigid body proxy {handle:?} used on a deformable terrain"
        ))),
    }
}

impl<D: ProxyDomain> TerrainBackend for DomainBackend<D> {
    fn terrain_type(&self) -> TerrainType {
        self.terrain_type
    }

    fn supports_mesh_interface(&self) -> bool {
        self.mesh_interface
    }

    fn construct(&mut self) -> Result<()> {
        let builder = self
            .builder
            .take()
            .ok_or_else(|| CosimError::precondition("terrain already constructed"))?;
        self.domain = Some(builder()?);
        Ok(())
    }

    fn create_proxy(
        &mut self,
        tire: &TireInfo,
        material: &CompositeMaterial,
        interface: InterfaceType,
        fixed: bool,
    ) -> Result<ProxyKind> {
        let shape = match interface {
            InterfaceType::Body => ProxyShape::Cylinder {
                radius: tire.radius,
                width: tire.width,
            },
            InterfaceType::Mesh => ProxyShape::Mesh {
                mesh: tire.mesh.clone(),
            },
        };
        let domain = self.constructed_mut()?;
        let mut proxy = KinematicProxy::new(shape, fixed);
        let park = domain.surface_height() + 2.0 * proxy.bounding_radius();
        proxy.set_state(DVec3::new(0.0, 0.0, park), DQuat::IDENTITY, DVec3::ZERO, DVec3::ZERO);

        let index = domain.add_proxy(proxy);
        domain.set_proxy_contact(index, material)?;

        let handle = ProxyHandle::Domain(index);
        Ok(match interface {
            InterfaceType::Body => ProxyKind::Wheel(WheelProxy {
                handle,
                mass: tire.mass,
                radius: tire.radius,
                width: tire.width,
            }),
            InterfaceType::Mesh => ProxyKind::Mesh(MeshProxy {
                handle,
                mesh: tire.mesh.clone(),
            }),
        })
    }

    fn update_proxy(&mut self, proxy: &ProxyKind, state: &WheelState) -> Result<()> {
        let index = domain_index(proxy)?;
        self.constructed_mut()?
            .proxy_mut(index)?
            .set_state(state.pos, state.rot, state.lin_vel, state.ang_vel);
        Ok(())
    }

    fn step(&mut self, h: f64) -> Result<()> {
        self.constructed_mut()?.step(h)?;
        Ok(())
    }

    fn proxy_wrench(&self, proxy: &ProxyKind) -> Result<ContactWrench> {
        let index = domain_index(proxy)?;
        Ok(self.constructed()?.contact_wrench(index)?)
    }

    fn terrain_height(&self) -> f64 {
        self.domain.as_ref().map_or(0.0, |d| d.surface_height())
    }

    fn output_points(&self) -> Vec<DVec3> {
        self.domain.as_ref().map(|d| d.output_points()).unwrap_or_default()
    }
}

/// SCM soil patch; hosts both proxy kinds under either contact method.
pub(super) fn scm_backend(patch: PatchDimensions, section: ScmSection) -> DomainBackend<ScmSoil> {
    DomainBackend::new(TerrainType::Scm, true, move || {
        ScmSoil::new(patch.length, patch.width, section.grid_spacing, section.soil.into())
    })
}

/// SPH soil bed; wheel bodies only.
pub(super) fn sph_backend(patch: PatchDimensions, section: SphSection) -> DomainBackend<SphSystem> {
    DomainBackend::new(TerrainType::GranularSph, false, move || {
        SphSystem::new(patch.length, patch.width, section.params())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SoilParameters;
    use terracosim_core::{ContactMaterial, ContactMethod};

    fn scm() -> DomainBackend<ScmSoil> {
        scm_backend(
            PatchDimensions {
                length: 2.0,
                width: 1.0,
            },
            ScmSection {
                soil: SoilParameters::default(),
                grid_spacing: 0.05,
            },
        )
    }

    fn material() -> CompositeMaterial {
        let m = ContactMaterial::default_for(ContactMethod::Smc);
        m.composite(&m)
    }

    #[test]
    fn test_requires_construct() {
        let mut backend = scm();
        let tire = TireInfo::cylindrical(0, 30.0, 0.3, 0.2);
        assert!(backend.domain().is_none());
        assert!(backend.step(1e-3).is_err());
        assert!(backend
            .create_proxy(&tire, &material(), InterfaceType::Body, false)
            .is_err());
        backend.construct().unwrap();
        assert!(backend.construct().is_err());
        assert!(!backend.output_points().is_empty());
    }

    #[test]
    fn test_soil_pushes_sinking_wheel_up() {
        let mut backend = scm();
        backend.construct().unwrap();
        let tire = TireInfo::cylindrical(0, 30.0, 0.3, 0.2);
        let proxy = backend
            .create_proxy(&tire, &material(), InterfaceType::Body, false)
            .unwrap();

        // parked proxies do not touch the soil
        backend.step(1e-3).unwrap();
        assert_eq!(backend.proxy_wrench(&proxy).unwrap().force, DVec3::ZERO);

        let state = WheelState::at_rest(0, DVec3::new(0.0, 0.0, 0.28), DQuat::IDENTITY);
        backend.update_proxy(&proxy, &state).unwrap();
        backend.step(1e-3).unwrap();
        let wrench = backend.proxy_wrench(&proxy).unwrap();
        assert!(wrench.force.z > 0.0, "{wrench:?}");
    }

    #[test]
    fn test_sph_is_body_only() {
        let backend = sph_backend(
            PatchDimensions {
                length: 0.2,
                width: 0.2,
            },
            SphSection {
                material: crate::config::GranularMaterial::default(),
                properties: crate::config::SphProperties::default(),
            },
        );
        assert!(!backend.supports_mesh_interface());
        assert_eq!(backend.terrain_type(), TerrainType::GranularSph);
    }
}
