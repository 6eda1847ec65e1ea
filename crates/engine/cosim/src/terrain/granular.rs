//! Discrete-element granular terrains.
//!
//! The three granular variants share one engine and differ in how it is
//! hosted: OMP runs on a dedicated worker pool sized from the specfile and
//! accepts tread meshes; GPU and MPI run on the shared pool as a single
//! partition and only take wheel bodies.

use terracosim_core::{ContactMaterial, TerrainType};
use terracosim_physics::{ContactLaw, DemParams, DemSystem, ParticleBed, ProxyDomain};
use tracing::info;

use super::domain::DomainBackend;
use crate::config::{GranularSection, PatchDimensions};

/// Hertz contact law of a material against itself.
pub(super) fn self_contact_law(material: &ContactMaterial) -> ContactLaw {
    let composite = material.composite(material);
    // NSC materials carry no elastic data; granular terrains reject them earlier
    let effective_young = composite.penalty.map_or(1e7, |p| p.effective_young);
    ContactLaw {
        effective_young,
        restitution: composite.restitution,
        friction: composite.friction,
    }
}

pub(super) fn granular_backend(
    terrain_type: TerrainType,
    patch: PatchDimensions,
    section: GranularSection,
    material: &ContactMaterial,
    step_size: f64,
) -> DomainBackend<DemSystem> {
    let law = self_contact_law(material);
    let params = DemParams {
        radius: section.material.radius,
        density: section.material.density,
        particle: law,
        proxy: law,
    };
    let bed = ParticleBed {
        length: patch.length,
        width: patch.width,
        layers: section.generation.layers,
        seed: section.generation.seed,
    };
    let (threads, mesh_interface) = match terrain_type {
        TerrainType::GranularOmp => (section.threads, true),
        _ => (None, false),
    };
    let settling_time = section.generation.settling_time;

    DomainBackend::new(terrain_type, mesh_interface, move || {
        let mut system = DemSystem::new(params, &bed, threads)?;
        if settling_time > 0.0 {
            system.settle(settling_time, step_size)?;
        }
        info!(
            "{terrain_type}: {} particles, surface at z = {:.4}",
            system.num_particles(),
            system.surface_height()
        );
        Ok(system)
    })
}
