//! Rigid terrain: a flat slab at z = 0 in a Rapier world.
//!
//! Proxies are dynamic bodies without gravity. Before every sub-step each one
//! is put back on its imposed trajectory; after the step, the momentum it
//! gained from contacts gives the wrench the ground exerted on it.

use glam::{DQuat, DVec3};
use terracosim_core::material::CompositeMaterial;
use terracosim_core::{ContactMaterial, TerrainType, TireInfo, WheelState};
use terracosim_physics::rapier3d::prelude::*;
use terracosim_physics::{
    create_ground_collider, create_mesh_collider, create_wheel_collider, to_point, to_vector,
    ContactWrench, KinematicProxy, PhysicsWorld, ProxyShape, GRAVITY,
};

use super::TerrainBackend;
use crate::config::{InterfaceType, PatchDimensions};
use crate::error::{CosimError, Result};
use crate::proxy::{MeshProxy, ProxyHandle, ProxyKind, WheelProxy};

struct Track {
    handle: RigidBodyHandle,
    path: KinematicProxy,
    mass: f64,
    inertia: DVec3,
    wrench: ContactWrench,
}

pub struct RigidBackend {
    patch: PatchDimensions,
    material: ContactMaterial,
    world: Option<PhysicsWorld>,
    tracks: Vec<Track>,
}

impl RigidBackend {
    pub fn new(patch: PatchDimensions, material: ContactMaterial) -> Self {
        Self {
            patch,
            material,
            world: None,
            tracks: Vec::new(),
        }
    }

    fn world_mut(&mut self) -> Result<&mut PhysicsWorld> {
        self.world
            .as_mut()
            .ok_or_else(|| CosimError::precondition("rigid terrain not constructed"))
    }

    fn track(&self, proxy: &ProxyKind) -> Result<&Track> {
        let handle = body_handle(proxy)?;
        self.tracks
            .iter()
            .find(|t| t.handle == handle)
            .ok_or_else(|| CosimError::precondition(format!("unknown rigid proxy {handle:?}")))
    }
}

fn body_handle(proxy: &ProxyKind) -> Result<RigidBodyHandle> {
    match proxy.handle() {
        ProxyHandle::Body(handle) => Ok(handle),
        ProxyHandle::Domain(index) => Err(CosimError::precondition(format!(
            "proxy {index} does not belong to a rigid terrain"
        ))),
    }
}

impl TerrainBackend for RigidBackend {
    fn terrain_type(&self) -> TerrainType {
        TerrainType::Rigid
    }

    fn supports_mesh_interface(&self) -> bool {
        true
    }

    fn construct(&mut self) -> Result<()> {
        let mut world = PhysicsWorld::new(DVec3::new(0.0, 0.0, -GRAVITY));
        world.add_static_collider(create_ground_collider(
            self.patch.length,
            self.patch.width,
            self.material.friction() as f64,
            self.material.restitution() as f64,
        ));
        self.world = Some(world);
        Ok(())
    }

    fn create_proxy(
        &mut self,
        tire: &TireInfo,
        material: &CompositeMaterial,
        interface: InterfaceType,
        fixed: bool,
    ) -> Result<ProxyKind> {
        let mut collider = match interface {
            InterfaceType::Body => create_wheel_collider(
                tire.radius,
                tire.width,
                material.friction,
                material.restitution,
            ),
            InterfaceType::Mesh => {
                create_mesh_collider(&tire.mesh, material.friction, material.restitution)?
            }
        };
        // mass comes from the tire description only
        collider.set_density(0.0);

        let inertia = tire.inertia();
        let park = DVec3::new(0.0, 0.0, 2.0 * tire.mesh.bounding_radius().max(tire.radius));
        let body = RigidBodyBuilder::dynamic()
            .translation(to_vector(park))
            .gravity_scale(0.0)
            .can_sleep(false)
            .additional_mass_properties(MassProperties::new(
                to_point(DVec3::ZERO),
                tire.mass as Real,
                to_vector(inertia),
            ))
            .build();

        let world = self.world_mut()?;
        let handle = world.add_rigid_body(body);
        world.add_collider(collider, handle);

        // only the trajectory of the path is used, not its shape
        let mut path = KinematicProxy::new(
            ProxyShape::Cylinder {
                radius: tire.radius,
                width: tire.width,
            },
            fixed,
        );
        path.set_state(park, DQuat::IDENTITY, DVec3::ZERO, DVec3::ZERO);
        self.tracks.push(Track {
            handle,
            path,
            mass: tire.mass,
            inertia,
            wrench: ContactWrench::ZERO,
        });

        let handle = ProxyHandle::Body(handle);
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
        let handle = body_handle(proxy)?;
        let track = self
            .tracks
            .iter_mut()
            .find(|t| t.handle == handle)
            .ok_or_else(|| CosimError::precondition(format!("unknown rigid proxy {handle:?}")))?;
        track
            .path
            .set_state(state.pos, state.rot, state.lin_vel, state.ang_vel);
        Ok(())
    }

    fn step(&mut self, h: f64) -> Result<()> {
        let world = self
            .world
            .as_mut()
            .ok_or_else(|| CosimError::precondition("rigid terrain not constructed"))?;

        for track in &self.tracks {
            let (v, w) = track.path.velocity();
            world
                .set_body_state(track.handle, track.path.position(), track.path.rotation(), v, w)
                .ok_or_else(|| CosimError::precondition("rigid proxy body vanished"))?;
        }

        world.step(h)?;

        for track in &mut self.tracks {
            let (v, w) = track.path.velocity();
            let (v_after, w_after) = world
                .body_velocity(track.handle)
                .ok_or_else(|| CosimError::precondition("rigid proxy body vanished"))?;
            let rot = track.path.rotation();
            let dw_local = rot.inverse() * (w_after - w);
            track.wrench = ContactWrench {
                force: (v_after - v) * (track.mass / h),
                moment: rot * (track.inertia * dw_local) / h,
            };
            track.path.integrate(h);
        }
        Ok(())
    }

    fn proxy_wrench(&self, proxy: &ProxyKind) -> Result<ContactWrench> {
        Ok(self.track(proxy)?.wrench)
    }

    fn terrain_height(&self) -> f64 {
        0.0
    }

    fn output_points(&self) -> Vec<DVec3> {
        self.tracks.iter().map(|t| t.path.position()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terracosim_core::MaterialInfo;

    fn backend() -> (RigidBackend, CompositeMaterial) {
        let terrain = ContactMaterial::default_for(terracosim_core::ContactMethod::Nsc);
        let tire = MaterialInfo::default().create_material(terracosim_core::ContactMethod::Nsc);
        let mut backend = RigidBackend::new(
            PatchDimensions {
                length: 4.0,
                width: 2.0,
            },
            terrain,
        );
        backend.construct().unwrap();
        (backend, tire.composite(&terrain))
    }

    #[test]
    fn test_free_wheel_feels_nothing() {
        let (mut backend, material) = backend();
        let tire = TireInfo::cylindrical(0, 30.0, 0.3, 0.2);
        let proxy = backend
            .create_proxy(&tire, &material, InterfaceType::Body, false)
            .unwrap();
        let mut state = WheelState::at_rest(0, DVec3::new(0.0, 0.0, 1.0), DQuat::IDENTITY);
        state.lin_vel = DVec3::new(1.0, 0.0, 0.0);
        backend.update_proxy(&proxy, &state).unwrap();
        backend.step(1e-3).unwrap();
        let wrench = backend.proxy_wrench(&proxy).unwrap();
        assert!(wrench.force.length() < 1e-3, "{wrench:?}");
    }

    #[test]
    fn test_ground_pushes_wheel_up() {
        let (mut backend, material) = backend();
        let tire = TireInfo::cylindrical(0, 30.0, 0.3, 0.2);
        let proxy = backend
            .create_proxy(&tire, &material, InterfaceType::Body, false)
            .unwrap();
        let mut state = WheelState::at_rest(0, DVec3::new(0.0, 0.0, 0.29), DQuat::IDENTITY);
        state.lin_vel = DVec3::new(0.0, 0.0, -0.5);
        backend.update_proxy(&proxy, &state).unwrap();

        let mut total = 0.0;
        for _ in 0..5 {
            backend.step(1e-3).unwrap();
            let wrench = backend.proxy_wrench(&proxy).unwrap();
            assert!(wrench.is_finite());
            total += wrench.force.z;
        }
        assert!(total > 0.0);
    }

    #[test]
    fn test_mesh_proxy_and_handles() {
        let (mut backend, material) = backend();
        let tire = TireInfo::cylindrical(1, 30.0, 0.3, 0.2);
        let proxy = backend
            .create_proxy(&tire, &material, InterfaceType::Mesh, true)
            .unwrap();
        assert_eq!(proxy.interface(), InterfaceType::Mesh);
        assert_eq!(backend.output_points().len(), 1);

        let foreign = ProxyKind::Wheel(WheelProxy {
            handle: ProxyHandle::Domain(0),
            mass: 1.0,
            radius: 1.0,
            width: 1.0,
        });
        assert!(backend.proxy_wrench(&foreign).is_err());
    }
}
