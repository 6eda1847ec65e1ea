//! Rigid multibody model of the vehicle.
//!
//! A chassis body and one body per wheel, each joined to the chassis. There
//! are no colliders: the terrain acts on the wheels only through the loads
//! the terrain nodes report.

use glam::{DQuat, DVec3};
use terracosim_core::WheelState;
use terracosim_physics::rapier3d::prelude::*;
use terracosim_physics::{to_point, to_vector, PhysicsWorld, SolverResult, GRAVITY};

use super::joint::VehicleJoint;
use crate::config::VehicleSpec;

fn body(pos: DVec3, rot: DQuat, mass: f64, inertia: DVec3) -> RigidBody {
    RigidBodyBuilder::dynamic()
        .translation(to_vector(pos))
        .rotation(to_vector(rot.to_scaled_axis()))
        .can_sleep(false)
        .additional_mass_properties(MassProperties::new(
            to_point(DVec3::ZERO),
            mass as Real,
            to_vector(inertia),
        ))
        .build()
}

pub struct VehicleModel {
    world: PhysicsWorld,
    chassis: RigidBodyHandle,
    wheels: Vec<RigidBodyHandle>,
}

impl VehicleModel {
    /// Assemble the vehicle with its chassis reference frame at `pos`/`rot`.
    pub fn build(spec: &VehicleSpec, joint: &VehicleJoint, pos: DVec3, rot: DQuat) -> Self {
        let mut world = PhysicsWorld::new(DVec3::new(0.0, 0.0, -GRAVITY));
        let chassis = world.add_rigid_body(body(pos, rot, spec.chassis.mass, spec.chassis.inertia));
        let wheels = spec
            .wheels
            .iter()
            .map(|w| {
                let handle =
                    world.add_rigid_body(body(pos + rot * w.location, rot, w.mass, w.inertia));
                world.add_joint(chassis, handle, joint.build(w.location));
                handle
            })
            .collect();
        Self {
            world,
            chassis,
            wheels,
        }
    }

    pub fn num_wheels(&self) -> usize {
        self.wheels.len()
    }

    pub fn step(&mut self, h: f64) -> SolverResult<()> {
        self.world.step(h)
    }

    pub fn chassis_pose(&self) -> (DVec3, DQuat) {
        self.world
            .body_pose(self.chassis)
            .unwrap_or((DVec3::ZERO, DQuat::IDENTITY))
    }

    pub fn chassis_velocity(&self) -> (DVec3, DVec3) {
        self.world
            .body_velocity(self.chassis)
            .unwrap_or((DVec3::ZERO, DVec3::ZERO))
    }

    /// State of wheel `wheel`, reported under the same index.
    pub fn wheel_state(&self, wheel: usize) -> Option<WheelState> {
        let handle = *self.wheels.get(wheel)?;
        let (pos, rot) = self.world.body_pose(handle)?;
        let (lin_vel, ang_vel) = self.world.body_velocity(handle)?;
        let (_, chassis_ang_vel) = self.chassis_velocity();
        let axis = rot * DVec3::Y;
        Some(WheelState {
            wheel,
            pos,
            rot,
            lin_vel,
            ang_vel,
            omega: (ang_vel - chassis_ang_vel).dot(axis),
        })
    }

    pub fn wheel_states(&self) -> Vec<WheelState> {
        (0..self.wheels.len())
            .filter_map(|i| self.wheel_state(i))
            .collect()
    }

    /// Replace the external loads: terrain wrench plus spindle torque on
    /// each wheel, spindle reactions on the chassis.
    pub fn apply_loads(&mut self, terrain: &[(DVec3, DVec3)], spindle: &[f64]) {
        let mut reaction = DVec3::ZERO;
        for (i, &handle) in self.wheels.iter().enumerate() {
            let (force, moment) = terrain
                .get(i)
                .copied()
                .unwrap_or((DVec3::ZERO, DVec3::ZERO));
            let axis = self
                .world
                .body_pose(handle)
                .map_or(DVec3::Y, |(_, rot)| rot * DVec3::Y);
            // positive spindle torque rolls towards +X, i.e. about +Y
            let torque = axis * spindle.get(i).copied().unwrap_or(0.0);
            reaction -= torque;
            self.world.set_external_wrench(handle, force, moment + torque);
        }
        self.world.set_external_wrench(self.chassis, DVec3::ZERO, reaction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JointType;

    fn model() -> VehicleModel {
        let spec = VehicleSpec::four_wheeled(1e-3);
        VehicleModel::build(
            &spec,
            &VehicleJoint::Kinematic(JointType::Revolute),
            DVec3::new(0.0, 0.0, 1.0),
            DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2),
        )
    }

    #[test]
    fn test_wheels_placed_in_chassis_frame() {
        let model = model();
        assert_eq!(model.num_wheels(), 4);
        let front_left = model.wheel_state(0).unwrap();
        // yawed by 90 degrees: chassis +X points along global +Y
        assert!((front_left.pos - DVec3::new(-0.9, 1.5, 1.0)).length() < 1e-5);
        assert_eq!(front_left.omega, 0.0);
        assert!(model.wheel_state(4).is_none());
    }

    #[test]
    fn test_spindle_torque_spins_wheel_forward() {
        let mut model = model();
        model.apply_loads(&[], &[100.0, 0.0, 0.0, 0.0]);
        for _ in 0..10 {
            model.step(1e-3).unwrap();
        }
        let states = model.wheel_states();
        assert!(states[0].omega > 0.0, "{:?}", states[0]);
        assert!(states[1].omega.abs() < states[0].omega.abs());
    }

    #[test]
    fn test_free_fall_without_terrain() {
        let mut model = model();
        model.apply_loads(&[], &[]);
        for _ in 0..10 {
            model.step(1e-3).unwrap();
        }
        let (pos, _) = model.chassis_pose();
        assert!(pos.z < 1.0);
        let (v, _) = model.chassis_velocity();
        assert!((v.z + GRAVITY * 0.01).abs() < 1e-2);
    }
}
