use crate::convert::{from_rotation, from_vector, to_isometry, to_vector};
use crate::error::{SolverError, SolverResult};
use glam::{DQuat, DVec3};
use rapier3d::prelude::*;

/// Rigid multibody domain
///
/// Manages all rigid bodies, colliders, joints, and simulation time.
/// This is a wrapper around Rapier's physics pipeline. Exchange data is in
/// f64 glam types; Rapier itself runs in f32.
pub struct PhysicsWorld {
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    ccd_solver: CCDSolver,
    gravity: Vector<Real>,
    time: f64,
}

impl PhysicsWorld {
    /// Create a new physics world with specified gravity
    ///
    /// # Arguments
    /// * `gravity` - Gravity vector (e.g., DVec3::new(0.0, 0.0, -9.81))
    pub fn new(gravity: DVec3) -> Self {
        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            gravity: to_vector(gravity),
            time: 0.0,
        }
    }

    /// Current simulation time
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Step the simulation forward by `dt` seconds
    ///
    /// Fails if `dt` is not a positive finite number or if a dynamic body
    /// ends the step with a non-finite pose or velocity.
    ///
    /// # Arguments
    /// * `dt` - Time step in seconds
    pub fn step(&mut self, dt: f64) -> SolverResult<()> {
        SolverError::check_step("rigid", dt)?;
        self.integration_parameters.dt = dt as Real;

        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
        self.time += dt;

        let diverged = self.rigid_body_set.iter().any(|(_, body)| {
            body.is_dynamic()
                && !(body.translation().iter().all(|c| c.is_finite())
                    && body.linvel().iter().all(|c| c.is_finite())
                    && body.angvel().iter().all(|c| c.is_finite()))
        });
        if diverged {
            return Err(SolverError::NonFinite {
                engine: "rigid",
                time: self.time,
            });
        }
        Ok(())
    }

    /// Add a rigid body to the world
    ///
    /// # Returns
    /// Handle to the added rigid body
    pub fn add_rigid_body(&mut self, body: RigidBody) -> RigidBodyHandle {
        self.rigid_body_set.insert(body)
    }

    /// Add a collider attached to a rigid body
    pub fn add_collider(&mut self, collider: Collider, parent: RigidBodyHandle) -> ColliderHandle {
        self.collider_set
            .insert_with_parent(collider, parent, &mut self.rigid_body_set)
    }

    /// Add a collider fixed in the world frame
    pub fn add_static_collider(&mut self, collider: Collider) -> ColliderHandle {
        self.collider_set.insert(collider)
    }

    /// Connect two bodies with an impulse joint
    pub fn add_joint(
        &mut self,
        body1: RigidBodyHandle,
        body2: RigidBodyHandle,
        joint: impl Into<GenericJoint>,
    ) -> ImpulseJointHandle {
        self.impulse_joint_set.insert(body1, body2, joint, true)
    }

    /// Pose of a body as (position, rotation)
    pub fn body_pose(&self, handle: RigidBodyHandle) -> Option<(DVec3, DQuat)> {
        self.rigid_body_set
            .get(handle)
            .map(|b| (from_vector(b.translation()), from_rotation(b.rotation())))
    }

    /// Velocity of a body as (linear, angular), global frame
    pub fn body_velocity(&self, handle: RigidBodyHandle) -> Option<(DVec3, DVec3)> {
        self.rigid_body_set
            .get(handle)
            .map(|b| (from_vector(b.linvel()), from_vector(b.angvel())))
    }

    /// Overwrite pose and velocity of a body.
    ///
    /// Kinematic bodies get the pose as their next target; all others are
    /// teleported.
    pub fn set_body_state(
        &mut self,
        handle: RigidBodyHandle,
        pos: DVec3,
        rot: DQuat,
        lin_vel: DVec3,
        ang_vel: DVec3,
    ) -> Option<()> {
        let body = self.rigid_body_set.get_mut(handle)?;
        let iso = to_isometry(pos, rot);
        if body.is_kinematic() {
            body.set_next_kinematic_position(iso);
        } else {
            body.set_position(iso, true);
        }
        body.set_linvel(to_vector(lin_vel), true);
        body.set_angvel(to_vector(ang_vel), true);
        Some(())
    }

    /// Replace the external force and torque acting on a body.
    ///
    /// The wrench persists across steps until replaced.
    pub fn set_external_wrench(
        &mut self,
        handle: RigidBodyHandle,
        force: DVec3,
        torque: DVec3,
    ) -> Option<()> {
        let body = self.rigid_body_set.get_mut(handle)?;
        body.reset_forces(false);
        body.reset_torques(false);
        body.add_force(to_vector(force), true);
        body.add_torque(to_vector(torque), true);
        Some(())
    }

    /// Number of active contact points on the colliders of a body.
    pub fn contact_count(&self, handle: RigidBodyHandle) -> usize {
        let Some(body) = self.rigid_body_set.get(handle) else {
            return 0;
        };
        body.colliders()
            .iter()
            .flat_map(|&ch| self.narrow_phase.contact_pairs_with(ch))
            .filter(|pair| pair.has_any_active_contact)
            .flat_map(|pair| pair.manifolds.iter())
            .map(|m| m.data.num_active_contacts())
            .sum()
    }

    /// Get the current gravity vector
    pub fn gravity(&self) -> DVec3 {
        from_vector(&self.gravity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collider::create_ground_collider;

    #[test]
    fn test_world_creation() {
        let world = PhysicsWorld::new(DVec3::new(0.0, 0.0, -9.81));
        assert!((world.gravity() - DVec3::new(0.0, 0.0, -9.81)).length() < 1e-6);
        assert_eq!(world.time(), 0.0);
    }

    #[test]
    fn test_add_rigid_body() {
        let mut world = PhysicsWorld::new(DVec3::new(0.0, 0.0, -9.81));
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![0.0, 0.0, 10.0])
            .build();
        let handle = world.add_rigid_body(body);

        let (pos, _) = world.body_pose(handle).unwrap();
        assert_eq!(pos.z, 10.0);
    }

    #[test]
    fn test_gravity_simulation() {
        let mut world = PhysicsWorld::new(DVec3::new(0.0, 0.0, -9.81));
        let handle = world.add_rigid_body(
            RigidBodyBuilder::dynamic()
                .translation(vector![0.0, 0.0, 10.0])
                .build(),
        );
        world.add_collider(ColliderBuilder::ball(0.5).build(), handle);

        for _ in 0..10 {
            world.step(0.01).unwrap();
        }
        assert!((world.time() - 0.1).abs() < 1e-12);
        let (pos, _) = world.body_pose(handle).unwrap();
        assert!(pos.z < 10.0);
    }

    #[test]
    fn test_ball_rests_on_ground() {
        let mut world = PhysicsWorld::new(DVec3::new(0.0, 0.0, -9.81));
        world.add_static_collider(create_ground_collider(4.0, 4.0, 0.8, 0.0));
        let handle = world.add_rigid_body(
            RigidBodyBuilder::dynamic()
                .translation(vector![0.0, 0.0, 0.6])
                .build(),
        );
        world.add_collider(ColliderBuilder::ball(0.5).build(), handle);

        for _ in 0..200 {
            world.step(0.005).unwrap();
        }
        let (pos, _) = world.body_pose(handle).unwrap();
        assert!((pos.z - 0.5).abs() < 0.02);
        assert!(world.contact_count(handle) > 0);
    }

    #[test]
    fn test_invalid_step_rejected() {
        let mut world = PhysicsWorld::new(DVec3::ZERO);
        assert!(matches!(world.step(0.0), Err(SolverError::InvalidStep { .. })));
        assert!(matches!(world.step(f64::NAN), Err(SolverError::InvalidStep { .. })));
    }

    #[test]
    fn test_external_wrench_replaced() {
        let mut world = PhysicsWorld::new(DVec3::ZERO);
        let handle = world.add_rigid_body(
            RigidBodyBuilder::dynamic()
                .additional_mass(1.0)
                .build(),
        );
        world.set_external_wrench(handle, DVec3::X, DVec3::ZERO).unwrap();
        world.set_external_wrench(handle, DVec3::Y, DVec3::ZERO).unwrap();
        world.step(0.1).unwrap();
        let (v, _) = world.body_velocity(handle).unwrap();
        assert!(v.x.abs() < 1e-6);
        assert!(v.y > 0.0);
    }
}
