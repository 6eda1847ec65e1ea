//! Snapshot payloads exchanged between nodes.
//!
//! All vectors are expressed in the global frame: Z up, X towards the front of
//! the vehicle, Y to the left.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::mesh::TriMesh;

/// Kinematic state of one wheel at a synchronization time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelState {
    /// Global wheel index.
    pub wheel: usize,
    /// Wheel center.
    pub pos: DVec3,
    /// Wheel orientation; the local Y axis is the spin axis.
    pub rot: DQuat,
    pub lin_vel: DVec3,
    pub ang_vel: DVec3,
    /// Spin rate relative to the spindle carrier (rad/s).
    pub omega: f64,
}

impl WheelState {
    /// A wheel at rest at the given pose.
    pub fn at_rest(wheel: usize, pos: DVec3, rot: DQuat) -> Self {
        Self {
            wheel,
            pos,
            rot,
            lin_vel: DVec3::ZERO,
            ang_vel: DVec3::ZERO,
            omega: 0.0,
        }
    }

    /// Spin axis in the global frame.
    pub fn spin_axis(&self) -> DVec3 {
        self.rot * DVec3::Y
    }

    /// Velocity of a point rigidly attached to the wheel.
    pub fn point_velocity(&self, point: DVec3) -> DVec3 {
        self.lin_vel + self.ang_vel.cross(point - self.pos)
    }

    pub fn is_finite(&self) -> bool {
        self.pos.is_finite()
            && self.rot.is_finite()
            && self.lin_vel.is_finite()
            && self.ang_vel.is_finite()
            && self.omega.is_finite()
    }
}

/// Resultant contact load on one wheel, applied at the wheel center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainForce {
    /// Global wheel index.
    pub wheel: usize,
    pub force: DVec3,
    pub moment: DVec3,
}

impl TerrainForce {
    pub fn zero(wheel: usize) -> Self {
        Self {
            wheel,
            force: DVec3::ZERO,
            moment: DVec3::ZERO,
        }
    }

    /// Norm of the combined force/moment vector.
    pub fn magnitude(&self) -> f64 {
        (self.force.length_squared() + self.moment.length_squared()).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.force.is_finite() && self.moment.is_finite()
    }
}

/// Tire description sent by the vehicle to the terrain at initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TireInfo {
    /// Global wheel index.
    pub wheel: usize,
    pub mass: f64,
    pub radius: f64,
    pub width: f64,
    /// Tread surface in the wheel frame.
    pub mesh: TriMesh,
}

impl TireInfo {
    /// Tire with a generated cylindrical tread mesh.
    pub fn cylindrical(wheel: usize, mass: f64, radius: f64, width: f64) -> Self {
        Self {
            wheel,
            mass,
            radius,
            width,
            mesh: TriMesh::cylinder(radius, width, 36),
        }
    }

    /// Principal inertia of a solid cylinder spinning about local Y.
    pub fn inertia(&self) -> DVec3 {
        let r2 = self.radius * self.radius;
        let w2 = self.width * self.width;
        let transverse = self.mass * (3.0 * r2 + w2) / 12.0;
        DVec3::new(transverse, 0.5 * self.mass * r2, transverse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_velocity() {
        let mut state = WheelState::at_rest(0, DVec3::new(0.0, 0.0, 0.5), DQuat::IDENTITY);
        state.lin_vel = DVec3::new(1.0, 0.0, 0.0);
        state.ang_vel = DVec3::new(0.0, 2.0, 0.0);
        // pure rolling: the point under the hub is at rest
        let v = state.point_velocity(DVec3::new(0.0, 0.0, 0.0));
        assert!((v - DVec3::new(0.0, 0.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_zero_force() {
        let f = TerrainForce::zero(3);
        assert_eq!(f.wheel, 3);
        assert_eq!(f.magnitude(), 0.0);
    }

    #[test]
    fn test_tire_inertia() {
        let tire = TireInfo::cylindrical(0, 30.0, 0.28575, 0.29845);
        let inertia = tire.inertia();
        assert!(inertia.y > inertia.x);
        assert_eq!(tire.mesh.num_triangles(), 144);
    }
}
