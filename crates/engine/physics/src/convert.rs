//! Conversions between glam (f64, exchange data) and Rapier's nalgebra types.

use glam::{DQuat, DVec3};
use rapier3d::na::{Quaternion, UnitQuaternion};
use rapier3d::prelude::*;

pub fn to_vector(v: DVec3) -> Vector<Real> {
    vector![v.x as Real, v.y as Real, v.z as Real]
}

pub fn to_point(v: DVec3) -> Point<Real> {
    point![v.x as Real, v.y as Real, v.z as Real]
}

pub fn to_rotation(q: DQuat) -> Rotation<Real> {
    UnitQuaternion::from_quaternion(Quaternion::new(
        q.w as Real,
        q.x as Real,
        q.y as Real,
        q.z as Real,
    ))
}

pub fn to_isometry(pos: DVec3, rot: DQuat) -> Isometry<Real> {
    Isometry::from_parts(to_vector(pos).into(), to_rotation(rot))
}

pub fn from_vector(v: &Vector<Real>) -> DVec3 {
    DVec3::new(v.x as f64, v.y as f64, v.z as f64)
}

pub fn from_point(p: &Point<Real>) -> DVec3 {
    DVec3::new(p.x as f64, p.y as f64, p.z as f64)
}

pub fn from_rotation(r: &Rotation<Real>) -> DQuat {
    DQuat::from_xyzw(r.i as f64, r.j as f64, r.k as f64, r.w as f64)
}

/// Pose of an isometry as (translation, rotation).
pub fn from_isometry(iso: &Isometry<Real>) -> (DVec3, DQuat) {
    (from_vector(&iso.translation.vector), from_rotation(&iso.rotation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_conversion() {
        let pos = DVec3::new(1.0, -2.0, 0.5);
        let rot = DQuat::from_rotation_z(0.3) * DQuat::from_rotation_x(-0.2);
        let (p, r) = from_isometry(&to_isometry(pos, rot));
        assert!((p - pos).length() < 1e-6);
        assert!(r.angle_between(rot) < 1e-5);
    }

    #[test]
    fn test_point_conversion() {
        let v = DVec3::new(0.25, 0.5, -1.0);
        assert_eq!(from_point(&to_point(v)), v);
    }
}
