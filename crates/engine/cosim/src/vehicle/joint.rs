//! Wheel-to-chassis attachment.

use glam::DVec3;
use terracosim_physics::rapier3d::prelude::*;
use terracosim_physics::to_point;

use crate::config::{BushingData, JointSpec, JointType};
use crate::error::{CosimError, Result};

/// A wheel hangs either on an ideal kinematic joint or on a compliant
/// bushing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VehicleJoint {
    Kinematic(JointType),
    Bushing(BushingData),
}

impl VehicleJoint {
    pub fn from_spec(spec: &JointSpec) -> Self {
        match spec.bushing {
            Some(bushing) => Self::Bushing(bushing),
            None => Self::Kinematic(spec.joint_type),
        }
    }

    pub fn is_bushing(&self) -> bool {
        matches!(self, Self::Bushing(_))
    }

    pub fn as_kinematic(&self) -> Result<JointType> {
        match self {
            Self::Kinematic(ty) => Ok(*ty),
            Self::Bushing(_) => Err(CosimError::precondition("joint is a bushing")),
        }
    }

    pub fn as_bushing(&self) -> Result<&BushingData> {
        match self {
            Self::Bushing(data) => Ok(data),
            Self::Kinematic(_) => Err(CosimError::precondition("joint is kinematic")),
        }
    }

    /// Rapier joint attaching a wheel at `anchor` (chassis frame) to the
    /// chassis. The wheel frame origin is the wheel center.
    pub fn build(&self, anchor: DVec3) -> GenericJoint {
        let builder = match self {
            Self::Kinematic(ty) => GenericJointBuilder::new(locked_axes(*ty)),
            Self::Bushing(b) => {
                let axes = [
                    (JointAxis::LinX, b.k_lin, b.d_lin),
                    (JointAxis::LinY, b.k_lin, b.d_lin),
                    (JointAxis::LinZ, b.k_lin_dof, b.d_lin_dof),
                    (JointAxis::AngX, b.k_rot, b.d_rot),
                    (JointAxis::AngY, b.k_rot_dof, b.d_rot_dof),
                    (JointAxis::AngZ, b.k_rot, b.d_rot),
                ];
                axes.into_iter().fold(
                    GenericJointBuilder::new(JointAxesMask::empty()),
                    |builder, (axis, k, d)| {
                        builder
                            .motor_model(axis, MotorModel::ForceBased)
                            .motor_position(axis, 0.0, k as Real, d as Real)
                    },
                )
            }
        };
        builder
            .local_anchor1(to_point(anchor))
            .local_anchor2(point![0.0, 0.0, 0.0])
            .contacts_enabled(false)
            .build()
    }
}

fn locked_axes(ty: JointType) -> JointAxesMask {
    let lin = JointAxesMask::LIN_X | JointAxesMask::LIN_Y | JointAxesMask::LIN_Z;
    match ty {
        JointType::Lock => lin | JointAxesMask::ANG_X | JointAxesMask::ANG_Y | JointAxesMask::ANG_Z,
        JointType::Spherical => lin,
        JointType::Revolute => lin | JointAxesMask::ANG_X | JointAxesMask::ANG_Z,
        JointType::Universal => lin | JointAxesMask::ANG_X,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bushing() -> BushingData {
        BushingData {
            k_lin: 1e7,
            k_rot: 1e5,
            d_lin: 1e4,
            d_rot: 1e2,
            k_lin_dof: 8e4,
            k_rot_dof: 0.0,
            d_lin_dof: 4e3,
            d_rot_dof: 0.0,
        }
    }

    #[test]
    fn test_from_spec() {
        let kinematic = VehicleJoint::from_spec(&JointSpec::default());
        assert_eq!(kinematic.as_kinematic().unwrap(), JointType::Revolute);
        assert!(kinematic.as_bushing().is_err());

        let spec = JointSpec {
            joint_type: JointType::Revolute,
            bushing: Some(bushing()),
        };
        let joint = VehicleJoint::from_spec(&spec);
        assert!(joint.is_bushing());
        assert_eq!(joint.as_bushing().unwrap().k_lin_dof, 8e4);
        assert!(matches!(joint.as_kinematic(), Err(CosimError::Precondition(_))));
    }

    #[test]
    fn test_revolute_leaves_spin_free() {
        let joint = VehicleJoint::Kinematic(JointType::Revolute).build(DVec3::new(1.0, 0.5, 0.0));
        assert!(!joint.locked_axes.contains(JointAxesMask::ANG_Y));
        assert!(joint.locked_axes.contains(JointAxesMask::ANG_X | JointAxesMask::LIN_Z));
        assert!((joint.local_anchor1() - point![1.0, 0.5, 0.0]).norm() < 1e-6);
    }

    #[test]
    fn test_bushing_is_compliant() {
        let joint = VehicleJoint::Bushing(bushing()).build(DVec3::ZERO);
        assert!(joint.locked_axes.is_empty());
        assert!(joint.motor_axes.contains(JointAxesMask::LIN_Z));
    }
}
