//! Vehicle specfiles.

use std::path::Path;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use terracosim_core::terrain_type::read_specfile;
use terracosim_core::{ConfigError, ConfigResult};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChassisSpec {
    #[serde(rename = "Mass")]
    pub mass: f64,
    /// Principal moments of inertia.
    #[serde(rename = "Inertia")]
    pub inertia: DVec3,
}

impl Default for ChassisSpec {
    fn default() -> Self {
        Self {
            mass: 2000.0,
            inertia: DVec3::new(400.0, 1200.0, 1400.0),
        }
    }
}

/// One wheel with its tire. Defaults describe the Kraz trailer wheel.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct WheelSpec {
    /// Wheel center in the chassis frame.
    #[serde(rename = "Location")]
    pub location: DVec3,
    #[serde(rename = "Mass")]
    pub mass: f64,
    #[serde(rename = "Inertia")]
    pub inertia: DVec3,
    #[serde(rename = "Radius")]
    pub radius: f64,
    #[serde(rename = "Width")]
    pub width: f64,
}

impl Default for WheelSpec {
    fn default() -> Self {
        Self {
            location: DVec3::ZERO,
            mass: 30.0,
            inertia: DVec3::new(0.6, 0.63, 0.6),
            radius: 0.28575,
            width: 0.29845,
        }
    }
}

/// Kinematic joint type attaching a wheel to the chassis.
///
/// The spin axis is the local Y axis of both frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JointType {
    #[serde(rename = "LOCK")]
    Lock,
    #[serde(rename = "SPHERICAL")]
    Spherical,
    /// Free spin about local Y.
    #[default]
    #[serde(rename = "REVOLUTE")]
    Revolute,
    /// Free spin about local Y and steer about local Z.
    #[serde(rename = "UNIVERSAL")]
    Universal,
}

/// Stiffness and damping of a bushing.
///
/// The constrained coefficients act on directions the kinematic joint would
/// lock; the `_dof` ones act on its free directions. Vertical translation
/// counts as a free linear direction.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BushingData {
    #[serde(rename = "K_lin")]
    pub k_lin: f64,
    #[serde(rename = "K_rot")]
    pub k_rot: f64,
    #[serde(rename = "D_lin")]
    pub d_lin: f64,
    #[serde(rename = "D_rot")]
    pub d_rot: f64,
    #[serde(rename = "K_lin_dof", default)]
    pub k_lin_dof: f64,
    #[serde(rename = "K_rot_dof", default)]
    pub k_rot_dof: f64,
    #[serde(rename = "D_lin_dof", default)]
    pub d_lin_dof: f64,
    #[serde(rename = "D_rot_dof", default)]
    pub d_rot_dof: f64,
}

impl BushingData {
    pub fn validate(&self) -> ConfigResult<()> {
        let values = [
            ("K_lin", self.k_lin),
            ("K_rot", self.k_rot),
            ("D_lin", self.d_lin),
            ("D_rot", self.d_rot),
            ("K_lin_dof", self.k_lin_dof),
            ("K_rot_dof", self.k_rot_dof),
            ("D_lin_dof", self.d_lin_dof),
            ("D_rot_dof", self.d_rot_dof),
        ];
        for (name, value) in values {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid(
                    format!("Joint.Bushing.{name}"),
                    format!("must be non-negative, got {value}"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct JointSpec {
    #[serde(rename = "Type")]
    pub joint_type: JointType,
    /// When present the wheel hangs on a bushing instead of a kinematic joint.
    #[serde(rename = "Bushing")]
    pub bushing: Option<BushingData>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PowertrainSpec {
    /// Spindle torque at zero speed and full throttle (N m).
    #[serde(rename = "Maximum torque")]
    pub max_torque: f64,
    /// Spindle speed at which drive torque vanishes (rad/s).
    #[serde(rename = "Maximum speed")]
    pub max_speed: f64,
    #[serde(rename = "Maximum braking torque")]
    pub max_braking_torque: f64,
    /// Indices of the wheels receiving drive torque; all wheels brake.
    #[serde(rename = "Driven wheels")]
    pub driven_wheels: Vec<usize>,
}

impl Default for PowertrainSpec {
    fn default() -> Self {
        Self {
            max_torque: 300.0,
            max_speed: 200.0,
            max_braking_torque: 500.0,
            driven_wheels: Vec::new(),
        }
    }
}

/// Driver inputs, either constant or interpolated from a table of
/// `[time, throttle, braking]` rows.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DriverSpec {
    // tried first: every object would match `Constant`
    Data {
        #[serde(rename = "Data")]
        data: Vec<[f64; 3]>,
    },
    Constant {
        #[serde(rename = "Throttle", default)]
        throttle: f64,
        #[serde(rename = "Braking", default)]
        braking: f64,
    },
}

impl Default for DriverSpec {
    fn default() -> Self {
        Self::Constant {
            throttle: 0.0,
            braking: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehicleSpec {
    #[serde(rename = "Chassis", default)]
    pub chassis: ChassisSpec,
    #[serde(rename = "Wheels")]
    pub wheels: Vec<WheelSpec>,
    #[serde(rename = "Joint", default)]
    pub joint: JointSpec,
    #[serde(rename = "Powertrain", default)]
    pub powertrain: PowertrainSpec,
    #[serde(rename = "Driver", default)]
    pub driver: DriverSpec,
    #[serde(rename = "Step size")]
    pub step_size: f64,
}

impl VehicleSpec {
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let doc = read_specfile(path)?;
        let spec: Self =
            serde_json::from_value(doc).map_err(|source| ConfigError::InvalidJson {
                path: path.to_path_buf(),
                source,
            })?;
        spec.validate()?;
        debug!(
            "vehicle specfile {}: {} wheels, step {}",
            path.display(),
            spec.wheels.len(),
            spec.step_size
        );
        Ok(spec)
    }

    /// Four Kraz wheels on a default chassis.
    pub fn four_wheeled(step_size: f64) -> Self {
        let wheels = [(1.5, 0.9), (1.5, -0.9), (-1.5, 0.9), (-1.5, -0.9)]
            .into_iter()
            .map(|(x, y)| WheelSpec {
                location: DVec3::new(x, y, 0.0),
                ..WheelSpec::default()
            })
            .collect();
        Self {
            chassis: ChassisSpec::default(),
            wheels,
            joint: JointSpec::default(),
            powertrain: PowertrainSpec::default(),
            driver: DriverSpec::default(),
            step_size,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        ConfigError::require_positive("Step size", self.step_size)?;
        ConfigError::require_positive("Chassis.Mass", self.chassis.mass)?;
        if self.wheels.is_empty() {
            return Err(ConfigError::invalid("Wheels", "at least one wheel is required"));
        }
        for (i, wheel) in self.wheels.iter().enumerate() {
            ConfigError::require_positive(&format!("Wheels[{i}].Mass"), wheel.mass)?;
            ConfigError::require_positive(&format!("Wheels[{i}].Radius"), wheel.radius)?;
            ConfigError::require_positive(&format!("Wheels[{i}].Width"), wheel.width)?;
        }
        if let Some(bushing) = &self.joint.bushing {
            bushing.validate()?;
        }
        let pt = &self.powertrain;
        ConfigError::require_positive("Powertrain.Maximum speed", pt.max_speed)?;
        if let Some(&w) = pt.driven_wheels.iter().find(|&&w| w >= self.wheels.len()) {
            return Err(ConfigError::WheelOutOfRange {
                wheel: w,
                num_tires: self.wheels.len(),
            });
        }
        if let DriverSpec::Data { data } = &self.driver {
            if data.is_empty() {
                return Err(ConfigError::invalid("Driver.Data", "table is empty"));
            }
            if data.windows(2).any(|w| w[1][0] <= w[0][0]) {
                return Err(ConfigError::invalid(
                    "Driver.Data",
                    "times must be strictly increasing",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wheel_defaults() {
        let spec: VehicleSpec = serde_json::from_value(json!({
            "Step size": 1e-3,
            "Wheels": [ { "Location": [1.0, 0.5, 0.0] } ]
        }))
        .unwrap();
        let wheel = spec.wheels[0];
        assert_eq!(wheel.location, DVec3::new(1.0, 0.5, 0.0));
        assert_eq!(wheel.mass, 30.0);
        assert_eq!(wheel.radius, 0.28575);
        assert_eq!(wheel.width, 0.29845);
        assert_eq!(spec.joint.joint_type, JointType::Revolute);
        assert!(spec.joint.bushing.is_none());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_driver_variants() {
        let constant: DriverSpec = serde_json::from_value(json!({ "Throttle": 0.5 })).unwrap();
        assert_eq!(
            constant,
            DriverSpec::Constant {
                throttle: 0.5,
                braking: 0.0
            }
        );
        let data: DriverSpec =
            serde_json::from_value(json!({ "Data": [[0.0, 0.0, 0.0], [1.0, 1.0, 0.0]] })).unwrap();
        assert!(matches!(data, DriverSpec::Data { data } if data.len() == 2));
    }

    #[test]
    fn test_bushing_joint() {
        let joint: JointSpec = serde_json::from_value(json!({
            "Type": "SPHERICAL",
            "Bushing": { "K_lin": 1e7, "K_rot": 1e5, "D_lin": 1e4, "D_rot": 1e2, "K_lin_dof": 8e4 }
        }))
        .unwrap();
        assert_eq!(joint.joint_type, JointType::Spherical);
        let bushing = joint.bushing.unwrap();
        assert_eq!(bushing.k_lin_dof, 8e4);
        assert_eq!(bushing.d_rot_dof, 0.0);
    }

    #[test]
    fn test_validation() {
        let mut spec = VehicleSpec::four_wheeled(1e-3);
        assert!(spec.validate().is_ok());

        spec.powertrain.driven_wheels = vec![0, 7];
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::WheelOutOfRange { wheel: 7, num_tires: 4 })
        ));

        spec.powertrain.driven_wheels.clear();
        spec.driver = DriverSpec::Data {
            data: vec![[1.0, 0.0, 0.0], [0.5, 1.0, 0.0]],
        };
        assert!(spec.validate().is_err());

        spec.driver = DriverSpec::default();
        spec.wheels.clear();
        assert!(spec.validate().is_err());
    }
}
