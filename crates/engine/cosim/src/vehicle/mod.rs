//! Vehicle node: the multibody vehicle and its inputs.
//!
//! The node never sees the terrain. It reports wheel states on
//! [`VehicleNode::synchronize`] and applies whatever terrain loads were last
//! handed to [`VehicleNode::set_terrain_forces`].

mod driver;
mod joint;
mod model;
mod powertrain;

use glam::{DQuat, DVec3};
use terracosim_core::{ConfigError, TerrainForce, TireInfo, WheelState};
use tracing::{debug, info};

use crate::config::VehicleSpec;
use crate::error::{CosimError, Result};

pub use driver::{create_driver, ConstantDriver, DataDriver, Driver, DriverInputs};
pub use joint::VehicleJoint;
pub use model::VehicleModel;
pub use powertrain::Powertrain;

pub struct VehicleNode {
    spec: VehicleSpec,
    step_size: f64,
    joint: VehicleJoint,
    driver: Box<dyn Driver>,
    powertrain: Powertrain,
    model: Option<VehicleModel>,
    forces: Vec<TerrainForce>,
    inputs: DriverInputs,
    time: f64,
}

impl VehicleNode {
    pub fn new(spec: VehicleSpec) -> Result<Self> {
        spec.validate()?;
        let n = spec.wheels.len();
        Ok(Self {
            step_size: spec.step_size,
            joint: VehicleJoint::from_spec(&spec.joint),
            driver: create_driver(&spec.driver),
            powertrain: Powertrain::new(&spec.powertrain, n),
            model: None,
            forces: (0..n).map(TerrainForce::zero).collect(),
            inputs: DriverInputs::default(),
            time: 0.0,
            spec,
        })
    }

    pub fn set_step_size(&mut self, step: f64) -> Result<()> {
        self.step_size = ConfigError::require_positive("vehicle step size", step)?;
        Ok(())
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn num_wheels(&self) -> usize {
        self.spec.wheels.len()
    }

    /// Tire descriptions sent to the terrain nodes.
    pub fn tire_info(&self) -> Vec<TireInfo> {
        self.spec
            .wheels
            .iter()
            .enumerate()
            .map(|(i, w)| TireInfo::cylindrical(i, w.mass, w.radius, w.width))
            .collect()
    }

    fn model(&self) -> Result<&VehicleModel> {
        self.model
            .as_ref()
            .ok_or_else(|| CosimError::precondition("vehicle not initialized"))
    }

    /// Build the vehicle with its chassis frame at the given pose.
    pub fn initialize(&mut self, position: DVec3, rotation: DQuat) -> Result<()> {
        self.model = Some(VehicleModel::build(&self.spec, &self.joint, position, rotation));
        self.forces = (0..self.num_wheels()).map(TerrainForce::zero).collect();
        self.time = 0.0;
        info!(
            "vehicle initialized at ({:.3}, {:.3}, {:.3}) with {} wheels",
            position.x,
            position.y,
            position.z,
            self.num_wheels()
        );
        Ok(())
    }

    /// Store the terrain loads for the next [`synchronize`](Self::synchronize).
    pub fn set_terrain_forces(&mut self, forces: &[TerrainForce]) -> Result<()> {
        let n = self.num_wheels();
        for force in forces {
            if !force.is_finite() {
                return Err(CosimError::precondition(format!(
                    "non-finite terrain force for wheel {}",
                    force.wheel
                )));
            }
            let slot = self.forces.get_mut(force.wheel).ok_or_else(|| {
                CosimError::precondition(format!(
                    "terrain force for unknown wheel {} (vehicle has {n})",
                    force.wheel
                ))
            })?;
            *slot = *force;
        }
        Ok(())
    }

    pub fn terrain_forces(&self) -> &[TerrainForce] {
        &self.forces
    }

    fn apply_loads(&mut self) -> Result<()> {
        let terrain: Vec<(DVec3, DVec3)> =
            self.forces.iter().map(|f| (f.force, f.moment)).collect();
        let states = self.model()?.wheel_states();
        let spindle: Vec<f64> = states
            .iter()
            .map(|s| self.powertrain.spindle_torque(s.wheel, self.inputs, s.omega))
            .collect();
        let model = self
            .model
            .as_mut()
            .ok_or_else(|| CosimError::precondition("vehicle not initialized"))?;
        model.apply_loads(&terrain, &spindle);
        Ok(())
    }

    /// Apply the latest terrain loads and driver inputs for `time` and
    /// report the wheel states. Does not integrate.
    pub fn synchronize(&mut self, time: f64) -> Result<Vec<WheelState>> {
        self.model()?;
        self.inputs = self.driver.inputs(time);
        self.apply_loads()?;
        let states = self.model()?.wheel_states();
        debug!(
            time,
            throttle = self.inputs.throttle,
            braking = self.inputs.braking,
            "vehicle synchronized"
        );
        Ok(states)
    }

    /// Advance by exactly `step`, in sub-steps no larger than the step size.
    pub fn advance(&mut self, step: f64) -> Result<()> {
        self.model()?;
        if !(step.is_finite() && step > 0.0) {
            return Err(CosimError::precondition(format!("invalid advance step {step}")));
        }
        let tolerance = 1e-10 * step;
        let mut t = 0.0;
        while step - t > tolerance {
            let h = self.step_size.min(step - t);
            self.apply_loads()?;
            if let Some(model) = self.model.as_mut() {
                model.step(h)?;
            }
            t += h;
        }
        self.time += step;
        Ok(())
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn inputs(&self) -> DriverInputs {
        self.inputs
    }

    pub fn wheel_states(&self) -> Result<Vec<WheelState>> {
        Ok(self.model()?.wheel_states())
    }

    pub fn chassis_pose(&self) -> Result<(DVec3, DQuat)> {
        Ok(self.model()?.chassis_pose())
    }
}
