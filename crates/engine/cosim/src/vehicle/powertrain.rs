//! Spindle torques from driver inputs.
//!
//! Torques are signed in the rolling direction: positive drives the vehicle
//! towards its local +X. With Z up and the spin axis along +Y, rolling towards
//! +X is a positive spin rate, so `forward = omega`.

use super::driver::DriverInputs;
use crate::config::PowertrainSpec;

/// Spin rate below which braking torque ramps down linearly.
const BRAKE_RAMP: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct Powertrain {
    max_torque: f64,
    max_speed: f64,
    max_braking_torque: f64,
    driven: Vec<bool>,
}

impl Powertrain {
    pub fn new(spec: &PowertrainSpec, num_wheels: usize) -> Self {
        let mut driven = vec![false; num_wheels];
        for &w in &spec.driven_wheels {
            if let Some(slot) = driven.get_mut(w) {
                *slot = true;
            }
        }
        Self {
            max_torque: spec.max_torque,
            max_speed: spec.max_speed,
            max_braking_torque: spec.max_braking_torque,
            driven,
        }
    }

    pub fn is_driven(&self, wheel: usize) -> bool {
        self.driven.get(wheel).copied().unwrap_or(false)
    }

    /// Net spindle torque on `wheel` spinning at `omega` about its axis.
    pub fn spindle_torque(&self, wheel: usize, inputs: DriverInputs, omega: f64) -> f64 {
        let forward = omega;
        let drive = if self.is_driven(wheel) {
            inputs.throttle * self.max_torque * (1.0 - forward.abs() / self.max_speed).max(0.0)
        } else {
            0.0
        };
        let brake =
            inputs.braking * self.max_braking_torque * (forward / BRAKE_RAMP).clamp(-1.0, 1.0);
        drive - brake
    }
}
