//! Driver inputs.

use crate::config::DriverSpec;

/// Normalized driver commands, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriverInputs {
    pub throttle: f64,
    pub braking: f64,
}

impl DriverInputs {
    pub fn new(throttle: f64, braking: f64) -> Self {
        Self {
            throttle: throttle.clamp(0.0, 1.0),
            braking: braking.clamp(0.0, 1.0),
        }
    }
}

pub trait Driver: Send {
    fn inputs(&self, time: f64) -> DriverInputs;
}

/// Same inputs at all times.
pub struct ConstantDriver {
    inputs: DriverInputs,
}

impl ConstantDriver {
    pub fn new(throttle: f64, braking: f64) -> Self {
        Self {
            inputs: DriverInputs::new(throttle, braking),
        }
    }
}

impl Driver for ConstantDriver {
    fn inputs(&self, _time: f64) -> DriverInputs {
        self.inputs
    }
}

/// Piecewise-linear inputs from `[time, throttle, braking]` rows, held
/// constant outside the table.
pub struct DataDriver {
    table: Vec<[f64; 3]>,
}

impl DataDriver {
    /// `table` must be non-empty with strictly increasing times.
    pub fn new(table: Vec<[f64; 3]>) -> Self {
        Self { table }
    }
}

impl Driver for DataDriver {
    fn inputs(&self, time: f64) -> DriverInputs {
        let (Some(first), Some(last)) = (self.table.first(), self.table.last()) else {
            return DriverInputs::default();
        };
        if time <= first[0] {
            return DriverInputs::new(first[1], first[2]);
        }
        if time >= last[0] {
            return DriverInputs::new(last[1], last[2]);
        }
        let k = self.table.partition_point(|row| row[0] <= time);
        let (a, b) = (self.table[k - 1], self.table[k]);
        let s = (time - a[0]) / (b[0] - a[0]);
        DriverInputs::new(a[1] + s * (b[1] - a[1]), a[2] + s * (b[2] - a[2]))
    }
}

pub fn create_driver(spec: &DriverSpec) -> Box<dyn Driver> {
    match spec {
        DriverSpec::Constant { throttle, braking } => {
            Box::new(ConstantDriver::new(*throttle, *braking))
        }
        DriverSpec::Data { data } => Box::new(DataDriver::new(data.clone())),
    }
}
